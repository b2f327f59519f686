//! condition.rs -- variable tests used by branches and choice gates
//!
//! A list of [`VariableOperation`]s is combined with AND. Evaluation fails
//! closed: a missing or mistyped variable makes its operation false and is
//! reported as an [`EvalWarning`] instead of aborting playback.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::Value;
use crate::error::EvalWarning;
use crate::store::VariableStore;

/// Comparison applied between a stored variable and a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// Text variable contains the literal as a substring.
    Contains,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Equal => "==",
            Comparator::NotEqual => "!=",
            Comparator::Less => "<",
            Comparator::LessOrEqual => "<=",
            Comparator::Greater => ">",
            Comparator::GreaterOrEqual => ">=",
            Comparator::Contains => "contains",
        };
        f.write_str(symbol)
    }
}

/// A single test against the variable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableOperation {
    pub variable: String,
    pub comparator: Comparator,
    pub value: Value,
}

impl fmt::Display for VariableOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.variable, self.comparator, self.value)
    }
}

impl VariableOperation {
    pub fn new(variable: impl Into<String>, comparator: Comparator, value: impl Into<Value>) -> Self {
        Self {
            variable: variable.into(),
            comparator,
            value: value.into(),
        }
    }

    /// Test this operation against the variable's current value.
    ///
    /// # Errors
    /// Returns a warning when the variable is absent or its kind cannot be compared
    /// with the literal. Callers treat that as `false`.
    pub fn check(&self, current: Option<&Value>) -> Result<bool, EvalWarning> {
        let current = current.ok_or_else(|| EvalWarning::MissingVariable {
            name: self.variable.clone(),
        })?;
        let mismatch = |expected: &'static str| EvalWarning::TypeMismatch {
            name: self.variable.clone(),
            expected,
            found: current.kind(),
        };

        match self.comparator {
            Comparator::Equal | Comparator::NotEqual => {
                let same = match (current, &self.value) {
                    (Value::Bool(a), Value::Bool(b)) => a == b,
                    (Value::Number(a), Value::Number(b)) => nearly_equal(*a, *b),
                    (Value::Text(a), Value::Text(b)) => a == b,
                    _ => return Err(mismatch(self.value.kind())),
                };
                Ok(same == (self.comparator == Comparator::Equal))
            },
            Comparator::Less | Comparator::LessOrEqual | Comparator::Greater | Comparator::GreaterOrEqual => {
                let (Value::Number(a), Value::Number(b)) = (current, &self.value) else {
                    return Err(mismatch("number"));
                };
                // values within rounding error of each other compare as equal
                let same = nearly_equal(*a, *b);
                Ok(match self.comparator {
                    Comparator::Less => a < b && !same,
                    Comparator::LessOrEqual => a <= b || same,
                    Comparator::Greater => a > b && !same,
                    _ => a >= b || same,
                })
            },
            Comparator::Contains => {
                let (Value::Text(a), Value::Text(b)) = (current, &self.value) else {
                    return Err(mismatch("text"));
                };
                Ok(a.contains(b.as_str()))
            },
        }
    }
}

fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}

/// Outcome of evaluating an operation list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    pub passed: bool,
    pub warnings: Vec<EvalWarning>,
}

/// Evaluate `operations` with AND logic, stopping at the first operation that fails.
///
/// An empty list is vacuously true.
pub fn evaluate<S: VariableStore + ?Sized>(store: &S, operations: &[VariableOperation]) -> Evaluation {
    let mut warnings = Vec::new();
    for op in operations {
        let current = store.get(&op.variable);
        match op.check(current.as_ref()) {
            Ok(true) => {},
            Ok(false) => {
                debug!("condition failed: {op}");
                return Evaluation { passed: false, warnings };
            },
            Err(warning) => {
                warn!("condition '{op}' treated as false: {warning}");
                warnings.push(warning);
                return Evaluation { passed: false, warnings };
            },
        }
    }
    Evaluation { passed: true, warnings }
}
