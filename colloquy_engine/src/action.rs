//! Variable actions fired on choice selection and node exit.
//!
//! Actions are applied best-effort, in declared order. An action aimed at a
//! missing variable, or at a variable of the wrong kind, is skipped and
//! reported as an [`EvalWarning`]; the remaining actions still run.
//!
//! # Logging
//!
//! Every applied action is logged as
//! ```text
//! └─ action: Set(flag = true)
//! ```

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::Value;
use crate::error::EvalWarning;
use crate::store::VariableStore;

/// A single mutation of the variable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableAction {
    /// Replace a variable's value with a literal of the same kind
    Set { variable: String, value: Value },
    /// Add to a number (negative values subtract)
    Increment { variable: String, by: f64 },
    /// Flip a boolean
    Toggle { variable: String },
    /// Append to a text variable
    Append { variable: String, text: String },
    /// Copy another variable's value
    Copy { variable: String, from: String },
}

impl fmt::Display for VariableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableAction::Set { variable, value } => write!(f, "Set({variable} = {value})"),
            VariableAction::Increment { variable, by } => write!(f, "Increment({variable} += {by})"),
            VariableAction::Toggle { variable } => write!(f, "Toggle({variable})"),
            VariableAction::Append { variable, text } => write!(f, "Append({variable} += \"{text}\")"),
            VariableAction::Copy { variable, from } => write!(f, "Copy({variable} = {from})"),
        }
    }
}

impl VariableAction {
    pub fn variable(&self) -> &str {
        match self {
            VariableAction::Set { variable, .. }
            | VariableAction::Increment { variable, .. }
            | VariableAction::Toggle { variable }
            | VariableAction::Append { variable, .. }
            | VariableAction::Copy { variable, .. } => variable,
        }
    }

    /// Apply this action to `store`.
    ///
    /// # Errors
    /// Returns a warning (and leaves the store untouched) if the target or source
    /// variable is missing, or holds a kind the action cannot work with.
    pub fn apply<S: VariableStore + ?Sized>(&self, store: &mut S) -> Result<(), EvalWarning> {
        let name = self.variable();
        let current = store.get(name).ok_or_else(|| EvalWarning::MissingVariable { name: name.to_string() })?;
        let mismatch = |expected: &'static str| EvalWarning::TypeMismatch {
            name: name.to_string(),
            expected,
            found: current.kind(),
        };

        let updated = match self {
            VariableAction::Set { value, .. } => {
                if value.kind() != current.kind() {
                    return Err(mismatch(value.kind()));
                }
                value.clone()
            },
            VariableAction::Increment { by, .. } => {
                let n = current.as_number().ok_or_else(|| mismatch("number"))?;
                Value::Number(n + by)
            },
            VariableAction::Toggle { .. } => {
                let b = current.as_bool().ok_or_else(|| mismatch("bool"))?;
                Value::Bool(!b)
            },
            VariableAction::Append { text, .. } => {
                let s = current.as_text().ok_or_else(|| mismatch("text"))?;
                Value::Text(format!("{s}{text}"))
            },
            VariableAction::Copy { from, .. } => {
                let source = store
                    .get(from)
                    .ok_or_else(|| EvalWarning::MissingVariable { name: from.clone() })?;
                if source.kind() != current.kind() {
                    return Err(mismatch(source.kind()));
                }
                source
            },
        };
        store.set(name, updated);
        Ok(())
    }
}

/// Apply `actions` in order, skipping (and collecting warnings for) any that fail.
pub fn apply_actions<S: VariableStore + ?Sized>(store: &mut S, actions: &[VariableAction]) -> Vec<EvalWarning> {
    let mut warnings = Vec::new();
    for action in actions {
        match action.apply(store) {
            Ok(()) => info!("└─ action: {action}"),
            Err(warning) => {
                warn!("└─ action: {action} skipped: {warning}");
                warnings.push(warning);
            },
        }
    }
    warnings
}
