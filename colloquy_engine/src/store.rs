//! Variable storage consumed by the dialogue engine.
//!
//! The engine never owns variables. It reads and writes them through the
//! [`VariableStore`] trait so a host can plug in its own state. Two stores are
//! provided: [`MemoryStore`] for a single owner and [`SharedStore`] for several
//! runtimes that share one set of variables across threads.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::Value;
use crate::action::{VariableAction, apply_actions};
use crate::condition::{Evaluation, VariableOperation, evaluate};
use crate::error::EvalWarning;

/// Named, typed variables read and mutated by dialogue content.
pub trait VariableStore {
    fn get(&self, name: &str) -> Option<Value>;
    fn set(&mut self, name: &str, value: Value);

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn get_bool(&self, name: &str) -> Result<bool, EvalWarning> {
        typed(name, self.get(name), "bool", Value::as_bool)
    }

    fn get_number(&self, name: &str) -> Result<f64, EvalWarning> {
        typed(name, self.get(name), "number", Value::as_number)
    }

    fn get_text(&self, name: &str) -> Result<String, EvalWarning> {
        typed(name, self.get(name), "text", |v| v.as_text().map(str::to_string))
    }

    /// Evaluate an AND-combined list of operations against a consistent view of the store.
    fn evaluate(&self, operations: &[VariableOperation]) -> Evaluation {
        evaluate(self, operations)
    }

    /// Apply a batch of actions in order. Implementations must make the whole batch
    /// visible at once to other readers.
    fn apply_batch(&mut self, actions: &[VariableAction]) -> Vec<EvalWarning> {
        apply_actions(self, actions)
    }
}

fn typed<T>(
    name: &str,
    value: Option<Value>,
    expected: &'static str,
    extract: impl Fn(&Value) -> Option<T>,
) -> Result<T, EvalWarning> {
    let value = value.ok_or_else(|| EvalWarning::MissingVariable { name: name.to_string() })?;
    extract(&value).ok_or_else(|| EvalWarning::TypeMismatch {
        name: name.to_string(),
        expected,
        found: value.kind(),
    })
}

/// Plain in-memory variable map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    vars: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add declared variables that are not yet present, leaving existing values alone.
    pub fn declare(&mut self, declarations: &BTreeMap<String, Value>) {
        for (name, value) in declarations {
            if !self.vars.contains_key(name) {
                debug!("declaring variable '{name}' = {value}");
                self.vars.insert(name.clone(), value.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl VariableStore for MemoryStore {
    fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

/// A `MemoryStore` behind a lock, cloneable across runtimes and threads.
///
/// Condition lists are evaluated under a single read lock and action batches are
/// applied under a single write lock, so a reader never sees half of a batch.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<MemoryStore>>,
}

impl SharedStore {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> MemoryStore {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl VariableStore for SharedStore {
    fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).get(name)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(name, value);
    }

    fn evaluate(&self, operations: &[VariableOperation]) -> Evaluation {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        evaluate(&*guard, operations)
    }

    fn apply_batch(&mut self, actions: &[VariableAction]) -> Vec<EvalWarning> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply_actions(&mut *guard, actions)
    }
}
