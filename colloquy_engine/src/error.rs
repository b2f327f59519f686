//! Error and warning types for the dialogue engine.
//!
//! Three tiers: content errors (`GraphError`) halt a session gracefully,
//! evaluation warnings (`EvalWarning`) are logged while evaluation carries on,
//! and usage errors (`RuntimeError`) reject a call without touching any state.

use thiserror::Error;

use crate::runtime::RuntimeState;

/// Content-authoring problems found while walking a loaded graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("node '{id}' not found")]
    NodeNotFound { id: String },
}

/// Non-fatal problems met while evaluating conditions or applying actions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalWarning {
    #[error("variable '{name}' is not defined")]
    MissingVariable { name: String },

    #[error("variable '{name}' holds a {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("branch cycle: '{from}' points back to '{to}' during the same entry")]
    BranchCycle { from: String, to: String },
}

/// Rejected runtime calls. State is unchanged whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("entry node '{id}' not found")]
    EntryNotFound { id: String },

    #[error("choice index {index} out of range, valid range is 0..{len}")]
    ChoiceIndexOutOfRange { index: usize, len: usize },

    #[error("choice {index} is not available")]
    ChoiceUnavailable { index: usize },

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: RuntimeState,
    },

    #[error("node '{node}' is still playing and does not allow skipping")]
    AdvanceBlocked { node: String },

    #[error("saved session refers to unknown node '{id}'")]
    UnknownSnapshotNode { id: String },
}
