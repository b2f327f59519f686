#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]

pub const COLLOQUY_VERSION: &str = env!("CARGO_PKG_VERSION");

// Core modules
pub mod action;
pub mod condition;
pub mod error;
pub mod graph;
pub mod loader;
pub mod node;
pub mod playback;
pub mod runtime;
pub mod store;

// Console host
pub mod repl;
pub mod session;
pub mod style;
pub mod view;

// Re-exports for convenience
pub use action::VariableAction;
pub use colloquy_data::Value;
pub use condition::{Comparator, Evaluation, VariableOperation};
pub use error::{EvalWarning, GraphError, RuntimeError};
pub use graph::DialogueGraph;
pub use loader::{load_config, load_dialogue, save_graph};
pub use node::{Actor, ChoiceGate, ConditionalBranch, DialogueChoice, DialogueNode, NodeId};
pub use playback::{
    CompletionTracker, EffectivePlaybackPolicy, PlaybackDefaults, PlaybackOverrides, VoiceLine, WaitMode,
    resolve_effective_policy,
};
pub use repl::run_repl;
pub use runtime::{DialogueEvent, DialogueRuntime, EndReason, EventSink, NodeView, RuntimeState, SessionSnapshot};
pub use store::{MemoryStore, SharedStore, VariableStore};
