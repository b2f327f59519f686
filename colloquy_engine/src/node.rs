//! Runtime dialogue node types.
//!
//! These are built from the `colloquy_data` definitions by the loader and are
//! never mutated once a graph is constructed.

use serde::{Deserialize, Serialize};

use crate::action::VariableAction;
use crate::condition::VariableOperation;
use crate::playback::PlaybackOverrides;

/// Unique, stable node identifier.
pub type NodeId = String;

/// Who is speaking or listening. Presentation hints only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub character: Option<String>,
    pub expression: Option<String>,
}

/// How a choice is shown when its conditions fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChoiceGate {
    #[default]
    Hide,
    Disable,
}

/// A player-selectable option. `target` of `None` ends the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueChoice {
    pub text: String,
    pub conditions: Vec<VariableOperation>,
    pub gate: ChoiceGate,
    pub target: Option<NodeId>,
    pub actions: Vec<VariableAction>,
}

/// Condition-gated redirect checked when a node is entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBranch {
    pub name: String,
    pub operations: Vec<VariableOperation>,
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: NodeId,
    pub speaker: Option<Actor>,
    pub listener: Option<Actor>,
    pub listener_is_speaker: bool,
    pub text: String,
    pub choices: Vec<DialogueChoice>,
    pub branches: Vec<ConditionalBranch>,
    pub exit_actions: Vec<VariableAction>,
    pub next: Option<NodeId>,
    pub playback: PlaybackOverrides,
}

impl DialogueNode {
    /// A bare linear node, mostly useful for building graphs in code.
    pub fn new(id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            speaker: None,
            listener: None,
            listener_is_speaker: false,
            text: text.into(),
            choices: Vec::new(),
            branches: Vec::new(),
            exit_actions: Vec::new(),
            next: None,
            playback: PlaybackOverrides::default(),
        }
    }

    /// No choices and no linear successor.
    pub fn is_terminal(&self) -> bool {
        self.choices.is_empty() && self.next.is_none()
    }

    pub fn is_interactive(&self) -> bool {
        !self.choices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_iff_no_choices_and_no_next() {
        let mut node = DialogueNode::new("a", "text");
        assert!(node.is_terminal());

        node.next = Some("b".into());
        assert!(!node.is_terminal());

        node.next = None;
        node.choices.push(DialogueChoice {
            text: "ok".into(),
            conditions: Vec::new(),
            gate: ChoiceGate::Hide,
            target: None,
            actions: Vec::new(),
        });
        assert!(!node.is_terminal());
        assert!(node.is_interactive());
    }
}
