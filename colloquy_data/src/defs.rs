use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier used across GraphDef references.
pub type Id = String;

/// Top-level dialogue content loaded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphDef {
    #[serde(default)]
    pub title: String,
    pub entry: Id,
    /// Declared variables and their starting values.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

/// A literal variable value as written in content files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Name of the value's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// One dialogue node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<ActorDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<ActorDef>,
    #[serde(default)]
    pub listener_is_speaker: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub choices: Vec<ChoiceDef>,
    #[serde(default)]
    pub branches: Vec<BranchDef>,
    #[serde(default)]
    pub exit_actions: Vec<ActionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Id>,
    #[serde(default)]
    pub playback: PlaybackDef,
}

/// Identity and expression hints for a speaking or listening character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// A player-selectable option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDef {
    pub text: String,
    #[serde(default)]
    pub conditions: Vec<OperationDef>,
    #[serde(default)]
    pub gate: GateDef,
    /// Absent target ends the conversation after this choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Id>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

/// How a choice whose conditions fail is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum GateDef {
    #[default]
    Hide,
    Disable,
}

/// Condition-gated redirect evaluated when a node is entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operations: Vec<OperationDef>,
    pub target: Id,
}

/// A single test against a named variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDef {
    pub variable: String,
    #[serde(default)]
    pub comparator: ComparatorDef,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ComparatorDef {
    #[default]
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contains,
}

impl ComparatorDef {
    /// True for comparators that only make sense between numbers.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            ComparatorDef::Less | ComparatorDef::LessOrEqual | ComparatorDef::Greater | ComparatorDef::GreaterOrEqual
        )
    }
}

/// A single mutation of a named variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ActionDef {
    Set { variable: String, value: Value },
    Increment { variable: String, by: f64 },
    Toggle { variable: String },
    Append { variable: String, text: String },
    Copy { variable: String, from: String },
}

impl ActionDef {
    pub fn variable(&self) -> &str {
        match self {
            ActionDef::Set { variable, .. }
            | ActionDef::Increment { variable, .. }
            | ActionDef::Toggle { variable }
            | ActionDef::Append { variable, .. }
            | ActionDef::Copy { variable, .. } => variable,
        }
    }
}

/// Per-node playback overrides; unset fields fall back to global defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaybackDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_mode: Option<WaitModeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_advance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_advance_delay: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_skip_audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_voice_on_exit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_typewriter_to_audio: Option<bool>,
}

/// Longest auto-advance delay or voice duration accepted, in seconds.
pub const MAX_PLAYBACK_SECS: f32 = 3600.0;

/// Voice line attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDef {
    pub clip: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f32>,
}

fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitModeDef {
    None,
    TextOnly,
    AudioOnly,
    Both,
    Either,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
title = "Gate"
entry = "start"

[variables]
met_guard = false
coins = 3
name = "traveller"

[[nodes]]
id = "start"
text = "Halt."
next = "ask"
speaker = { name = "Guard", expression = "stern" }

[[nodes.branches]]
name = "already met"
target = "wave"
operations = [{ variable = "met_guard", value = true }]

[[nodes.exit_actions]]
op = "set"
variable = "met_guard"
value = true

[[nodes]]
id = "ask"
text = "Toll?"

[[nodes.choices]]
text = "Pay"
target = "wave"
gate = "disable"
conditions = [{ variable = "coins", comparator = "greaterOrEqual", value = 1 }]
actions = [{ op = "increment", variable = "coins", by = -1 }]

[[nodes.choices]]
text = "Leave"

[[nodes]]
id = "wave"
text = "Go on."
playback = { wait_mode = "textOnly", auto_advance = true }
"#;

    #[test]
    fn graph_def_parses_from_toml() {
        let def: GraphDef = toml::from_str(SAMPLE).expect("sample should parse");
        assert_eq!(def.entry, "start");
        assert_eq!(def.nodes.len(), 3);
        assert_eq!(def.variables.get("coins"), Some(&Value::Number(3.0)));
        assert_eq!(def.variables.get("name"), Some(&Value::Text("traveller".into())));

        let start = &def.nodes[0];
        assert_eq!(start.branches[0].operations[0].comparator, ComparatorDef::Equal);
        assert_eq!(
            start.exit_actions[0],
            ActionDef::Set {
                variable: "met_guard".into(),
                value: Value::Bool(true)
            }
        );

        let ask = &def.nodes[1];
        assert_eq!(ask.choices[0].gate, GateDef::Disable);
        assert_eq!(ask.choices[1].gate, GateDef::Hide);
        assert!(ask.choices[1].target.is_none());

        let wave = &def.nodes[2];
        assert_eq!(wave.playback.wait_mode, Some(WaitModeDef::TextOnly));
        assert_eq!(wave.playback.allow_skip_audio, None);
    }

    #[test]
    fn actions_use_op_tag_in_json() {
        let action = ActionDef::Append {
            variable: "log".into(),
            text: "x".into(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, r#"{"op":"append","variable":"log","text":"x"}"#);
        assert_eq!(action.variable(), "log");
    }

    #[test]
    fn ordering_comparators_are_flagged() {
        assert!(ComparatorDef::Less.is_ordering());
        assert!(ComparatorDef::GreaterOrEqual.is_ordering());
        assert!(!ComparatorDef::Equal.is_ordering());
        assert!(!ComparatorDef::Contains.is_ordering());
    }
}
