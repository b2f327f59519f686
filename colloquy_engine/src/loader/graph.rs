//! `GraphDef` file IO and conversion to and from runtime types.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::info;

use colloquy_data::{
    ActionDef, ActorDef, BranchDef, ChoiceDef, ComparatorDef, GateDef, GraphDef, NodeDef, OperationDef, PlaybackDef,
    VoiceDef, WaitModeDef,
};

use crate::action::VariableAction;
use crate::condition::{Comparator, VariableOperation};
use crate::graph::DialogueGraph;
use crate::node::{Actor, ChoiceGate, ConditionalBranch, DialogueChoice, DialogueNode};
use crate::playback::{PlaybackOverrides, VoiceLine, WaitMode};

/// Serialization format of a content file, picked by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Toml,
    Ron,
    Json,
}

impl ContentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(ContentFormat::Toml),
            "ron" => Some(ContentFormat::Ron),
            "json" => Some(ContentFormat::Json),
            _ => None,
        }
    }

    fn for_path(path: &Path) -> Result<Self> {
        Self::from_path(path)
            .ok_or_else(|| anyhow!("'{}' is not a .toml, .ron or .json file", path.display()))
    }

    /// Parse content text in this format.
    ///
    /// # Errors
    /// Returns the underlying deserializer error.
    pub fn parse(self, text: &str) -> Result<GraphDef> {
        let def = match self {
            ContentFormat::Toml => toml::from_str(text)?,
            ContentFormat::Ron => ron::from_str(text)?,
            ContentFormat::Json => serde_json::from_str(text)?,
        };
        Ok(def)
    }

    /// Render a `GraphDef` as text in this format.
    ///
    /// # Errors
    /// Returns the underlying serializer error.
    pub fn render(self, def: &GraphDef) -> Result<String> {
        let text = match self {
            ContentFormat::Toml => toml::to_string_pretty(def)?,
            ContentFormat::Ron => ron::ser::to_string_pretty(def, ron::ser::PrettyConfig::default())?,
            ContentFormat::Json => serde_json::to_string_pretty(def)?,
        };
        Ok(text)
    }
}

/// Load a `GraphDef` from a content file, choosing the format by extension.
///
/// # Errors
/// Unknown extension, unreadable file or malformed content.
pub fn load_graphdef(path: &Path) -> Result<GraphDef> {
    let format = ContentFormat::for_path(path)?;
    let text = fs::read_to_string(path).with_context(|| format!("reading dialogue from '{}'", path.display()))?;
    format
        .parse(&text)
        .with_context(|| format!("parsing {format:?} dialogue from '{}'", path.display()))
}

/// Write a graph back out in the format implied by `path`'s extension.
///
/// # Errors
/// Unknown extension, serialization failure or IO failure.
pub fn save_graph(graph: &DialogueGraph, path: &Path) -> Result<()> {
    let format = ContentFormat::for_path(path)?;
    let text = format
        .render(&graph_to_def(graph))
        .with_context(|| format!("serializing dialogue as {format:?}"))?;
    fs::write(path, text).with_context(|| format!("writing dialogue to '{}'", path.display()))?;
    info!("dialogue \"{}\" saved to '{}'", graph.title(), path.display());
    Ok(())
}

/// Convert a validated `GraphDef` into a runtime `DialogueGraph`.
pub fn build_graph_from_def(def: &GraphDef) -> DialogueGraph {
    DialogueGraph::from_nodes(def.entry.clone(), def.nodes.iter().map(node_from_def))
        .with_title(def.title.clone())
        .with_variables(def.variables.clone())
}

/// Convert a runtime graph back into its serializable definition.
pub fn graph_to_def(graph: &DialogueGraph) -> GraphDef {
    GraphDef {
        title: graph.title().to_string(),
        entry: graph.entry().to_string(),
        variables: graph.variables().clone(),
        nodes: graph.nodes().map(node_to_def).collect(),
    }
}

fn node_from_def(def: &NodeDef) -> DialogueNode {
    DialogueNode {
        id: def.id.clone(),
        speaker: def.speaker.as_ref().map(actor_from_def),
        listener: def.listener.as_ref().map(actor_from_def),
        listener_is_speaker: def.listener_is_speaker,
        text: def.text.clone(),
        choices: def.choices.iter().map(choice_from_def).collect(),
        branches: def.branches.iter().map(branch_from_def).collect(),
        exit_actions: def.exit_actions.iter().map(action_from_def).collect(),
        next: def.next.clone(),
        playback: playback_from_def(&def.playback),
    }
}

fn node_to_def(node: &DialogueNode) -> NodeDef {
    NodeDef {
        id: node.id.clone(),
        speaker: node.speaker.as_ref().map(actor_to_def),
        listener: node.listener.as_ref().map(actor_to_def),
        listener_is_speaker: node.listener_is_speaker,
        text: node.text.clone(),
        choices: node.choices.iter().map(choice_to_def).collect(),
        branches: node.branches.iter().map(branch_to_def).collect(),
        exit_actions: node.exit_actions.iter().map(action_to_def).collect(),
        next: node.next.clone(),
        playback: playback_to_def(&node.playback),
    }
}

fn actor_from_def(def: &ActorDef) -> Actor {
    Actor {
        name: def.name.clone(),
        character: def.character.clone(),
        expression: def.expression.clone(),
    }
}

fn actor_to_def(actor: &Actor) -> ActorDef {
    ActorDef {
        name: actor.name.clone(),
        character: actor.character.clone(),
        expression: actor.expression.clone(),
    }
}

fn choice_from_def(def: &ChoiceDef) -> DialogueChoice {
    DialogueChoice {
        text: def.text.clone(),
        conditions: def.conditions.iter().map(operation_from_def).collect(),
        gate: match def.gate {
            GateDef::Hide => ChoiceGate::Hide,
            GateDef::Disable => ChoiceGate::Disable,
        },
        target: def.target.clone(),
        actions: def.actions.iter().map(action_from_def).collect(),
    }
}

fn choice_to_def(choice: &DialogueChoice) -> ChoiceDef {
    ChoiceDef {
        text: choice.text.clone(),
        conditions: choice.conditions.iter().map(operation_to_def).collect(),
        gate: match choice.gate {
            ChoiceGate::Hide => GateDef::Hide,
            ChoiceGate::Disable => GateDef::Disable,
        },
        target: choice.target.clone(),
        actions: choice.actions.iter().map(action_to_def).collect(),
    }
}

fn branch_from_def(def: &BranchDef) -> ConditionalBranch {
    ConditionalBranch {
        name: def.name.clone(),
        operations: def.operations.iter().map(operation_from_def).collect(),
        target: def.target.clone(),
    }
}

fn branch_to_def(branch: &ConditionalBranch) -> BranchDef {
    BranchDef {
        name: branch.name.clone(),
        operations: branch.operations.iter().map(operation_to_def).collect(),
        target: branch.target.clone(),
    }
}

fn operation_from_def(def: &OperationDef) -> VariableOperation {
    let comparator = match def.comparator {
        ComparatorDef::Equal => Comparator::Equal,
        ComparatorDef::NotEqual => Comparator::NotEqual,
        ComparatorDef::Less => Comparator::Less,
        ComparatorDef::LessOrEqual => Comparator::LessOrEqual,
        ComparatorDef::Greater => Comparator::Greater,
        ComparatorDef::GreaterOrEqual => Comparator::GreaterOrEqual,
        ComparatorDef::Contains => Comparator::Contains,
    };
    VariableOperation::new(def.variable.clone(), comparator, def.value.clone())
}

fn operation_to_def(op: &VariableOperation) -> OperationDef {
    let comparator = match op.comparator {
        Comparator::Equal => ComparatorDef::Equal,
        Comparator::NotEqual => ComparatorDef::NotEqual,
        Comparator::Less => ComparatorDef::Less,
        Comparator::LessOrEqual => ComparatorDef::LessOrEqual,
        Comparator::Greater => ComparatorDef::Greater,
        Comparator::GreaterOrEqual => ComparatorDef::GreaterOrEqual,
        Comparator::Contains => ComparatorDef::Contains,
    };
    OperationDef {
        variable: op.variable.clone(),
        comparator,
        value: op.value.clone(),
    }
}

fn action_from_def(def: &ActionDef) -> VariableAction {
    match def {
        ActionDef::Set { variable, value } => VariableAction::Set {
            variable: variable.clone(),
            value: value.clone(),
        },
        ActionDef::Increment { variable, by } => VariableAction::Increment {
            variable: variable.clone(),
            by: *by,
        },
        ActionDef::Toggle { variable } => VariableAction::Toggle {
            variable: variable.clone(),
        },
        ActionDef::Append { variable, text } => VariableAction::Append {
            variable: variable.clone(),
            text: text.clone(),
        },
        ActionDef::Copy { variable, from } => VariableAction::Copy {
            variable: variable.clone(),
            from: from.clone(),
        },
    }
}

fn action_to_def(action: &VariableAction) -> ActionDef {
    match action {
        VariableAction::Set { variable, value } => ActionDef::Set {
            variable: variable.clone(),
            value: value.clone(),
        },
        VariableAction::Increment { variable, by } => ActionDef::Increment {
            variable: variable.clone(),
            by: *by,
        },
        VariableAction::Toggle { variable } => ActionDef::Toggle {
            variable: variable.clone(),
        },
        VariableAction::Append { variable, text } => ActionDef::Append {
            variable: variable.clone(),
            text: text.clone(),
        },
        VariableAction::Copy { variable, from } => ActionDef::Copy {
            variable: variable.clone(),
            from: from.clone(),
        },
    }
}

fn wait_mode_from_def(def: WaitModeDef) -> WaitMode {
    match def {
        WaitModeDef::None => WaitMode::None,
        WaitModeDef::TextOnly => WaitMode::TextOnly,
        WaitModeDef::AudioOnly => WaitMode::AudioOnly,
        WaitModeDef::Both => WaitMode::Both,
        WaitModeDef::Either => WaitMode::Either,
    }
}

fn wait_mode_to_def(mode: WaitMode) -> WaitModeDef {
    match mode {
        WaitMode::None => WaitModeDef::None,
        WaitMode::TextOnly => WaitModeDef::TextOnly,
        WaitMode::AudioOnly => WaitModeDef::AudioOnly,
        WaitMode::Both => WaitModeDef::Both,
        WaitMode::Either => WaitModeDef::Either,
    }
}

// validation rejects anything outside 0..=MAX_PLAYBACK_SECS; treat leftovers as unset
fn seconds(secs: Option<f32>) -> Option<Duration> {
    secs.and_then(|s| Duration::try_from_secs_f32(s).ok())
}

fn playback_from_def(def: &PlaybackDef) -> PlaybackOverrides {
    PlaybackOverrides {
        voice: def.voice.as_ref().map(|v| VoiceLine {
            clip: v.clip.clone(),
            volume: v.volume.clamp(0.0, 1.0),
            duration: seconds(v.duration_secs),
        }),
        wait_mode: def.wait_mode.map(wait_mode_from_def),
        auto_advance: def.auto_advance,
        auto_advance_delay: seconds(def.auto_advance_delay),
        allow_skip_audio: def.allow_skip_audio,
        stop_voice_on_exit: def.stop_voice_on_exit,
        match_typewriter_to_audio: def.match_typewriter_to_audio,
    }
}

fn playback_to_def(overrides: &PlaybackOverrides) -> PlaybackDef {
    PlaybackDef {
        voice: overrides.voice.as_ref().map(|v| VoiceDef {
            clip: v.clip.clone(),
            volume: v.volume,
            duration_secs: v.duration.map(|d| d.as_secs_f32()),
        }),
        wait_mode: overrides.wait_mode.map(wait_mode_to_def),
        auto_advance: overrides.auto_advance,
        auto_advance_delay: overrides.auto_advance_delay.map(|d| d.as_secs_f32()),
        allow_skip_audio: overrides.allow_skip_audio,
        stop_voice_on_exit: overrides.stop_voice_on_exit,
        match_typewriter_to_audio: overrides.match_typewriter_to_audio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    const SAMPLE: &str = r#"
title = "Gatekeeper"
entry = "gate"

[variables]
has_pass = false
bribe = 0

[[nodes]]
id = "gate"
text = "Halt. State your business."
speaker = { name = "Guard", expression = "stern" }

[[nodes.branches]]
name = "recognized"
target = "wave_through"
operations = [{ variable = "has_pass", value = true }]

[[nodes.choices]]
text = "Offer a coin"
target = "gate"
actions = [{ op = "increment", variable = "bribe", by = 1 }]

[[nodes.choices]]
text = "Leave"

[[nodes]]
id = "wave_through"
text = "Go on then."
playback = { wait_mode = "textOnly", auto_advance = true, auto_advance_delay = 0.5 }
"#;

    #[test]
    fn extension_picks_format() {
        assert_eq!(ContentFormat::from_path(Path::new("a/b.TOML")), Some(ContentFormat::Toml));
        assert_eq!(ContentFormat::from_path(Path::new("b.ron")), Some(ContentFormat::Ron));
        assert_eq!(ContentFormat::from_path(Path::new("b.json")), Some(ContentFormat::Json));
        assert_eq!(ContentFormat::from_path(Path::new("b.yaml")), None);
        assert_eq!(ContentFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn builds_runtime_nodes_from_toml() {
        let def = ContentFormat::Toml.parse(SAMPLE).unwrap();
        let graph = build_graph_from_def(&def);

        assert_eq!(graph.title(), "Gatekeeper");
        assert_eq!(graph.variables().get("bribe"), Some(&Value::Number(0.0)));

        let gate = graph.resolve("gate").unwrap();
        assert_eq!(gate.speaker.as_ref().unwrap().expression.as_deref(), Some("stern"));
        assert_eq!(gate.branches[0].operations[0].comparator, Comparator::Equal);
        assert_eq!(
            gate.choices[0].actions,
            vec![VariableAction::Increment {
                variable: "bribe".into(),
                by: 1.0
            }]
        );
        assert_eq!(gate.choices[1].target, None);

        let through = graph.resolve("wave_through").unwrap();
        assert_eq!(through.playback.wait_mode, Some(WaitMode::TextOnly));
        assert_eq!(through.playback.auto_advance_delay, Some(Duration::from_millis(500)));
        assert_eq!(through.playback.allow_skip_audio, None);
    }

    #[test]
    fn runtime_graph_converts_back_to_the_same_def() {
        let def = ContentFormat::Toml.parse(SAMPLE).unwrap();
        assert_eq!(graph_to_def(&build_graph_from_def(&def)), def);
    }

    #[test]
    fn bad_delay_is_treated_as_unset() {
        assert_eq!(seconds(Some(-1.0)), None);
        assert_eq!(seconds(Some(f32::NAN)), None);
        assert_eq!(seconds(Some(2.0)), Some(Duration::from_secs(2)));
    }
}
