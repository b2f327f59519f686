//! # Runtime module
//!
//! The dialogue state machine. One [`DialogueRuntime`] is one conversation.
//!
//! ```text
//! Idle ──start──► EnteringNode ──branch fires──► EnteringNode (target)
//!                      │
//!                      ▼
//!               PresentingNode ──choices available──► AwaitingChoice
//!                      │                                   │
//!            advance / auto-advance                  select_choice
//!                      ▼                                   ▼
//!                 ExitingNode ◄────────────────────────────┘
//!                      │
//!        next / choice target ──► EnteringNode
//!        none ──► Terminated
//! ```
//!
//! The runtime only moves when the host calls into it. Everything it wants the
//! presentation layer to know is pushed to an [`EventSink`] as a
//! [`DialogueEvent`]. `EnteringNode` and `ExitingNode` are passed through within
//! a single call and are never observed between calls.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use variantly::Variantly;

use crate::action::VariableAction;
use crate::error::{EvalWarning, GraphError, RuntimeError};
use crate::graph::DialogueGraph;
use crate::node::{Actor, ChoiceGate, DialogueNode, NodeId};
use crate::playback::{CompletionTracker, EffectivePlaybackPolicy, PlaybackDefaults, resolve_effective_policy};
use crate::store::VariableStore;

/// Runtime state. See the module docs for the transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeState {
    Idle,
    EnteringNode,
    PresentingNode,
    AwaitingChoice,
    ExitingNode,
    Terminated,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Left a node with nowhere further to go.
    Completed { last: NodeId },
    /// `stop()` was called; pending exit actions were abandoned.
    Stopped,
    /// A node reference could not be resolved.
    Halted { missing: NodeId },
}

/// Visibility of a choice, decided once when its node is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceStatus {
    Available,
    Disabled,
    Hidden,
}

/// A choice as the presentation layer should show it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceView {
    /// Index into the node's full choice list; pass this to `select_choice`.
    pub index: usize,
    pub text: String,
    pub enabled: bool,
}

/// Everything needed to render the node that was just entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub activation: u64,
    pub speaker: Option<Actor>,
    pub listener: Option<Actor>,
    pub listener_is_speaker: bool,
    pub text: String,
    pub policy: EffectivePlaybackPolicy,
    /// Hidden choices are left out.
    pub choices: Vec<ChoiceView>,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Variantly)]
pub enum DialogueEvent {
    SessionStarted { session: Uuid, entry: NodeId },
    BranchTaken { from: NodeId, to: NodeId, branch: String },
    NodeEntered(NodeView),
    /// The node's wait mode is satisfied; auto-advance may begin counting.
    CompletionReached { node: NodeId },
    /// Advancing or choosing cut off audio that was still playing.
    PlaybackInterrupted { node: NodeId },
    NodeExited { node: NodeId, stop_voice: bool },
    Warning { node: NodeId, warning: EvalWarning },
    ContentError(GraphError),
    Ended(EndReason),
}

/// Receiver for dialogue notifications.
pub trait EventSink {
    fn notify(&mut self, event: DialogueEvent);
}

impl EventSink for Vec<DialogueEvent> {
    fn notify(&mut self, event: DialogueEvent) {
        self.push(event);
    }
}

/// One line of the session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TranscriptEntry {
    Presented { node: NodeId, activation: u64 },
    Chose { node: NodeId, index: usize, text: String },
}

/// Serializable copy of a session, taken between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: Uuid,
    pub state: RuntimeState,
    pub current: Option<NodeId>,
    pub activation: u64,
    pub choices: Vec<ChoiceStatus>,
    pub completion: CompletionTracker,
    pub transcript: Vec<TranscriptEntry>,
    pub end: Option<EndReason>,
}

/// A single conversation walking a shared [`DialogueGraph`].
#[derive(Debug)]
pub struct DialogueRuntime {
    graph: Arc<DialogueGraph>,
    defaults: PlaybackDefaults,
    session: Uuid,
    state: RuntimeState,
    current: Option<NodeId>,
    activation: u64,
    policy: Option<EffectivePlaybackPolicy>,
    choices: Vec<ChoiceStatus>,
    completion: CompletionTracker,
    completion_announced: bool,
    waited: Duration,
    transcript: Vec<TranscriptEntry>,
    end: Option<EndReason>,
}

impl DialogueRuntime {
    pub fn new(graph: Arc<DialogueGraph>, defaults: PlaybackDefaults) -> Self {
        Self {
            graph,
            defaults,
            session: Uuid::new_v4(),
            state: RuntimeState::Idle,
            current: None,
            activation: 0,
            policy: None,
            choices: Vec::new(),
            completion: CompletionTracker::default(),
            completion_announced: false,
            waited: Duration::ZERO,
            transcript: Vec::new(),
            end: None,
        }
    }

    /// Rebuild a runtime from a snapshot taken against the same graph.
    ///
    /// # Errors
    /// `RuntimeError::UnknownSnapshotNode` if the saved node no longer exists.
    pub fn restore(
        graph: Arc<DialogueGraph>,
        defaults: PlaybackDefaults,
        snapshot: SessionSnapshot,
    ) -> Result<Self, RuntimeError> {
        let node = match &snapshot.current {
            Some(id) => Some(
                graph
                    .resolve(id)
                    .map_err(|_| RuntimeError::UnknownSnapshotNode { id: id.clone() })?,
            ),
            None => None,
        };
        let presenting = matches!(snapshot.state, RuntimeState::PresentingNode | RuntimeState::AwaitingChoice);
        let policy = node
            .filter(|_| presenting)
            .map(|node| resolve_effective_policy(&node.playback, &defaults));
        let completion_announced = policy
            .as_ref()
            .is_some_and(|p| snapshot.completion.is_satisfied(p.wait_mode));
        info!(
            "session {} restored at {:?} ({:?})",
            snapshot.session, snapshot.current, snapshot.state
        );
        Ok(Self {
            graph,
            defaults,
            session: snapshot.session,
            state: snapshot.state,
            current: snapshot.current,
            activation: snapshot.activation,
            policy,
            choices: snapshot.choices,
            completion: snapshot.completion,
            completion_announced,
            waited: Duration::ZERO,
            transcript: snapshot.transcript,
            end: snapshot.end,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session,
            state: self.state,
            current: self.current.clone(),
            activation: self.activation,
            choices: self.choices.clone(),
            completion: self.completion.clone(),
            transcript: self.transcript.clone(),
            end: self.end.clone(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn graph(&self) -> &DialogueGraph {
        &self.graph
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The node being presented, if any.
    pub fn current_node(&self) -> Option<&DialogueNode> {
        if matches!(self.state, RuntimeState::PresentingNode | RuntimeState::AwaitingChoice) {
            self.current.as_deref().and_then(|id| self.graph.resolve(id).ok())
        } else {
            None
        }
    }

    /// Render the node being presented, as sent with `NodeEntered`.
    pub fn current_view(&self) -> Option<NodeView> {
        let node = self.current_node()?;
        let policy = self.policy.clone()?;
        let choices = node
            .choices
            .iter()
            .zip(&self.choices)
            .enumerate()
            .filter(|(_, (_, status))| **status != ChoiceStatus::Hidden)
            .map(|(index, (choice, status))| ChoiceView {
                index,
                text: choice.text.clone(),
                enabled: *status == ChoiceStatus::Available,
            })
            .collect();
        Some(NodeView {
            id: node.id.clone(),
            activation: self.activation,
            speaker: node.speaker.clone(),
            listener: node.listener.clone(),
            listener_is_speaker: node.listener_is_speaker,
            text: node.text.clone(),
            policy,
            choices,
        })
    }

    /// Resolved playback policy of the current node.
    pub fn policy(&self) -> Option<&EffectivePlaybackPolicy> {
        self.policy.as_ref()
    }

    pub fn choice_statuses(&self) -> &[ChoiceStatus] {
        &self.choices
    }

    /// Whether the current node's wait mode has been met.
    pub fn is_complete(&self) -> bool {
        self.policy
            .as_ref()
            .is_some_and(|p| self.completion.is_satisfied(p.wait_mode))
    }

    pub fn is_finished(&self) -> bool {
        self.state == RuntimeState::Terminated
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Begin the conversation at `entry`, or at the graph's entry node.
    ///
    /// # Errors
    /// - `InvalidState` unless the runtime is `Idle`
    /// - `EntryNotFound` if the entry node does not exist; the session stays `Idle`
    pub fn start(
        &mut self,
        entry: Option<&str>,
        store: &dyn VariableStore,
        sink: &mut dyn EventSink,
    ) -> Result<(), RuntimeError> {
        self.require(&[RuntimeState::Idle], "start")?;
        let graph = Arc::clone(&self.graph);
        let entry = entry.unwrap_or(graph.entry());
        if !graph.contains(entry) {
            error!("session {} cannot start: entry node '{entry}' not found", self.session);
            return Err(RuntimeError::EntryNotFound { id: entry.to_string() });
        }

        info!("session {} started at '{entry}'", self.session);
        sink.notify(DialogueEvent::SessionStarted {
            session: self.session,
            entry: entry.to_string(),
        });
        self.enter(entry, store, sink);
        Ok(())
    }

    /// Pick the choice at `index` (an index into the node's full choice list).
    ///
    /// # Errors
    /// - `InvalidState` unless awaiting a choice
    /// - `ChoiceIndexOutOfRange` / `ChoiceUnavailable` for a bad index
    /// - `AdvanceBlocked` while a voice line that may not be skipped is playing
    ///
    /// Nothing changes, in the runtime or the store, when an error is returned.
    pub fn select_choice(
        &mut self,
        index: usize,
        store: &mut dyn VariableStore,
        sink: &mut dyn EventSink,
    ) -> Result<(), RuntimeError> {
        self.require(&[RuntimeState::AwaitingChoice], "select a choice")?;
        let graph = Arc::clone(&self.graph);
        let node = self.current_from(&graph)?;

        let Some(choice) = node.choices.get(index) else {
            return Err(RuntimeError::ChoiceIndexOutOfRange {
                index,
                len: node.choices.len(),
            });
        };
        if self.choices.get(index) != Some(&ChoiceStatus::Available) {
            return Err(RuntimeError::ChoiceUnavailable { index });
        }
        self.cut_playback(&node.id, sink)?;

        info!("'{}': chose {index} \"{}\"", node.id, choice.text);
        self.transcript.push(TranscriptEntry::Chose {
            node: node.id.clone(),
            index,
            text: choice.text.clone(),
        });
        let batch: Vec<VariableAction> = choice.actions.iter().chain(&node.exit_actions).cloned().collect();
        self.exit(node, &batch, choice.target.as_deref(), store, sink);
        Ok(())
    }

    /// The player's advance input on a node without available choices.
    ///
    /// Text that is still revealing is always skippable. Audio that is still
    /// playing is cut off only when the node allows skipping audio.
    ///
    /// # Errors
    /// - `InvalidState` unless presenting a non-interactive node
    /// - `AdvanceBlocked` if audio is playing and may not be skipped
    pub fn advance(&mut self, store: &mut dyn VariableStore, sink: &mut dyn EventSink) -> Result<(), RuntimeError> {
        self.require(&[RuntimeState::PresentingNode], "advance")?;
        let graph = Arc::clone(&self.graph);
        let node = self.current_from(&graph)?;
        self.cut_playback(&node.id, sink)?;
        self.exit(node, &node.exit_actions, node.next.as_deref(), store, sink);
        Ok(())
    }

    /// Player input is leaving the node: finish the text reveal and stop a
    /// voice line that is still playing, unless the node forbids skipping it.
    /// Applies whether or not the wait mode is already satisfied.
    fn cut_playback(&mut self, node: &str, sink: &mut dyn EventSink) -> Result<(), RuntimeError> {
        if !self.completion.audio_done {
            if self.policy.as_ref().is_some_and(|p| !p.allow_skip_audio) {
                return Err(RuntimeError::AdvanceBlocked { node: node.to_string() });
            }
            info!("'{node}': player input interrupted playback");
            sink.notify(DialogueEvent::PlaybackInterrupted { node: node.to_string() });
        }
        self.completion.text_done = true;
        self.completion.audio_done = true;
        Ok(())
    }

    /// The presentation layer finished revealing the node's text.
    ///
    /// # Errors
    /// `InvalidState` unless a node is being presented.
    pub fn on_text_complete(&mut self, sink: &mut dyn EventSink) -> Result<(), RuntimeError> {
        self.require(&[RuntimeState::PresentingNode, RuntimeState::AwaitingChoice], "complete text")?;
        self.completion.text_done = true;
        self.announce_completion(sink);
        Ok(())
    }

    /// The presentation layer finished playing the node's voice line.
    ///
    /// # Errors
    /// `InvalidState` unless a node is being presented.
    pub fn on_audio_complete(&mut self, sink: &mut dyn EventSink) -> Result<(), RuntimeError> {
        self.require(&[RuntimeState::PresentingNode, RuntimeState::AwaitingChoice], "complete audio")?;
        self.completion.audio_done = true;
        self.announce_completion(sink);
        Ok(())
    }

    /// Advance time for auto-advance. Returns `true` if the node was left.
    ///
    /// Ticks outside of a non-interactive presenting node are ignored.
    pub fn tick(&mut self, elapsed: Duration, store: &mut dyn VariableStore, sink: &mut dyn EventSink) -> bool {
        if self.state != RuntimeState::PresentingNode {
            return false;
        }
        let Some(delay) = self
            .policy
            .as_ref()
            .filter(|p| p.auto_advance && self.completion.is_satisfied(p.wait_mode))
            .map(|p| p.auto_advance_delay)
        else {
            return false;
        };
        self.waited += elapsed;
        if self.waited < delay {
            return false;
        }

        let graph = Arc::clone(&self.graph);
        let Ok(node) = self.current_from(&graph) else {
            return false;
        };
        info!("'{}': auto-advancing after {:?}", node.id, self.waited);
        self.exit(node, &node.exit_actions, node.next.as_deref(), store, sink);
        true
    }

    /// Abandon the conversation. Pending exit actions are not applied.
    pub fn stop(&mut self, sink: &mut dyn EventSink) {
        if self.state == RuntimeState::Terminated {
            return;
        }
        info!(
            "session {} stopped at {:?}, skipping pending exit actions",
            self.session, self.current
        );
        self.finish(EndReason::Stopped, sink);
    }

    fn require(&self, allowed: &[RuntimeState], operation: &'static str) -> Result<(), RuntimeError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn current_from<'g>(&self, graph: &'g DialogueGraph) -> Result<&'g DialogueNode, RuntimeError> {
        let id = self.current.as_deref().ok_or(RuntimeError::InvalidState {
            operation: "read the current node",
            state: self.state,
        })?;
        graph
            .resolve(id)
            .map_err(|_| RuntimeError::UnknownSnapshotNode { id: id.to_string() })
    }

    /// Resolve auto-branches starting at `id`, then present the node we land on.
    fn enter(&mut self, id: &str, store: &dyn VariableStore, sink: &mut dyn EventSink) {
        self.state = RuntimeState::EnteringNode;
        let graph = Arc::clone(&self.graph);
        let mut node = match graph.resolve(id) {
            Ok(node) => node,
            Err(err) => return self.halt(err, sink),
        };
        let mut visited = HashSet::from([node.id.as_str()]);

        loop {
            let mut fired = None;
            for branch in &node.branches {
                let eval = store.evaluate(&branch.operations);
                report(&node.id, eval.warnings, sink);
                if eval.passed {
                    fired = Some(branch);
                    break;
                }
            }
            let Some(branch) = fired else {
                break;
            };

            if visited.contains(branch.target.as_str()) {
                let warning = EvalWarning::BranchCycle {
                    from: node.id.clone(),
                    to: branch.target.clone(),
                };
                warn!("{warning}; presenting '{}' instead", node.id);
                report(&node.id, vec![warning], sink);
                break;
            }

            let target = match graph.resolve(&branch.target) {
                Ok(target) => target,
                Err(err) => return self.halt(err, sink),
            };
            info!("'{}': branch \"{}\" -> '{}'", node.id, branch.name, target.id);
            sink.notify(DialogueEvent::BranchTaken {
                from: node.id.clone(),
                to: target.id.clone(),
                branch: branch.name.clone(),
            });
            visited.insert(target.id.as_str());
            node = target;
        }

        self.present(node, store, sink);
    }

    fn present(&mut self, node: &DialogueNode, store: &dyn VariableStore, sink: &mut dyn EventSink) {
        self.activation += 1;
        self.current = Some(node.id.clone());
        let policy = resolve_effective_policy(&node.playback, &self.defaults);
        self.completion = CompletionTracker::for_policy(&policy);
        self.completion_announced = false;
        self.waited = Duration::ZERO;

        self.choices = node
            .choices
            .iter()
            .map(|choice| {
                let eval = store.evaluate(&choice.conditions);
                report(&node.id, eval.warnings, sink);
                match (eval.passed, choice.gate) {
                    (true, _) => ChoiceStatus::Available,
                    (false, ChoiceGate::Disable) => ChoiceStatus::Disabled,
                    (false, ChoiceGate::Hide) => ChoiceStatus::Hidden,
                }
            })
            .collect();
        self.state = if self.choices.contains(&ChoiceStatus::Available) {
            RuntimeState::AwaitingChoice
        } else {
            RuntimeState::PresentingNode
        };
        self.policy = Some(policy);
        self.transcript.push(TranscriptEntry::Presented {
            node: node.id.clone(),
            activation: self.activation,
        });
        info!(
            "presenting '{}' (activation {}, {:?})",
            node.id, self.activation, self.state
        );

        if let Some(view) = self.current_view() {
            sink.notify(DialogueEvent::NodeEntered(view));
        }
        self.announce_completion(sink);
    }

    /// Apply the exit batch, notify, then move on to `target` or finish.
    fn exit(
        &mut self,
        node: &DialogueNode,
        batch: &[VariableAction],
        target: Option<&str>,
        store: &mut dyn VariableStore,
        sink: &mut dyn EventSink,
    ) {
        self.state = RuntimeState::ExitingNode;
        let warnings = store.apply_batch(batch);
        report(&node.id, warnings, sink);

        let stop_voice = self.policy.as_ref().is_some_and(|p| p.stop_voice_on_exit);
        info!("leaving '{}'", node.id);
        sink.notify(DialogueEvent::NodeExited {
            node: node.id.clone(),
            stop_voice,
        });
        self.policy = None;
        self.choices.clear();

        match target {
            Some(next) => self.enter(next, &*store, sink),
            None => self.finish(EndReason::Completed { last: node.id.clone() }, sink),
        }
    }

    fn announce_completion(&mut self, sink: &mut dyn EventSink) {
        if self.completion_announced || !self.is_complete() {
            return;
        }
        self.completion_announced = true;
        if let Some(id) = &self.current {
            sink.notify(DialogueEvent::CompletionReached { node: id.clone() });
        }
    }

    fn halt(&mut self, err: GraphError, sink: &mut dyn EventSink) {
        error!("session {} halted: {err}", self.session);
        let GraphError::NodeNotFound { id } = &err;
        let missing = id.clone();
        sink.notify(DialogueEvent::ContentError(err));
        self.finish(EndReason::Halted { missing }, sink);
    }

    fn finish(&mut self, reason: EndReason, sink: &mut dyn EventSink) {
        info!("session {} ended: {reason:?}", self.session);
        self.state = RuntimeState::Terminated;
        self.policy = None;
        self.choices.clear();
        self.end = Some(reason.clone());
        sink.notify(DialogueEvent::Ended(reason));
    }
}

fn report(node: &str, warnings: Vec<EvalWarning>, sink: &mut dyn EventSink) {
    for warning in warnings {
        sink.notify(DialogueEvent::Warning {
            node: node.to_string(),
            warning,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use crate::condition::{Comparator, VariableOperation};
    use crate::node::{ConditionalBranch, DialogueChoice};
    use crate::playback::{PlaybackOverrides, VoiceLine, WaitMode};
    use crate::store::MemoryStore;

    fn linear(id: &str, next: Option<&str>) -> DialogueNode {
        let mut node = DialogueNode::new(id, format!("{id} text"));
        node.next = next.map(str::to_string);
        node
    }

    fn choice(text: &str, target: Option<&str>) -> DialogueChoice {
        DialogueChoice {
            text: text.into(),
            conditions: Vec::new(),
            gate: ChoiceGate::Hide,
            target: target.map(str::to_string),
            actions: Vec::new(),
        }
    }

    fn branch(name: &str, ops: Vec<VariableOperation>, target: &str) -> ConditionalBranch {
        ConditionalBranch {
            name: name.into(),
            operations: ops,
            target: target.into(),
        }
    }

    fn runtime(nodes: Vec<DialogueNode>) -> DialogueRuntime {
        let entry = nodes[0].id.clone();
        DialogueRuntime::new(
            Arc::new(DialogueGraph::from_nodes(entry, nodes)),
            PlaybackDefaults::default(),
        )
    }

    fn entered(events: &[DialogueEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                DialogueEvent::NodeEntered(view) => Some(view.id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn linear_walk_to_terminal() {
        let mut rt = runtime(vec![linear("a", Some("b")), linear("b", None)]);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();

        rt.start(None, &store, &mut events).unwrap();
        assert_eq!(rt.state(), RuntimeState::PresentingNode);
        assert_eq!(rt.current_id(), Some("a"));

        rt.advance(&mut store, &mut events).unwrap();
        assert_eq!(rt.current_id(), Some("b"));
        rt.advance(&mut store, &mut events).unwrap();

        assert!(rt.is_finished());
        assert_eq!(rt.end_reason(), Some(&EndReason::Completed { last: "b".into() }));
        assert_eq!(entered(&events), vec!["a", "b"]);
        assert!(events.last().unwrap().is_ended());
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut rt = runtime(vec![linear("a", None)]);
        let store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();
        assert!(matches!(
            rt.start(None, &store, &mut events),
            Err(RuntimeError::InvalidState { operation: "start", .. })
        ));
    }

    #[test]
    fn missing_entry_prevents_start() {
        let mut rt = runtime(vec![linear("a", None)]);
        let mut events = Vec::new();
        let err = rt.start(Some("nope"), &MemoryStore::new(), &mut events).unwrap_err();
        assert_eq!(err, RuntimeError::EntryNotFound { id: "nope".into() });
        assert_eq!(rt.state(), RuntimeState::Idle);
        assert!(events.is_empty());
    }

    #[test]
    fn dangling_next_halts_gracefully() {
        let mut rt = runtime(vec![linear("a", Some("ghost"))]);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();
        rt.advance(&mut store, &mut events).unwrap();

        assert!(rt.is_finished());
        assert_eq!(rt.end_reason(), Some(&EndReason::Halted { missing: "ghost".into() }));
        assert!(events.iter().any(DialogueEvent::is_content_error));
    }

    #[test]
    fn choices_route_to_their_targets_and_fire_actions_before_exit_actions() {
        let mut a = linear("a", None);
        let mut pick = choice("left", Some("left"));
        pick.actions.push(VariableAction::Append {
            variable: "trail".into(),
            text: "choice;".into(),
        });
        a.choices = vec![choice("right", Some("right")), pick];
        a.exit_actions.push(VariableAction::Append {
            variable: "trail".into(),
            text: "exit;".into(),
        });
        let mut rt = runtime(vec![a, linear("left", None), linear("right", None)]);
        let mut store: MemoryStore = [("trail", "")].into_iter().collect();
        let mut events = Vec::new();

        rt.start(None, &store, &mut events).unwrap();
        assert_eq!(rt.state(), RuntimeState::AwaitingChoice);
        rt.select_choice(1, &mut store, &mut events).unwrap();

        assert_eq!(rt.current_id(), Some("left"));
        assert_eq!(store.get("trail"), Some(Value::Text("choice;exit;".into())));
        assert!(matches!(
            rt.transcript().last(),
            Some(TranscriptEntry::Presented { node, .. }) if node == "left"
        ));
    }

    #[test]
    fn choice_without_target_ends_the_conversation() {
        let mut a = linear("a", None);
        a.choices = vec![choice("bye", None)];
        let mut rt = runtime(vec![a]);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();
        rt.select_choice(0, &mut store, &mut events).unwrap();
        assert_eq!(rt.end_reason(), Some(&EndReason::Completed { last: "a".into() }));
    }

    #[test]
    fn out_of_range_choice_changes_nothing() {
        let mut a = linear("a", None);
        a.choices = vec![choice("only", Some("b"))];
        a.exit_actions.push(VariableAction::Toggle { variable: "flag".into() });
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut store: MemoryStore = [("flag", false)].into_iter().collect();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        let before = (rt.snapshot(), store.clone(), events.len());
        let err = rt.select_choice(3, &mut store, &mut events).unwrap_err();
        assert_eq!(err, RuntimeError::ChoiceIndexOutOfRange { index: 3, len: 1 });
        assert_eq!((rt.snapshot(), store.clone(), events.len()), before);

        rt.select_choice(0, &mut store, &mut events).unwrap();
        assert_eq!(rt.current_id(), Some("b"));
    }

    #[test]
    fn gated_choices_hide_or_disable() {
        let mut a = linear("a", None);
        let locked = VariableOperation::new("key", Comparator::Equal, true);
        let mut hidden = choice("secret", Some("b"));
        hidden.conditions = vec![locked.clone()];
        let mut disabled = choice("door", Some("b"));
        disabled.conditions = vec![locked];
        disabled.gate = ChoiceGate::Disable;
        a.choices = vec![hidden, disabled, choice("leave", None)];
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut store: MemoryStore = [("key", false)].into_iter().collect();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        let DialogueEvent::NodeEntered(view) = &events[1] else {
            panic!("expected NodeEntered, got {:?}", events[1]);
        };
        let shown: Vec<(usize, bool)> = view.choices.iter().map(|c| (c.index, c.enabled)).collect();
        assert_eq!(shown, vec![(1, false), (2, true)]);

        assert_eq!(
            rt.select_choice(0, &mut store, &mut events),
            Err(RuntimeError::ChoiceUnavailable { index: 0 })
        );
        assert_eq!(
            rt.select_choice(1, &mut store, &mut events),
            Err(RuntimeError::ChoiceUnavailable { index: 1 })
        );
        rt.select_choice(2, &mut store, &mut events).unwrap();
        assert!(rt.is_finished());
    }

    #[test]
    fn node_with_no_available_choice_behaves_linearly() {
        let mut a = linear("a", Some("b"));
        let mut gated = choice("secret", Some("b"));
        gated.conditions = vec![VariableOperation::new("key", Comparator::Equal, true)];
        a.choices = vec![gated];
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut store: MemoryStore = [("key", false)].into_iter().collect();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();
        assert_eq!(rt.state(), RuntimeState::PresentingNode);
        rt.advance(&mut store, &mut events).unwrap();
        assert_eq!(rt.current_id(), Some("b"));
    }

    #[test]
    fn first_satisfied_branch_wins() {
        let mut a = linear("a", None);
        a.branches = vec![
            branch("never", vec![VariableOperation::new("n", Comparator::Greater, 10)], "x"),
            branch("first", vec![VariableOperation::new("n", Comparator::Greater, 0)], "b"),
            branch("second", vec![VariableOperation::new("n", Comparator::Greater, 1)], "c"),
        ];
        let mut rt = runtime(vec![a, linear("b", None), linear("c", None), linear("x", None)]);
        let store: MemoryStore = [("n", 5)].into_iter().collect();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        assert_eq!(rt.current_id(), Some("b"));
        assert_eq!(entered(&events), vec!["b"]);
        assert!(events.iter().any(|e| matches!(
            e,
            DialogueEvent::BranchTaken { from, to, branch } if from == "a" && to == "b" && branch == "first"
        )));
    }

    #[test]
    fn branches_chain_across_nodes() {
        let always = || vec![VariableOperation::new("on", Comparator::Equal, true)];
        let mut a = linear("a", None);
        a.branches = vec![branch("ab", always(), "b")];
        let mut b = linear("b", None);
        b.branches = vec![branch("bc", always(), "c")];
        let mut rt = runtime(vec![a, b, linear("c", None)]);
        let store: MemoryStore = [("on", true)].into_iter().collect();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();
        assert_eq!(entered(&events), vec!["c"]);
    }

    #[test]
    fn branch_cycle_is_broken_with_a_warning() {
        let always = || vec![VariableOperation::new("on", Comparator::Equal, true)];
        let mut a = linear("a", None);
        a.branches = vec![branch("to b", always(), "b")];
        let mut b = linear("b", None);
        b.branches = vec![branch("to a", always(), "a")];
        let mut rt = runtime(vec![a, b]);
        let store: MemoryStore = [("on", true)].into_iter().collect();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        assert_eq!(entered(&events), vec!["b"]);
        assert!(events.iter().any(|e| matches!(
            e,
            DialogueEvent::Warning { warning: EvalWarning::BranchCycle { from, to }, .. } if from == "b" && to == "a"
        )));
    }

    #[test]
    fn self_targeting_branch_is_a_cycle() {
        let mut a = linear("a", None);
        a.branches = vec![branch("loop", Vec::new(), "a")];
        let mut rt = runtime(vec![a]);
        let mut events = Vec::new();
        rt.start(None, &MemoryStore::new(), &mut events).unwrap();
        assert_eq!(rt.state(), RuntimeState::PresentingNode);
        assert_eq!(rt.current_id(), Some("a"));
    }

    #[test]
    fn missing_variable_in_branch_is_a_warning_not_a_failure() {
        let mut a = linear("a", None);
        a.branches = vec![branch("ghost", vec![VariableOperation::new("ghost", Comparator::Equal, true)], "b")];
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut events = Vec::new();
        rt.start(None, &MemoryStore::new(), &mut events).unwrap();
        assert_eq!(rt.current_id(), Some("a"));
        assert!(events.iter().any(DialogueEvent::is_warning));
    }

    #[test]
    fn exit_actions_run_once_per_activation() {
        let mut hub = linear("hub", None);
        hub.exit_actions.push(VariableAction::Increment {
            variable: "visits".into(),
            by: 1.0,
        });
        hub.choices = vec![choice("again", Some("hub")), choice("done", None)];
        let mut rt = runtime(vec![hub]);
        let mut store: MemoryStore = [("visits", 0)].into_iter().collect();
        let mut events = Vec::new();

        rt.start(None, &store, &mut events).unwrap();
        assert_eq!(store.get_number("visits"), Ok(0.0));
        rt.select_choice(0, &mut store, &mut events).unwrap();
        assert_eq!(store.get_number("visits"), Ok(1.0));
        rt.select_choice(0, &mut store, &mut events).unwrap();
        assert_eq!(store.get_number("visits"), Ok(2.0));
        rt.select_choice(1, &mut store, &mut events).unwrap();
        assert_eq!(store.get_number("visits"), Ok(3.0));
        assert_eq!(entered(&events).len(), 3);
    }

    #[test]
    fn stop_abandons_exit_actions() {
        let mut a = linear("a", Some("b"));
        a.exit_actions.push(VariableAction::Toggle { variable: "flag".into() });
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut store: MemoryStore = [("flag", false)].into_iter().collect();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        rt.stop(&mut events);
        assert!(rt.is_finished());
        assert_eq!(rt.end_reason(), Some(&EndReason::Stopped));
        assert_eq!(store.get_bool("flag"), Ok(false));

        assert!(rt.advance(&mut store, &mut events).is_err());
        let count = events.len();
        rt.stop(&mut events);
        assert_eq!(events.len(), count);
    }

    #[test]
    fn auto_advance_waits_for_completion_and_delay() {
        let mut a = linear("a", Some("b"));
        a.playback = PlaybackOverrides {
            wait_mode: Some(WaitMode::TextOnly),
            auto_advance: Some(true),
            auto_advance_delay: Some(Duration::from_millis(500)),
            ..PlaybackOverrides::default()
        };
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        assert!(!rt.tick(Duration::from_secs(5), &mut store, &mut events));
        rt.on_text_complete(&mut events).unwrap();
        assert!(events.iter().any(DialogueEvent::is_completion_reached));
        assert!(!rt.tick(Duration::from_millis(300), &mut store, &mut events));
        assert!(rt.tick(Duration::from_millis(300), &mut store, &mut events));
        assert_eq!(rt.current_id(), Some("b"));
    }

    #[test]
    fn inherited_either_lets_text_alone_unblock_auto_advance() {
        let mut a = linear("a", Some("b"));
        a.playback.auto_advance = Some(true);
        a.playback.voice = Some(VoiceLine {
            clip: "vo/a.ogg".into(),
            volume: 1.0,
            duration: None,
        });
        let graph = Arc::new(DialogueGraph::from_nodes("a", vec![a, linear("b", None)]));
        let defaults = PlaybackDefaults {
            wait_mode: WaitMode::Either,
            auto_advance_delay: 0.0,
            ..PlaybackDefaults::default()
        };
        let mut rt = DialogueRuntime::new(graph, defaults);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        assert_eq!(rt.policy().unwrap().wait_mode, WaitMode::Either);
        rt.on_text_complete(&mut events).unwrap();
        assert!(rt.is_complete());
        assert!(rt.tick(Duration::ZERO, &mut store, &mut events));
        assert_eq!(rt.current_id(), Some("b"));
    }

    #[test]
    fn flag_set_on_exit_reroutes_the_next_visit() {
        let mut hub = linear("hub", None);
        hub.branches = vec![branch(
            "flag set",
            vec![VariableOperation::new("flag", Comparator::Equal, true)],
            "after",
        )];
        hub.exit_actions.push(VariableAction::Set {
            variable: "flag".into(),
            value: Value::Bool(true),
        });
        hub.choices = vec![choice("loop", Some("hub"))];
        let mut rt = runtime(vec![hub, linear("after", None)]);
        let mut store: MemoryStore = [("flag", false)].into_iter().collect();
        let mut events = Vec::new();

        rt.start(None, &store, &mut events).unwrap();
        assert_eq!(rt.current_id(), Some("hub"));
        rt.select_choice(0, &mut store, &mut events).unwrap();
        assert_eq!(store.get_bool("flag"), Ok(true));
        assert_eq!(rt.current_id(), Some("after"));
        assert_eq!(entered(&events), vec!["hub", "after"]);
    }

    #[test]
    fn unskippable_audio_blocks_advance() {
        let mut a = linear("a", Some("b"));
        a.playback = PlaybackOverrides {
            voice: Some(VoiceLine {
                clip: "vo/a.ogg".into(),
                volume: 1.0,
                duration: None,
            }),
            wait_mode: Some(WaitMode::Both),
            allow_skip_audio: Some(false),
            ..PlaybackOverrides::default()
        };
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        rt.on_text_complete(&mut events).unwrap();
        assert_eq!(
            rt.advance(&mut store, &mut events),
            Err(RuntimeError::AdvanceBlocked { node: "a".into() })
        );
        assert_eq!(rt.current_id(), Some("a"));
        rt.on_audio_complete(&mut events).unwrap();
        rt.advance(&mut store, &mut events).unwrap();
        assert_eq!(rt.current_id(), Some("b"));
    }

    #[test]
    fn unskippable_audio_blocks_advance_after_text_completes_under_either() {
        let mut a = linear("a", Some("b"));
        a.playback.voice = Some(VoiceLine {
            clip: "vo/a.ogg".into(),
            volume: 1.0,
            duration: None,
        });
        a.playback.allow_skip_audio = Some(false);
        let mut rt = runtime(vec![a, linear("b", None)]);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        rt.on_text_complete(&mut events).unwrap();
        assert!(rt.is_complete());
        assert_eq!(
            rt.advance(&mut store, &mut events),
            Err(RuntimeError::AdvanceBlocked { node: "a".into() })
        );
        assert_eq!(rt.current_id(), Some("a"));
        assert!(!events.iter().any(DialogueEvent::is_node_exited));

        rt.on_audio_complete(&mut events).unwrap();
        rt.advance(&mut store, &mut events).unwrap();
        assert_eq!(rt.current_id(), Some("b"));
        assert!(!events.iter().any(DialogueEvent::is_playback_interrupted));
    }

    #[test]
    fn choosing_respects_the_audio_skip_rule() {
        let voiced = |allow| {
            let mut hub = linear("hub", None);
            hub.choices = vec![choice("go", Some("end"))];
            hub.playback.voice = Some(VoiceLine {
                clip: "vo/hub.ogg".into(),
                volume: 1.0,
                duration: None,
            });
            hub.playback.allow_skip_audio = Some(allow);
            runtime(vec![hub, linear("end", None)])
        };
        let mut store = MemoryStore::new();

        let mut events = Vec::new();
        let mut rt = voiced(false);
        rt.start(None, &store, &mut events).unwrap();
        rt.on_text_complete(&mut events).unwrap();
        assert_eq!(
            rt.select_choice(0, &mut store, &mut events),
            Err(RuntimeError::AdvanceBlocked { node: "hub".into() })
        );
        assert_eq!(rt.state(), RuntimeState::AwaitingChoice);
        assert!(rt.transcript().iter().all(|e| matches!(e, TranscriptEntry::Presented { .. })));

        let mut events = Vec::new();
        let mut rt = voiced(true);
        rt.start(None, &store, &mut events).unwrap();
        rt.on_text_complete(&mut events).unwrap();
        rt.select_choice(0, &mut store, &mut events).unwrap();
        assert!(events.iter().any(DialogueEvent::is_playback_interrupted));
        assert_eq!(rt.current_id(), Some("end"));
    }

    #[test]
    fn skippable_audio_is_interrupted_by_advance() {
        let mut a = linear("a", None);
        a.playback.voice = Some(VoiceLine {
            clip: "vo/a.ogg".into(),
            volume: 0.8,
            duration: None,
        });
        let mut rt = runtime(vec![a]);
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();
        rt.advance(&mut store, &mut events).unwrap();
        assert!(events.iter().any(DialogueEvent::is_playback_interrupted));
        assert!(events.iter().any(|e| matches!(e, DialogueEvent::NodeExited { stop_voice: true, .. })));
    }

    #[test]
    fn snapshot_restores_mid_conversation() {
        let mut a = linear("a", None);
        a.choices = vec![choice("go", Some("b"))];
        let graph = Arc::new(DialogueGraph::from_nodes("a", [a, linear("b", None)]));
        let mut rt = DialogueRuntime::new(Arc::clone(&graph), PlaybackDefaults::default());
        let mut store = MemoryStore::new();
        let mut events = Vec::new();
        rt.start(None, &store, &mut events).unwrap();

        let snap = rt.snapshot();
        let text = ron::ser::to_string(&snap).unwrap();
        let back: SessionSnapshot = ron::from_str(&text).unwrap();
        let mut restored = DialogueRuntime::restore(graph, PlaybackDefaults::default(), back).unwrap();

        assert_eq!(restored.session_id(), rt.session_id());
        assert_eq!(restored.state(), RuntimeState::AwaitingChoice);
        assert_eq!(restored.current_view(), rt.current_view());
        assert_eq!(restored.current_view().unwrap().choices.len(), 1);
        restored.select_choice(0, &mut store, &mut events).unwrap();
        assert_eq!(restored.current_id(), Some("b"));
    }

    #[test]
    fn restore_rejects_unknown_node() {
        let graph = Arc::new(DialogueGraph::from_nodes("a", [linear("a", None)]));
        let mut snap = DialogueRuntime::new(Arc::clone(&graph), PlaybackDefaults::default()).snapshot();
        snap.current = Some("gone".into());
        snap.state = RuntimeState::PresentingNode;
        assert_eq!(
            DialogueRuntime::restore(graph, PlaybackDefaults::default(), snap).unwrap_err(),
            RuntimeError::UnknownSnapshotNode { id: "gone".into() }
        );
    }
}
