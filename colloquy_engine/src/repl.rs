//! Console front end.
//!
//! Plays a dialogue graph in the terminal: text is revealed typewriter style,
//! voice lines are announced rather than played, and the player answers with
//! choice numbers or presses enter to continue.

mod command;
mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use log::{info, warn};

use crate::graph::DialogueGraph;
use crate::loader::ColloquyConfig;
use crate::runtime::{ChoiceStatus, DialogueRuntime, RuntimeState, TranscriptEntry};
use crate::session::{SESSION_DIR, SavedSession, load_session, save_session, slot_path};
use crate::store::MemoryStore;
use crate::style::DialogueStyle;
use crate::view::{View, ViewItem};

pub use command::{Command, parse_command};
use input::{ConsoleInput, InputEvent};

/// One console conversation and everything it needs.
struct Console {
    graph: Arc<DialogueGraph>,
    config: ColloquyConfig,
    runtime: DialogueRuntime,
    store: MemoryStore,
    view: View,
    session_dir: PathBuf,
}

/// Run the console loop until the player quits or input ends.
///
/// # Errors
/// Fails only if the conversation cannot start (missing entry node).
pub fn run_repl(graph: Arc<DialogueGraph>, config: &ColloquyConfig) -> Result<()> {
    let mut console = Console::new(graph, config.clone());
    let title = if console.graph.title().is_empty() {
        "COLLOQUY".to_string()
    } else {
        console.graph.title().to_uppercase()
    };
    console.view.push(ViewItem::Title(title));
    console.begin()?;

    let mut input = ConsoleInput::open();
    loop {
        let prompt = prompt_for(console.runtime.state()).prompt_style().to_string();
        let line = match input.read_line(&prompt) {
            Ok(InputEvent::Line(line)) => line,
            Ok(InputEvent::Eof) => {
                console.runtime.stop(&mut console.view);
                console.view.flush();
                break;
            },
            Ok(InputEvent::Interrupted) => {
                console
                    .view
                    .push(ViewItem::EngineMessage("Input canceled. Type 'quit' to leave.".into()));
                console.view.flush();
                continue;
            },
            Err(err) => {
                console.view.push(ViewItem::Error(format!("Failed to read input: {err}")));
                console.view.flush();
                break;
            },
        };

        if console.handle(parse_command(&line))? {
            break;
        }
        console.settle();
    }
    info!("console closed");
    Ok(())
}

fn prompt_for(state: RuntimeState) -> &'static str {
    match state {
        RuntimeState::AwaitingChoice => "\nchoose> ",
        RuntimeState::Terminated => "\n(ended)> ",
        _ => "\n[enter]> ",
    }
}

impl Console {
    fn new(graph: Arc<DialogueGraph>, config: ColloquyConfig) -> Self {
        let mut store = MemoryStore::new();
        store.declare(graph.variables());
        Self {
            runtime: DialogueRuntime::new(Arc::clone(&graph), config.playback.clone()),
            view: View::new(&config.console),
            graph,
            config,
            store,
            session_dir: PathBuf::from(SESSION_DIR),
        }
    }

    fn begin(&mut self) -> Result<()> {
        self.runtime.start(None, &self.store, &mut self.view)?;
        self.settle();
        Ok(())
    }

    /// Returns `true` when the console should close.
    fn handle(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Advance => self.advance(),
            Command::Choose(number) => self.choose(number),
            Command::Vars => {
                let vars = self
                    .store
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect();
                self.view.push(ViewItem::Variables(vars));
            },
            Command::History => {
                let lines = self.transcript_lines();
                self.view.push(ViewItem::Transcript(lines));
            },
            Command::Save(slot) => self.save(&slot),
            Command::Load(slot) => self.load(&slot),
            Command::Restart => {
                info!("restarting conversation");
                let graph = Arc::clone(&self.graph);
                let config = self.config.clone();
                let session_dir = self.session_dir.clone();
                *self = Console::new(graph, config);
                self.session_dir = session_dir;
                self.begin()?;
            },
            Command::Help => self.view.push(ViewItem::Help),
            Command::Quit => {
                self.runtime.stop(&mut self.view);
                self.view.flush();
                return Ok(true);
            },
            Command::Unknown(text) => {
                self.view
                    .push(ViewItem::Error(format!("Unknown command '{text}'. Type 'help' for commands.")));
            },
        }
        Ok(false)
    }

    fn advance(&mut self) {
        match self.runtime.state() {
            RuntimeState::PresentingNode => {
                if let Err(err) = self.runtime.advance(&mut self.store, &mut self.view) {
                    self.view.push(ViewItem::Error(err.to_string()));
                }
            },
            RuntimeState::AwaitingChoice => {
                self.view.push(ViewItem::EngineMessage("Pick a choice by number.".into()));
            },
            _ => self
                .view
                .push(ViewItem::EngineMessage("The conversation is over. Try 'restart' or 'quit'.".into())),
        }
    }

    /// Choice numbers count the choices on screen, which leaves out hidden ones.
    fn choose(&mut self, number: usize) {
        let index = number.checked_sub(1).and_then(|ordinal| {
            self.runtime
                .choice_statuses()
                .iter()
                .enumerate()
                .filter(|(_, status)| **status != ChoiceStatus::Hidden)
                .nth(ordinal)
                .map(|(index, _)| index)
        });
        let Some(index) = index else {
            self.view.push(ViewItem::Error(format!("There is no choice {number}.")));
            return;
        };
        if let Err(err) = self.runtime.select_choice(index, &mut self.store, &mut self.view) {
            self.view.push(ViewItem::Error(err.to_string()));
        }
    }

    fn save(&mut self, slot: &str) {
        let session = SavedSession::capture(&self.runtime, &self.store);
        match save_session(&self.session_dir, slot, &session) {
            Ok(path) => self
                .view
                .push(ViewItem::EngineMessage(format!("Saved to {}.", path.display()))),
            Err(err) => self.view.push(ViewItem::Error(format!("{err:#}"))),
        }
    }

    fn load(&mut self, slot: &str) {
        let path = slot_path(&self.session_dir, slot);
        match self.try_load(&path) {
            Ok(()) => {
                self.view
                    .push(ViewItem::EngineMessage(format!("Resumed from {}.", path.display())));
                if let Some(view) = self.runtime.current_view() {
                    self.view.push(ViewItem::Node(view));
                }
            },
            Err(err) => self.view.push(ViewItem::Error(format!("{err:#}"))),
        }
    }

    fn try_load(&mut self, path: &Path) -> Result<()> {
        let saved = load_session(path)?;
        if saved.graph_title != self.graph.title() {
            warn!(
                "session was saved from \"{}\" but \"{}\" is loaded",
                saved.graph_title,
                self.graph.title()
            );
        }
        let runtime = DialogueRuntime::restore(Arc::clone(&self.graph), self.config.playback.clone(), saved.snapshot)?;
        self.runtime = runtime;
        self.store = saved.variables;
        self.store.declare(self.graph.variables());
        Ok(())
    }

    fn transcript_lines(&self) -> Vec<String> {
        self.runtime
            .transcript()
            .iter()
            .map(|entry| match entry {
                TranscriptEntry::Presented { node, activation } => {
                    let text = self.graph.resolve(node).map(|n| n.text.as_str()).unwrap_or("");
                    format!("{activation:>3}  {node}: {text}")
                },
                TranscriptEntry::Chose { text, .. } => format!("       > {text}"),
            })
            .collect()
    }

    /// Show what is queued and report completion, then follow auto-advance
    /// until the conversation needs player input.
    fn settle(&mut self) {
        loop {
            self.view.flush();
            if !matches!(
                self.runtime.state(),
                RuntimeState::PresentingNode | RuntimeState::AwaitingChoice
            ) {
                return;
            }
            // the console reveals text synchronously and cannot play audio
            for result in [
                self.runtime.on_text_complete(&mut self.view),
                self.runtime.on_audio_complete(&mut self.view),
            ] {
                if let Err(err) = result {
                    warn!("completion callback rejected: {err}");
                }
            }
            self.view.flush();

            let Some(delay) = self
                .runtime
                .policy()
                .filter(|p| p.auto_advance && self.runtime.state() == RuntimeState::PresentingNode)
                .map(|p| p.auto_advance_delay)
            else {
                return;
            };
            thread::sleep(delay);
            if !self.runtime.tick(delay, &mut self.store, &mut self.view) {
                return;
            }
        }
    }
}
