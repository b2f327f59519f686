//! View module.
//!
//! Rather than printing from the runtime callbacks, the console collects what
//! should be shown into a [`View`] and displays it on `flush`. The view is also
//! the console's [`EventSink`], so dialogue events land here directly.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use log::debug;
use textwrap::{fill, termwidth};
use variantly::Variantly;

use crate::loader::ConsoleConfig;
use crate::node::Actor;
use crate::runtime::{DialogueEvent, EndReason, EventSink, NodeView};
use crate::style::DialogueStyle;

/// Something the console wants to show on the next flush.
#[derive(Debug, Clone, PartialEq, Variantly)]
pub enum ViewItem {
    Title(String),
    Node(NodeView),
    Interrupted,
    Warning(String),
    Error(String),
    EngineMessage(String),
    Variables(Vec<(String, String)>),
    Transcript(Vec<String>),
    Help,
    Ended(EndReason),
}

/// Buffered console output.
#[derive(Debug, Clone)]
pub struct View {
    pub width: usize,
    pub reveal_rate: f32,
    pub show_warnings: bool,
    pub items: Vec<ViewItem>,
    fixed_width: bool,
}

impl View {
    pub fn new(config: &ConsoleConfig) -> Self {
        let fixed_width = config.wrap_width > 0;
        Self {
            width: if fixed_width { config.wrap_width } else { termwidth() },
            reveal_rate: config.reveal_rate,
            show_warnings: config.show_warnings,
            items: Vec::new(),
            fixed_width,
        }
    }

    pub fn push(&mut self, item: ViewItem) {
        self.items.push(item);
    }

    /// Display everything queued since the last flush, in order.
    pub fn flush(&mut self) {
        if !self.fixed_width {
            self.width = termwidth();
        }
        for item in std::mem::take(&mut self.items) {
            match item {
                ViewItem::Title(title) => {
                    println!("\n{:^width$}\n", title.as_str().title_style(), width = self.width);
                },
                ViewItem::Node(view) => self.node(&view),
                ViewItem::Interrupted => println!("{}", "(voice cut off)".voice_style()),
                ViewItem::Warning(msg) => {
                    println!("{} {}", "⚠︎".warning_style(), msg.as_str().warning_style());
                },
                ViewItem::Error(msg) => println!("{} {}", "✖".error_style(), msg.as_str().error_style()),
                ViewItem::EngineMessage(msg) => {
                    println!("{}", fill(&msg, self.width).as_str().engine_style());
                },
                ViewItem::Variables(vars) => self.variables(&vars),
                ViewItem::Transcript(lines) => self.transcript(&lines),
                ViewItem::Help => self.help(),
                ViewItem::Ended(reason) => self.ended(&reason),
            }
        }
    }

    fn node(&self, view: &NodeView) {
        println!();
        if let Some(speaker) = &view.speaker {
            let mut header = actor_label(speaker).as_str().speaker_style().to_string();
            if view.listener_is_speaker {
                header.push_str(&format!(" {}", "(to themself)".expression_style()));
            } else if let Some(listener) = &view.listener {
                header.push_str(&format!(" → {}", actor_label(listener).as_str().listener_style()));
            }
            println!("{header}");
        }
        if let Some(voice) = &view.policy.voice {
            println!("{}", format!("♪ {}", voice.clip).as_str().voice_style());
        }

        let text = fill(&view.text, self.width.saturating_sub(2).max(20));
        let rate = view.policy.reveal_rate(&view.text, self.reveal_rate);
        reveal(&text, rate);

        if !view.choices.is_empty() {
            println!();
        }
        for (ordinal, choice) in view.choices.iter().enumerate() {
            let label = format!("{:>3}. {}", ordinal + 1, choice.text);
            if choice.enabled {
                println!("{}", label.as_str().choice_style());
            } else {
                println!("{}", label.as_str().choice_disabled_style());
            }
        }
    }

    fn variables(&self, vars: &[(String, String)]) {
        println!("{:.>width$}", "variables".section_style(), width = self.width);
        if vars.is_empty() {
            println!("(none)");
        }
        for (name, value) in vars {
            println!("  {name} = {value}");
        }
    }

    fn transcript(&self, lines: &[String]) {
        println!("{:.>width$}", "history".section_style(), width = self.width);
        for line in lines {
            println!("  {line}");
        }
    }

    fn help(&self) {
        println!("{:.>width$}", "commands".section_style(), width = self.width);
        for (cmd, what) in [
            ("<enter>", "continue"),
            ("<number>", "pick a choice"),
            ("vars", "show variables"),
            ("history", "show the conversation so far"),
            ("save <name>", "save this session"),
            ("load <name>", "resume a saved session"),
            ("restart", "start the conversation over"),
            ("quit", "leave"),
        ] {
            println!("  {:<14}{}", cmd.bold(), what);
        }
    }

    fn ended(&self, reason: &EndReason) {
        let msg = match reason {
            EndReason::Completed { .. } => "The conversation is over.".to_string(),
            EndReason::Stopped => "Conversation abandoned.".to_string(),
            EndReason::Halted { missing } => format!("The conversation broke off (missing node '{missing}')."),
        };
        println!("\n{:.>width$}", "end".section_style(), width = self.width);
        println!("{}", msg.as_str().engine_style());
    }
}

impl EventSink for View {
    fn notify(&mut self, event: DialogueEvent) {
        match event {
            DialogueEvent::NodeEntered(view) => self.push(ViewItem::Node(view)),
            DialogueEvent::PlaybackInterrupted { .. } => self.push(ViewItem::Interrupted),
            DialogueEvent::Warning { node, warning } if self.show_warnings => {
                self.push(ViewItem::Warning(format!("{node}: {warning}")));
            },
            DialogueEvent::ContentError(err) => self.push(ViewItem::Error(err.to_string())),
            DialogueEvent::Ended(reason) => self.push(ViewItem::Ended(reason)),
            other => debug!("console ignoring {other:?}"),
        }
    }
}

fn actor_label(actor: &Actor) -> String {
    match &actor.expression {
        Some(expression) => format!("{} ({expression})", actor.name),
        None => actor.name.clone(),
    }
}

/// Print `text` a character at a time at `rate` chars per second.
fn reveal(text: &str, rate: f32) {
    let styled = |s: &str| s.line_style().to_string();
    if rate <= 0.0 || !rate.is_finite() {
        println!("{}", styled(text));
        return;
    }
    let pause = Duration::from_secs_f32(1.0 / rate.max(1.0));
    let mut out = io::stdout().lock();
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let _ = write!(out, "{}", styled(ch.encode_utf8(&mut buf)));
        let _ = out.flush();
        if !ch.is_whitespace() {
            thread::sleep(pause);
        }
    }
    let _ = writeln!(out);
}
