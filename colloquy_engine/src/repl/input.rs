//! Line input for the console.
//!
//! Interactive terminals get a rustyline editor with command and save-slot
//! completion plus persistent history. Piped input is read straight from stdin.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use crate::session::list_sessions;

/// What the player typed, or why there is nothing to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Eof,
    Interrupted,
}

const COMMANDS: &[&str] = &["help", "vars", "history", "save", "load", "restart", "quit"];

/// Tab completion for command words and `load <slot>`.
struct ConsoleHelper;

impl ConsoleHelper {
    fn candidates(word: &str) -> Vec<Pair> {
        if let Some(slot) = word.strip_prefix("load ") {
            return list_sessions()
                .into_iter()
                .filter(|name| name.starts_with(slot.trim_start()))
                .map(|name| Pair {
                    display: name.clone(),
                    replacement: format!("load {name}"),
                })
                .collect();
        }
        if word.is_empty() || word.contains(char::is_whitespace) {
            return Vec::new();
        }
        let word = word.to_lowercase();
        COMMANDS
            .iter()
            .copied()
            .filter(|cmd| cmd.starts_with(word.as_str()))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect()
    }
}

impl Completer for ConsoleHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(line, pos);
        Ok((start, Self::candidates(&line[start..pos])))
    }
}

impl Hinter for ConsoleHelper {
    type Hint = String;
}
impl Highlighter for ConsoleHelper {}
impl Validator for ConsoleHelper {}
impl Helper for ConsoleHelper {}

/// Byte offset where the typed input starts, ignoring leading blanks.
fn word_start(line: &str, pos: usize) -> usize {
    let typed = &line[..pos];
    pos - typed.trim_start().len()
}

/// Where the editor keeps its history between runs.
struct History {
    path: PathBuf,
}

impl History {
    fn locate() -> Option<Self> {
        let base = dirs::data_dir().or_else(dirs::data_local_dir)?;
        Some(Self {
            path: history_path_in(&base),
        })
    }

    fn load_into(&self, editor: &mut Editor<ConsoleHelper, DefaultHistory>) {
        if let Some(dir) = self.path.parent()
            && let Err(err) = fs::create_dir_all(dir)
        {
            warn!("cannot create history directory '{}': {err}", dir.display());
            return;
        }
        match editor.load_history(&self.path) {
            Ok(()) => debug!("history loaded from '{}'", self.path.display()),
            Err(ReadlineError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no history at '{}' yet", self.path.display());
            },
            Err(err) => warn!("history at '{}' not loaded: {err}", self.path.display()),
        }
    }

    fn record(&self, editor: &mut Editor<ConsoleHelper, DefaultHistory>, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        if let Err(err) = editor.add_history_entry(line) {
            warn!("history entry dropped: {err}");
            return;
        }
        if let Err(err) = editor.save_history(&self.path) {
            warn!("history not saved to '{}': {err}", self.path.display());
        }
    }
}

fn history_path_in(base: &Path) -> PathBuf {
    base.join("colloquy").join("history.txt")
}

/// The console's input source.
pub struct ConsoleInput {
    source: Source,
}

enum Source {
    Editor {
        editor: Box<Editor<ConsoleHelper, DefaultHistory>>,
        history: Option<History>,
    },
    Stdin,
}

impl ConsoleInput {
    /// Use a line editor when stdin is a terminal, plain stdin otherwise.
    pub fn open() -> Self {
        Self { source: Source::open() }
    }

    /// Read one line. A failing editor is replaced by plain stdin for the rest
    /// of the session and the read is retried there.
    ///
    /// # Errors
    /// IO errors from stdin.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<InputEvent> {
        let result = match &mut self.source {
            Source::Editor { editor, history } => match editor.readline(prompt) {
                Ok(line) => {
                    if let Some(history) = history {
                        history.record(editor, &line);
                    }
                    Ok(InputEvent::Line(line))
                },
                Err(err) => event_from(err),
            },
            Source::Stdin => return read_stdin(prompt),
        };
        result.or_else(|err| {
            warn!("line editor failed ({err}), switching to plain stdin");
            self.source = Source::Stdin;
            read_stdin(prompt)
        })
    }
}

impl Source {
    fn open() -> Self {
        if !io::stdin().is_terminal() {
            info!("stdin is not a terminal, reading plain lines");
            return Source::Stdin;
        }
        match Editor::<ConsoleHelper, DefaultHistory>::new() {
            Ok(mut editor) => {
                editor.set_helper(Some(ConsoleHelper));
                let history = History::locate();
                if let Some(history) = &history {
                    history.load_into(&mut editor);
                }
                info!("line editor ready");
                Source::Editor {
                    editor: Box::new(editor),
                    history,
                }
            },
            Err(err) => {
                warn!("line editor unavailable ({err}), reading plain lines");
                Source::Stdin
            },
        }
    }
}

fn read_stdin(prompt: &str) -> io::Result<InputEvent> {
    let mut out = io::stdout();
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(InputEvent::Eof);
    }
    Ok(InputEvent::Line(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn event_from(err: ReadlineError) -> io::Result<InputEvent> {
    match err {
        ReadlineError::Interrupted => Ok(InputEvent::Interrupted),
        ReadlineError::Eof => Ok(InputEvent::Eof),
        ReadlineError::Io(err) => Err(err),
        other => Err(io::Error::other(other)),
    }
}
