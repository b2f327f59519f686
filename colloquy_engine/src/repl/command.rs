//! Console command parsing.

/// A parsed line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Empty line: continue past a linear node.
    Advance,
    /// A 1-based choice number as shown on screen.
    Choose(usize),
    Vars,
    History,
    Save(String),
    Load(String),
    Restart,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    if input.is_empty() {
        return Command::Advance;
    }
    if let Ok(number) = input.parse::<usize>() {
        return Command::Choose(number);
    }

    let (verb, rest) = match input.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (input, ""),
    };
    match (verb.to_lowercase().as_str(), rest) {
        ("vars" | "variables", "") => Command::Vars,
        ("history" | "transcript", "") => Command::History,
        ("save", slot) => Command::Save(slot_or_default(slot)),
        ("load", slot) => Command::Load(slot_or_default(slot)),
        ("restart", "") => Command::Restart,
        ("help" | "?", "") => Command::Help,
        ("quit" | "exit" | "q", "") => Command::Quit,
        _ => Command::Unknown(input.to_string()),
    }
}

fn slot_or_default(slot: &str) -> String {
    if slot.is_empty() { "quicksave".to_string() } else { slot.to_string() }
}
