#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! ** Colloquy **
//! Branching dialogue player for the terminal.
//!
//! Usage: `colloquy <dialogue.toml|.ron|.json> [config.toml]`

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use log::info;

use colloquy_engine::loader::config::CONFIG_FILE;
use colloquy_engine::{COLLOQUY_VERSION, load_config, load_dialogue, run_repl};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args_os().skip(1);
    let Some(dialogue_path) = args.next().map(PathBuf::from) else {
        bail!("usage: colloquy <dialogue file> [config file]");
    };
    let config_path = args.next().map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);

    info!("Start: loading dialogue from '{}'", dialogue_path.display());
    let graph = load_dialogue(&dialogue_path).context("while loading dialogue")?;
    let config = load_config(&config_path);

    // clear the screen
    print!("\x1B[2J\x1B[H");
    std::io::stdout().flush().context("flushing stdout")?;
    println!("{}", format!("colloquy v{COLLOQUY_VERSION}").dimmed());

    run_repl(Arc::new(graph), &config)
}
