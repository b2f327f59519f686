//! Engine configuration and loader.
//!
//! `colloquy.toml` holds two optional tables: `[playback]` with the global
//! playback defaults every node inherits, and `[console]` with settings for the
//! terminal front end. Anything missing falls back to built-in defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colloquy_data::MAX_PLAYBACK_SECS;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::playback::PlaybackDefaults;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "colloquy.toml";

/// Settings for the terminal front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Wrap width for dialogue text; 0 uses the terminal width.
    pub wrap_width: usize,
    /// Typewriter reveal speed in characters per second; 0 prints text at once.
    pub reveal_rate: f32,
    /// Print evaluation warnings inline with the dialogue.
    pub show_warnings: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            wrap_width: 0,
            reveal_rate: 60.0,
            show_warnings: false,
        }
    }
}

/// Complete configuration for a colloquy session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColloquyConfig {
    pub playback: PlaybackDefaults,
    pub console: ConsoleConfig,
}

/// Loads configuration from a TOML file, falling back to defaults on error.
///
/// Never fails. Out-of-range numbers are reset to their defaults individually.
///
/// # Logging
/// - `info!` on successful load
/// - `warn!` if the file cannot be read or parsed, or a value is out of range
pub fn load_config(toml_path: &Path) -> ColloquyConfig {
    match try_load_config(toml_path) {
        Ok(config) => {
            info!("configuration loaded from '{}'", toml_path.display());
            config
        },
        Err(e) => {
            warn!(
                "Could not load configuration from '{}': {:#}. Using defaults.",
                toml_path.display(),
                e
            );
            ColloquyConfig::default()
        },
    }
}

/// Attempts to load configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
fn try_load_config(toml_path: &Path) -> Result<ColloquyConfig> {
    let text = fs::read_to_string(toml_path)
        .with_context(|| format!("reading configuration from '{}'", toml_path.display()))?;
    let config: ColloquyConfig =
        toml::from_str(&text).with_context(|| format!("parsing configuration from '{}'", toml_path.display()))?;
    Ok(sanitize(config))
}

fn sanitize(mut config: ColloquyConfig) -> ColloquyConfig {
    let delay = config.playback.auto_advance_delay;
    if !(0.0..=MAX_PLAYBACK_SECS).contains(&delay) {
        warn!("playback.auto_advance_delay = {delay} is outside 0..={MAX_PLAYBACK_SECS}; using default");
        config.playback.auto_advance_delay = PlaybackDefaults::default().auto_advance_delay;
    }
    let rate = config.console.reveal_rate;
    if !rate.is_finite() || rate < 0.0 {
        warn!("console.reveal_rate = {rate} is invalid; using default");
        config.console.reveal_rate = ConsoleConfig::default().reveal_rate;
    }
    config
}
