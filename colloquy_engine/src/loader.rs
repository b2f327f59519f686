//! Loader utilities for building a `DialogueGraph` from content files.
//!
//! Dialogue content is read from a `GraphDef` in TOML, RON or JSON and validated
//! as a whole before any runtime structures are built. Console and playback
//! settings come from an optional `colloquy.toml`.

pub mod config;
pub mod graph;

use std::path::Path;

use anyhow::{Context, Result, bail};
use colloquy_data::GraphDef;
use log::{info, warn};

use crate::graph::DialogueGraph;
use crate::loader::graph::{build_graph_from_def, load_graphdef};

pub use config::{ColloquyConfig, ConsoleConfig, load_config};
pub use graph::{ContentFormat, graph_to_def, save_graph};

/// Load, validate and build a `DialogueGraph` from a content file.
///
/// # Errors
/// Errors bubble up from file IO, deserialization, or validation. Validation
/// reports every problem found, not just the first.
pub fn load_dialogue(path: &Path) -> Result<DialogueGraph> {
    let def = load_graphdef(path).context("while loading dialogue content")?;
    validate_graphdef(&def).with_context(|| format!("while validating '{}'", path.display()))?;
    let graph = build_graph_from_def(&def);

    info!(
        "\"{}\": {} nodes, {} variables, entry '{}'",
        graph.title(),
        graph.len(),
        graph.variables().len(),
        graph.entry()
    );
    let reachable = graph.reachable_ids();
    if reachable.len() < graph.len() {
        for node in graph.nodes().filter(|n| !reachable.contains(&n.id)) {
            warn!("node '{}' can never be reached from '{}'", node.id, graph.entry());
        }
    }
    Ok(graph)
}

/// Validate a `GraphDef` and return a single aggregated error.
///
/// # Errors
/// Lists every validation problem, one per line.
pub fn validate_graphdef(def: &GraphDef) -> Result<()> {
    let errors = colloquy_data::validate_graph(def);
    if errors.is_empty() {
        return Ok(());
    }
    let details = errors
        .into_iter()
        .map(|err| format!("- {err}"))
        .collect::<Vec<_>>()
        .join("\n");
    bail!("dialogue validation failed:\n{details}");
}
