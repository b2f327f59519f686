//! Saved conversation sessions.
//!
//! A session file is RON holding the runtime snapshot together with the
//! variable store, so a conversation can be resumed exactly where it stopped.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::COLLOQUY_VERSION;
use crate::runtime::{DialogueRuntime, SessionSnapshot};
use crate::store::MemoryStore;

pub const SESSION_DIR: &str = "saved_sessions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub version: String,
    pub graph_title: String,
    pub snapshot: SessionSnapshot,
    pub variables: MemoryStore,
}

impl SavedSession {
    pub fn capture(runtime: &DialogueRuntime, store: &MemoryStore) -> Self {
        Self {
            version: COLLOQUY_VERSION.to_string(),
            graph_title: runtime.graph().title().to_string(),
            snapshot: runtime.snapshot(),
            variables: store.clone(),
        }
    }
}

/// File path for a named save slot inside `dir`.
pub fn slot_path(dir: &Path, slot: &str) -> PathBuf {
    dir.join(format!("{}.ron", sanitize_slug(slot)))
}

/// Write a session to `dir/<slot>.ron`, creating `dir` if needed.
///
/// # Errors
/// Serialization or IO failure.
pub fn save_session(dir: &Path, slot: &str, session: &SavedSession) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating session directory '{}'", dir.display()))?;
    let path = slot_path(dir, slot);
    let text = ron::ser::to_string_pretty(session, ron::ser::PrettyConfig::default())
        .context("serializing session")?;
    fs::write(&path, text).with_context(|| format!("writing session to '{}'", path.display()))?;
    info!("session {} saved to '{}'", session.snapshot.session, path.display());
    Ok(path)
}

/// Read a session file. A version mismatch is logged but not fatal.
///
/// # Errors
/// IO or deserialization failure.
pub fn load_session(path: &Path) -> Result<SavedSession> {
    let text = fs::read_to_string(path).with_context(|| format!("reading session from '{}'", path.display()))?;
    let session: SavedSession =
        ron::from_str(&text).with_context(|| format!("parsing session from '{}'", path.display()))?;
    if session.version != COLLOQUY_VERSION {
        warn!(
            "session '{}' was saved by version {}, running {}",
            path.display(),
            session.version,
            COLLOQUY_VERSION
        );
    }
    Ok(session)
}

/// Slot names in the default session directory, sorted.
pub fn list_sessions() -> Vec<String> {
    list_sessions_in(Path::new(SESSION_DIR)).unwrap_or_default()
}

/// Slot names (file stems of `.ron` files) in `dir`, sorted.
///
/// # Errors
/// The directory cannot be read.
pub fn list_sessions_in(dir: &Path) -> Result<Vec<String>> {
    let mut slots = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing sessions in '{}'", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "ron")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            slots.push(stem.to_string());
        }
    }
    slots.sort();
    Ok(slots)
}

/// Normalize a user-provided slot name into a filesystem-safe slug.
pub fn sanitize_slug(raw: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() { "session".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DialogueGraph;
    use crate::node::DialogueNode;
    use crate::playback::PlaybackDefaults;
    use std::sync::Arc;

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(sanitize_slug("Before the Gate!"), "before-the-gate");
        assert_eq!(sanitize_slug("  ../etc/passwd "), "etc-passwd");
        assert_eq!(sanitize_slug("***"), "session");
        assert_eq!(sanitize_slug("slot_2"), "slot_2");
    }

    #[test]
    fn session_round_trips_through_a_file() {
        let graph = Arc::new(DialogueGraph::from_nodes("a", [DialogueNode::new("a", "hello")]).with_title("Test"));
        let mut runtime = DialogueRuntime::new(graph, PlaybackDefaults::default());
        let store: MemoryStore = [("met", true)].into_iter().collect();
        let mut events = Vec::new();
        runtime.start(None, &store, &mut events).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let saved = SavedSession::capture(&runtime, &store);
        let path = save_session(dir.path(), "My Slot", &saved).unwrap();
        assert_eq!(path, dir.path().join("my-slot.ron"));

        let loaded = load_session(&path).unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(list_sessions_in(dir.path()).unwrap(), vec!["my-slot"]);
    }
}
