//! Playback policy: when a node counts as complete and may auto-advance.
//!
//! Each node carries [`PlaybackOverrides`] where every field is optional. A set
//! field replaces the matching global default from [`PlaybackDefaults`]; an
//! unset one inherits it. The engine never plays audio or animates text. It
//! only resolves the policy and tracks the text/audio completion callbacks the
//! presentation layer reports.

use std::time::Duration;

use colloquy_data::MAX_PLAYBACK_SECS;
use serde::{Deserialize, Serialize};

/// Which completion signals a node waits for before it may auto-advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum WaitMode {
    None,
    TextOnly,
    AudioOnly,
    Both,
    #[default]
    Either,
}

/// Voice line metadata handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceLine {
    pub clip: String,
    pub volume: f32,
    pub duration: Option<Duration>,
}

/// Per-node overrides. `None` means "use the global default".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackOverrides {
    pub voice: Option<VoiceLine>,
    pub wait_mode: Option<WaitMode>,
    pub auto_advance: Option<bool>,
    pub auto_advance_delay: Option<Duration>,
    pub allow_skip_audio: Option<bool>,
    pub stop_voice_on_exit: Option<bool>,
    pub match_typewriter_to_audio: Option<bool>,
}

/// Global playback defaults, normally read from the `[playback]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    pub wait_mode: WaitMode,
    pub auto_advance: bool,
    /// Seconds between completion and auto-advance.
    pub auto_advance_delay: f32,
    pub allow_skip_audio: bool,
    pub stop_voice_on_exit: bool,
    pub match_typewriter_to_audio: bool,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            wait_mode: WaitMode::Either,
            auto_advance: false,
            auto_advance_delay: 0.25,
            allow_skip_audio: true,
            stop_voice_on_exit: true,
            match_typewriter_to_audio: false,
        }
    }
}

impl PlaybackDefaults {
    /// The global auto-advance delay. Values outside `0..=MAX_PLAYBACK_SECS`
    /// fall back to the built-in default.
    pub fn delay(&self) -> Duration {
        let secs = self.auto_advance_delay;
        if (0.0..=MAX_PLAYBACK_SECS).contains(&secs)
            && let Ok(delay) = Duration::try_from_secs_f32(secs)
        {
            return delay;
        }
        Duration::from_secs_f32(Self::default().auto_advance_delay)
    }
}

/// Fully resolved policy for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePlaybackPolicy {
    pub voice: Option<VoiceLine>,
    pub wait_mode: WaitMode,
    pub auto_advance: bool,
    pub auto_advance_delay: Duration,
    pub allow_skip_audio: bool,
    pub stop_voice_on_exit: bool,
    pub match_typewriter_to_audio: bool,
}

/// Merge a node's overrides onto the global defaults, field by field.
pub fn resolve_effective_policy(overrides: &PlaybackOverrides, defaults: &PlaybackDefaults) -> EffectivePlaybackPolicy {
    EffectivePlaybackPolicy {
        voice: overrides.voice.clone(),
        wait_mode: overrides.wait_mode.unwrap_or(defaults.wait_mode),
        auto_advance: overrides.auto_advance.unwrap_or(defaults.auto_advance),
        auto_advance_delay: overrides
            .auto_advance_delay
            .unwrap_or_else(|| defaults.delay()),
        allow_skip_audio: overrides.allow_skip_audio.unwrap_or(defaults.allow_skip_audio),
        stop_voice_on_exit: overrides.stop_voice_on_exit.unwrap_or(defaults.stop_voice_on_exit),
        match_typewriter_to_audio: overrides
            .match_typewriter_to_audio
            .unwrap_or(defaults.match_typewriter_to_audio),
    }
}

impl EffectivePlaybackPolicy {
    pub fn has_voice(&self) -> bool {
        self.voice.is_some()
    }

    /// Characters per second for the typewriter reveal of `text`.
    ///
    /// When pacing to audio is on and the voice line has a known duration the text
    /// finishes revealing together with the clip; otherwise `base_rate` is used.
    pub fn reveal_rate(&self, text: &str, base_rate: f32) -> f32 {
        let paced = self
            .voice
            .as_ref()
            .and_then(|v| v.duration)
            .filter(|_| self.match_typewriter_to_audio)
            .filter(|d| !d.is_zero());
        match paced {
            #[allow(clippy::cast_precision_loss)]
            Some(duration) => text.chars().count().max(1) as f32 / duration.as_secs_f32(),
            None => base_rate,
        }
    }
}

/// Tracks completion signals for the node being presented.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionTracker {
    pub text_done: bool,
    pub audio_done: bool,
}

impl CompletionTracker {
    /// A node with no voice line starts with its audio already complete.
    pub fn for_policy(policy: &EffectivePlaybackPolicy) -> Self {
        Self {
            text_done: false,
            audio_done: !policy.has_voice(),
        }
    }

    pub fn is_satisfied(&self, mode: WaitMode) -> bool {
        match mode {
            WaitMode::None => true,
            WaitMode::TextOnly => self.text_done,
            WaitMode::AudioOnly => self.audio_done,
            WaitMode::Both => self.text_done && self.audio_done,
            WaitMode::Either => self.text_done || self.audio_done,
        }
    }
}
