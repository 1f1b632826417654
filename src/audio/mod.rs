//! # Audio Backends
//!
//! The [`PlaybackEngine`](crate::playback::PlaybackEngine) talks to sound
//! hardware through [`AudioBackend`]. Backends expose only synchronous
//! operations; completion is detected by polling [`AudioBackend::is_busy`].
//!
//! - [`CommandAudio`] - one external player process per clip (`aplay`)
//! - [`SilentAudio`] - no output, each clip lasts a fixed time

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

mod command;

pub use command::CommandAudio;

/// A single playback slot on some audio output.
pub trait AudioBackend: Send {
    /// Prepare `path` for playback, replacing anything loaded before.
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Start playing the loaded clip.
    fn play_loaded(&mut self) -> Result<()>;

    /// Halt playback immediately. Idempotent.
    fn stop_playback(&mut self);

    /// Whether a clip is still sounding.
    fn is_busy(&mut self) -> bool;

    /// Set output volume; callers pass values already clamped to `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;
}

/// Backend that plays nothing but keeps each clip "busy" for a fixed time.
///
/// Useful on a desk without speakers: the care state machine still sees a
/// realistic speaking window during which tag reads are ignored.
#[derive(Debug)]
pub struct SilentAudio {
    clip_duration: Duration,
    loaded: Option<PathBuf>,
    started: Option<Instant>,
    volume: f32,
}

impl SilentAudio {
    pub fn new(clip_duration: Duration) -> Self {
        Self {
            clip_duration,
            loaded: None,
            started: None,
            volume: 1.0,
        }
    }
}

impl AudioBackend for SilentAudio {
    fn load(&mut self, path: &Path) -> Result<()> {
        self.loaded = Some(path.to_path_buf());
        Ok(())
    }

    fn play_loaded(&mut self) -> Result<()> {
        let path = self.loaded.as_ref().context("no clip loaded")?;
        log::debug!("(silent) playing {}", path.display());
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop_playback(&mut self) {
        self.started = None;
    }

    fn is_busy(&mut self) -> bool {
        self.started
            .is_some_and(|started| started.elapsed() < self.clip_duration)
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn volume(&self) -> f32 {
        self.volume
    }
}
