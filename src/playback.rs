//! # Playback Engine
//!
//! Owns the toy's single audio slot. At most one clip plays at a time:
//! [`PlaybackEngine::play`] always stops the previous clip before starting a
//! new one, which also retires the previous completion watcher.
//!
//! ## Completion detection
//!
//! Backends only answer "are you busy?", so every play spawns a watcher
//! thread that polls [`AudioBackend::is_busy`] at a short fixed interval and
//! flips the engine to idle when the clip ends. Each play gets a generation
//! number; a watcher only clears the playback it was spawned for, so a slow
//! watcher can never end a newer clip.
//!
//! ## Locking
//!
//! `play` and `stop` hold the slot lock for their whole run, so concurrent
//! callers take turns and history order matches the order clips reached the
//! backend. Inside that, playback state and the backend sit behind separate
//! mutexes and are never held at the same time. Watchers never take the slot
//! lock.

use crate::audio::AudioBackend;
use crate::sync::{join_with_timeout, lock};
use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Default)]
struct PlaybackState {
    current_clip: Option<String>,
    is_playing: bool,
    /// Every clip ever started, oldest first.
    history: Vec<String>,
    generation: u64,
}

/// Single-slot clip player shared by every component of the toy.
pub struct PlaybackEngine {
    backend: Arc<Mutex<Box<dyn AudioBackend>>>,
    state: Arc<Mutex<PlaybackState>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    slot: Mutex<()>,
    audio_dir: PathBuf,
    watch_interval: Duration,
    stop_timeout: Duration,
}

impl PlaybackEngine {
    /// Create an engine resolving clip names against `audio_dir`.
    pub fn new(
        backend: Box<dyn AudioBackend>,
        audio_dir: impl Into<PathBuf>,
        watch_interval: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            state: Arc::new(Mutex::new(PlaybackState::default())),
            watcher: Mutex::new(None),
            slot: Mutex::new(()),
            audio_dir: audio_dir.into(),
            watch_interval,
            stop_timeout,
        }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Start playing `clip`, stopping whatever is playing first.
    ///
    /// # Errors
    ///
    /// Fails without touching any state when the clip file does not exist.
    /// When the backend refuses to start, the engine is left idle (the clip
    /// stays in the history).
    pub fn play(&self, clip: &str) -> Result<()> {
        let _slot = lock(&self.slot);
        self.stop_locked();

        let path = self.audio_dir.join(clip);
        if !path.exists() {
            bail!("Audio clip not found: {}", path.display());
        }

        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.is_playing = true;
            state.current_clip = Some(clip.to_string());
            state.history.push(clip.to_string());
            state.generation
        };

        let started = {
            let mut backend = lock(&self.backend);
            backend.load(&path).and_then(|()| backend.play_loaded())
        };
        if let Err(e) = started {
            let mut state = lock(&self.state);
            if state.generation == generation {
                state.is_playing = false;
                state.current_clip = None;
            }
            return Err(e).with_context(|| format!("Failed to play {clip}"));
        }

        info!("Playing {clip}");
        self.spawn_watcher(generation)
    }

    fn spawn_watcher(&self, generation: u64) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let interval = self.watch_interval;

        let handle = thread::Builder::new()
            .name("playback-watcher".to_string())
            .spawn(move || watch_until_done(&backend, &state, generation, interval))
            .context("Failed to spawn playback watcher")?;

        let previous = lock(&self.watcher).replace(handle);
        if let Some(previous) = previous {
            // Anything still running here was already detached by `stop`.
            if previous.is_finished() {
                let _ = previous.join();
            }
        }
        Ok(())
    }

    /// Halt the current clip and wait (bounded) for its watcher to exit.
    pub fn stop(&self) {
        let _slot = lock(&self.slot);
        self.stop_locked();
    }

    fn stop_locked(&self) {
        {
            let state = lock(&self.state);
            if !state.is_playing {
                return;
            }
        }

        lock(&self.backend).stop_playback();

        let stopped_clip = {
            let mut state = lock(&self.state);
            state.is_playing = false;
            state.current_clip.take()
        };
        if let Some(clip) = stopped_clip {
            debug!("Stopped {clip}");
        }

        let watcher = lock(&self.watcher).take();
        if let Some(handle) = watcher {
            join_with_timeout(handle, self.stop_timeout, "playback-watcher");
        }
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).is_playing
    }

    /// The clip currently sounding, if any.
    pub fn current_clip(&self) -> Option<String> {
        let state = lock(&self.state);
        if state.is_playing {
            state.current_clip.clone()
        } else {
            None
        }
    }

    /// All clips started so far, most recent last.
    pub fn history(&self) -> Vec<String> {
        lock(&self.state).history.clone()
    }

    pub fn last_played(&self) -> Option<String> {
        lock(&self.state).history.last().cloned()
    }

    /// Set output volume, clamped to `0.0..=1.0`.
    pub fn set_volume(&self, volume: f32) {
        let clamped = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        lock(&self.backend).set_volume(clamped);
        debug!("Volume set to {clamped}");
    }

    pub fn volume(&self) -> f32 {
        lock(&self.backend).volume()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_until_done(
    backend: &Mutex<Box<dyn AudioBackend>>,
    state: &Mutex<PlaybackState>,
    generation: u64,
    interval: Duration,
) {
    loop {
        let still_current = {
            let state = lock(state);
            state.is_playing && state.generation == generation
        };
        if !still_current {
            debug!("Watcher {generation} retired");
            return;
        }
        if !lock(backend).is_busy() {
            break;
        }
        thread::sleep(interval);
    }

    let mut state = lock(state);
    if state.generation == generation && state.is_playing {
        state.is_playing = false;
        if let Some(clip) = &state.current_clip {
            debug!("Finished {clip}");
        }
    } else {
        debug!("Watcher {generation} outlived its clip");
    }
}
