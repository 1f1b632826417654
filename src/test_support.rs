//! Shared fixtures for unit tests.

use crate::audio::AudioBackend;
use crate::sync::lock;
use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Debug, Default)]
struct MockAudioState {
    loaded: Option<PathBuf>,
    started: Vec<PathBuf>,
    busy: bool,
    stops: usize,
    fail_next_play: bool,
    volume: f32,
}

/// Audio backend that stays busy until the test calls [`MockAudio::finish`].
#[derive(Debug, Clone, Default)]
pub struct MockAudio {
    state: Arc<Mutex<MockAudioState>>,
}

impl MockAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// End the current clip as if it played to completion.
    pub fn finish(&self) {
        lock(&self.state).busy = false;
    }

    pub fn busy(&self) -> bool {
        lock(&self.state).busy
    }

    pub fn started(&self) -> Vec<PathBuf> {
        lock(&self.state).started.clone()
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }

    pub fn fail_next_play(&self) {
        lock(&self.state).fail_next_play = true;
    }
}

impl AudioBackend for MockAudio {
    fn load(&mut self, path: &Path) -> Result<()> {
        lock(&self.state).loaded = Some(path.to_path_buf());
        Ok(())
    }

    fn play_loaded(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if std::mem::take(&mut state.fail_next_play) {
            bail!("mock refused to play");
        }
        let Some(path) = state.loaded.clone() else {
            bail!("nothing loaded");
        };
        state.started.push(path);
        state.busy = true;
        Ok(())
    }

    fn stop_playback(&mut self) {
        let mut state = lock(&self.state);
        state.busy = false;
        state.stops += 1;
    }

    fn is_busy(&mut self) -> bool {
        lock(&self.state).busy
    }

    fn set_volume(&mut self, volume: f32) {
        lock(&self.state).volume = volume;
    }

    fn volume(&self) -> f32 {
        lock(&self.state).volume
    }
}

/// Temporary audio directory containing empty files for `clips`.
pub fn clip_dir(clips: &[&str]) -> (TempDir, Vec<PathBuf>) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let paths = clips
        .iter()
        .map(|clip| {
            let path = dir.path().join(clip);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create clip directory");
            }
            fs::write(&path, b"RIFF").expect("Failed to write clip");
            path
        })
        .collect();
    (dir, paths)
}

/// Poll `condition` for up to two seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
