//! Playback through an external player process.
//!
//! Like the `mpc` wrappers this crate grew out of, the backend shells out
//! instead of linking an audio stack: `aplay -q <clip>` per clip, with the
//! child process standing in for the playback slot.

use super::AudioBackend;
use crate::config::AudioConfig;
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

#[derive(Debug)]
pub struct CommandAudio {
    program: String,
    args: Vec<String>,
    mixer_program: String,
    mixer_control: Option<String>,
    loaded: Option<PathBuf>,
    child: Option<Child>,
    volume: f32,
}

impl CommandAudio {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            mixer_program: config.mixer_program.clone(),
            mixer_control: config.mixer_control.clone(),
            loaded: None,
            child: None,
            volume: 1.0,
        }
    }

    /// Reap the player process if it has exited.
    fn reap(&mut self) {
        let finished = match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(status))) => {
                if !status.success() {
                    warn!("{} exited with {status}", self.program);
                }
                true
            }
            Some(Ok(None)) | None => false,
            Some(Err(e)) => {
                warn!("Failed to poll {}: {e}", self.program);
                true
            }
        };
        if finished {
            self.child = None;
        }
    }
}

impl AudioBackend for CommandAudio {
    fn load(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!("{} is not a file", path.display());
        }
        self.loaded = Some(path.to_path_buf());
        Ok(())
    }

    fn play_loaded(&mut self) -> Result<()> {
        self.stop_playback();
        let path = self.loaded.as_ref().context("no clip loaded")?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn `{}`. Is it installed?", self.program))?;

        debug!("{} playing {} (pid {})", self.program, path.display(), child.id());
        self.child = Some(child);
        Ok(())
    }

    fn stop_playback(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Already exited is fine; kill only fails then.
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn is_busy(&mut self) -> bool {
        self.reap();
        self.child.is_some()
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;

        let Some(control) = &self.mixer_control else {
            return;
        };
        let percent = format!("{}%", (volume * 100.0).round() as u32);
        let result = Command::new(&self.mixer_program)
            .args(["-q", "sset", control.as_str(), percent.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match result {
            Ok(status) if status.success() => debug!("Mixer {control} set to {percent}"),
            Ok(status) => warn!("{} exited with {status} setting volume", self.mixer_program),
            Err(e) => warn!("Failed to run {}: {e}", self.mixer_program),
        }
    }

    fn volume(&self) -> f32 {
        self.volume
    }
}

impl Drop for CommandAudio {
    fn drop(&mut self) {
        self.stop_playback();
    }
}
