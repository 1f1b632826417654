//! # Toy Runtime
//!
//! Wires the long-running pieces together and owns their lifecycle.
//!
//! ## Threads
//!
//! - `tag-source` polls the reader and feeds [`CareEngine::on_tag_read`]
//! - `decay` runs [`CareEngine::decay_tick`] on the decay interval
//! - `status` prints a `[STATUS]` line on the status interval
//! - `battery` probes the supply voltage (when enabled)
//! - `playback-watcher` threads come and go with each clip
//!
//! ## Shutdown
//!
//! Ctrl-C or SIGTERM sets a [`StopSignal`] the main thread sleeps on.
//! Stopping then cascades: periodic workers first, then the reader, then the
//! player, so no clip outlives the process.

use crate::audio::{AudioBackend, CommandAudio, SilentAudio};
use crate::battery::{BatteryMonitor, VcgencmdProbe, VoltageProbe};
use crate::care::CareEngine;
use crate::config::{AudioKind, Config};
use crate::playback::PlaybackEngine;
use crate::reader::{ReaderBackend, TagSource};
use crate::sync::{join_with_timeout, StopSignal};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Build the player described by `config.audio`.
pub fn build_player(config: &Config) -> Arc<PlaybackEngine> {
    let backend: Box<dyn AudioBackend> = match config.audio.backend {
        AudioKind::Command => Box::new(CommandAudio::new(&config.audio)),
        AudioKind::Silent => Box::new(SilentAudio::new(Duration::from_secs_f64(
            config.audio.silent_clip_secs,
        ))),
    };
    let player = PlaybackEngine::new(
        backend,
        config.audio_dir.clone(),
        config.timing.watch_interval(),
        config.timing.stop_timeout(),
    );
    player.set_volume(config.volume);
    Arc::new(player)
}

/// Everything that runs while the toy is awake.
pub struct CareDaemon<B: ReaderBackend + 'static> {
    config: Arc<Config>,
    player: Arc<PlaybackEngine>,
    engine: Arc<CareEngine>,
    reader: TagSource<B>,
    stop: Arc<StopSignal>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    running: bool,
}

impl<B: ReaderBackend + 'static> CareDaemon<B> {
    pub fn new(config: Arc<Config>, reader: B) -> Self {
        let player = build_player(&config);
        let engine = Arc::new(CareEngine::new(Arc::clone(&config), Arc::clone(&player)));
        Self::with_parts(config, player, engine, reader)
    }

    pub fn with_parts(
        config: Arc<Config>,
        player: Arc<PlaybackEngine>,
        engine: Arc<CareEngine>,
        reader: B,
    ) -> Self {
        let reader = TagSource::new(reader, &config.reader, config.timing.scan_interval());
        Self {
            config,
            player,
            engine,
            reader,
            stop: Arc::new(StopSignal::new()),
            workers: Vec::new(),
            running: false,
        }
    }

    pub fn engine(&self) -> &Arc<CareEngine> {
        &self.engine
    }

    pub fn player(&self) -> &Arc<PlaybackEngine> {
        &self.player
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Greet, then start every background worker and the reader.
    ///
    /// `probe` is ignored when battery monitoring is disabled.
    pub fn start<P: VoltageProbe + 'static>(&mut self, probe: Option<P>) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.running = true;
        self.stop = Arc::new(StopSignal::new());

        if let Err(e) = self.player.play(&self.config.clips.power_on) {
            warn!("{e:#}");
        }

        if let Some(probe) = probe.filter(|_| self.config.battery.enabled) {
            let mut monitor = BatteryMonitor::new(probe, Arc::clone(&self.player), &self.config.battery);
            self.spawn_periodic("battery", self.config.battery.check_interval(), move || {
                monitor.check(Instant::now());
            })?;
        }

        let engine = Arc::clone(&self.engine);
        self.spawn_periodic("decay", self.config.timing.decay_interval(), move || {
            engine.decay_tick();
        })?;

        let engine = Arc::clone(&self.engine);
        self.spawn_periodic("status", self.config.timing.status_interval(), move || {
            println!("[STATUS] {}", engine.status());
        })?;

        let engine = Arc::clone(&self.engine);
        self.reader.start(move |tag| {
            let outcome = engine.on_tag_read(&tag);
            debug!("{tag} -> {outcome:?}");
        })?;

        info!("Toy is awake");
        Ok(())
    }

    fn spawn_periodic<F>(&mut self, name: &'static str, period: Duration, mut tick: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while stop.wait(period) {
                    tick();
                }
                debug!("{name} loop exited");
            })
            .with_context(|| format!("Failed to spawn {name} thread"))?;
        self.workers.push((name, handle));
        Ok(())
    }

    /// Stop workers, then the reader, then the player.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        self.stop.stop();
        let timeout = self.config.reader.join_timeout();
        for (name, handle) in self.workers.drain(..) {
            join_with_timeout(handle, timeout, name);
        }

        self.reader.stop();
        self.player.stop();
        info!("Toy is asleep ({})", self.engine.status());
    }
}

impl<B: ReaderBackend + 'static> Drop for CareDaemon<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the toy until Ctrl-C or SIGTERM.
pub fn run<B: ReaderBackend + 'static>(config: Arc<Config>, reader: B) -> Result<()> {
    let shutdown = Arc::new(StopSignal::new());
    let signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || signal.stop()).context("Failed to install signal handler")?;

    println!("{}", config.summary());

    let probe = VcgencmdProbe::new(&config.battery);
    let mut daemon = CareDaemon::new(Arc::clone(&config), reader);
    daemon.start(Some(probe))?;

    while shutdown.wait(Duration::from_secs(1)) {}

    info!("Shutdown requested");
    daemon.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderKind;
    use crate::reader::SimulatedReader;
    use crate::test_support::{clip_dir, wait_until, MockAudio};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    struct NeverLow;

    impl VoltageProbe for NeverLow {
        fn is_low_voltage(&mut self) -> Result<bool> {
            Ok(false)
        }
    }

    fn fast_config() -> (Config, TempDir) {
        let mut config = Config::default();
        config.timing.scan_interval_secs = 0.01;
        config.timing.decay_interval_secs = 0.05;
        config.timing.status_interval_secs = 0.05;
        config.reader.backend = ReaderKind::Simulated;
        config.reader.join_timeout_secs = 1.0;
        config.battery.check_interval_secs = 0.05;

        let clips: Vec<String> = config.all_clips().into_iter().collect();
        let clip_refs: Vec<&str> = clips.iter().map(String::as_str).collect();
        let (dir, _) = clip_dir(&clip_refs);
        config.audio_dir = dir.path().to_path_buf();
        (config, dir)
    }

    fn daemon_with(config: Config, audio: &MockAudio) -> CareDaemon<SimulatedReader> {
        let config = Arc::new(config);
        let player = Arc::new(PlaybackEngine::new(
            Box::new(audio.clone()),
            config.audio_dir.clone(),
            Duration::from_millis(2),
            Duration::from_millis(500),
        ));
        let engine = Arc::new(CareEngine::with_rng(
            Arc::clone(&config),
            Arc::clone(&player),
            StdRng::seed_from_u64(3),
        ));
        let reader = SimulatedReader::with_rng(config.registered_tags(), 1.0, StdRng::seed_from_u64(5));
        CareDaemon::with_parts(config, player, engine, reader)
    }

    #[test]
    fn test_start_plays_power_on_clip() {
        let (config, _dir) = fast_config();
        let audio = MockAudio::new();
        let mut daemon = daemon_with(config, &audio);

        daemon.start(Some(NeverLow)).unwrap();
        assert_eq!(daemon.player().history().first().map(String::as_str), Some("system/power_on.wav"));
        daemon.stop();
    }

    #[test]
    fn test_tags_reach_the_care_engine() {
        let (config, _dir) = fast_config();
        let audio = MockAudio::new();
        let mut daemon = daemon_with(config, &audio);
        daemon.start(None::<NeverLow>).unwrap();

        // Each clip only ends when the mock is told so.
        let cared = wait_until(|| {
            audio.finish();
            daemon.engine().state().care_count > 0
        });
        daemon.stop();
        assert!(cared);
    }

    #[test]
    fn test_stop_silences_player_and_is_idempotent() {
        let (config, _dir) = fast_config();
        let audio = MockAudio::new();
        let mut daemon = daemon_with(config, &audio);
        daemon.start(Some(NeverLow)).unwrap();
        assert!(daemon.is_running());

        daemon.stop();
        assert!(!daemon.is_running());
        assert!(!daemon.player().is_playing());
        assert!(!audio.busy());

        daemon.stop();
        assert!(!daemon.is_running());
    }

    #[test]
    fn test_build_player_applies_volume() {
        let mut config = Config::default();
        config.audio.backend = AudioKind::Silent;
        config.volume = 0.25;

        let player = build_player(&config);
        assert_eq!(player.volume(), 0.25);
        assert_eq!(player.audio_dir(), config.audio_dir.as_path());
    }
}
