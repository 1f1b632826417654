//! # Configuration Module
//!
//! Everything the toy knows before it wakes up: which tag means which care
//! action, which clips belong to each action, and every numeric threshold of
//! the care state machine.
//!
//! ## Sources
//!
//! Configuration is resolved once at startup, in this order:
//! 1. An explicit `--config <PATH>` (the file must exist)
//! 2. `config.json` in the platform config directory, if present:
//!    - Linux: `~/.config/plushcare/config.json`
//!    - macOS: `~/Library/Application Support/plushcare/config.json`
//! 3. The built-in defaults below, which describe the shipped toy
//!
//! Every field has a default, so a file only needs to name what it changes.
//! After loading, the [`Config`] is immutable and shared as `Arc<Config>`.

use crate::tag::TagId;
use anyhow::{ensure, Context, Result};
use log::{debug, info};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted period or timeout, in seconds (one day).
pub const MAX_PERIOD_SECS: f64 = 86_400.0;

/// Whether an action feeds the toy or keeps it company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Consumables: raise hunger.
    Food,
    /// Everything else: raise attention.
    Attention,
}

/// Clips for one care action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareAction {
    pub kind: ActionKind,
    /// Normal responses, one picked at random per read.
    pub clips: Vec<String>,
    /// Played when the same tag is scanned too many times in a row.
    #[serde(default)]
    pub full_clip: Option<String>,
}

/// Clips not tied to a single action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemClips {
    pub power_on: String,
    pub battery_low: String,
    pub hungry: String,
    pub lonely: String,
    pub full_hungry: String,
    pub full_attention: String,
}

impl Default for SystemClips {
    fn default() -> Self {
        Self {
            power_on: "system/power_on.wav".to_string(),
            battery_low: "system/battery_low.wav".to_string(),
            hungry: "status/hungry.wav".to_string(),
            lonely: "status/lonely.wav".to_string(),
            full_hungry: "status/full_hungry.wav".to_string(),
            full_attention: "status/full_attention.wav".to_string(),
        }
    }
}

/// What it takes to reach a level, and the clip announcing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRequirement {
    pub care_count: u32,
    /// Minimum hunger as a fraction of `max_hunger`.
    pub hunger_ratio: f64,
    /// Minimum attention as a fraction of `max_attention`.
    pub attention_ratio: f64,
    pub clip: String,
}

/// Numeric tuning of the care state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CareTuning {
    pub initial_hunger: u32,
    pub initial_attention: u32,
    pub max_hunger: u32,
    pub max_attention: u32,
    pub hunger_gain: u32,
    pub attention_gain: u32,
    pub hunger_decay: u32,
    pub attention_decay: u32,
    /// The hungry cue may play while hunger is strictly below this.
    pub hunger_alert_threshold: u32,
    /// The lonely cue may play while attention is at or below this.
    pub attention_alert_threshold: u32,
    /// Chance per decay tick that an alert cue actually plays.
    pub alert_probability: f64,
    /// Consecutive reads of one tag before its full clip takes over.
    pub same_tag_limit: u32,
    /// Update stats even when the chosen clip failed to play.
    pub count_failed_playback: bool,
}

impl Default for CareTuning {
    fn default() -> Self {
        Self {
            initial_hunger: 10,
            initial_attention: 10,
            max_hunger: 100,
            max_attention: 100,
            hunger_gain: 10,
            attention_gain: 10,
            hunger_decay: 10,
            attention_decay: 10,
            hunger_alert_threshold: 10,
            attention_alert_threshold: 0,
            alert_probability: 0.3,
            same_tag_limit: 5,
            count_failed_playback: false,
        }
    }
}

/// Periods of the background loops, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub scan_interval_secs: f64,
    pub decay_interval_secs: f64,
    pub status_interval_secs: f64,
    /// How often the playback watcher polls the backend.
    pub watch_interval_secs: f64,
    /// Bounded wait for the playback watcher after a stop.
    pub stop_timeout_secs: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            scan_interval_secs: 3.0,
            decay_interval_secs: 60.0,
            status_interval_secs: 10.0,
            watch_interval_secs: 0.1,
            stop_timeout_secs: 0.5,
        }
    }
}

impl Timing {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval_secs)
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs_f64(self.decay_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs_f64(self.status_interval_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs_f64(self.watch_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stop_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderKind {
    /// libnfc command-line tools.
    Command,
    /// Random reads of the configured tags, for desk testing.
    Simulated,
}

/// Tag reader backend and its retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub backend: ReaderKind,
    /// Reconnect-and-retry attempts after a failed read, per scan.
    pub max_retries: u32,
    pub retry_backoff_secs: f64,
    pub read_timeout_secs: f64,
    /// Bounded wait for the polling thread on shutdown.
    pub join_timeout_secs: f64,
    /// Succeeds when a reader device is attached.
    pub probe_program: String,
    pub probe_args: Vec<String>,
    /// Prints `UID (NFCID1): ..` when a tag is in the field.
    pub read_program: String,
    pub read_args: Vec<String>,
    /// Chance per scan that the simulated reader sees a tag.
    pub simulate_hit_rate: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            backend: ReaderKind::Command,
            max_retries: 3,
            retry_backoff_secs: 0.1,
            read_timeout_secs: 1.0,
            join_timeout_secs: 1.0,
            probe_program: "nfc-scan-device".to_string(),
            probe_args: Vec::new(),
            read_program: "nfc-list".to_string(),
            read_args: Vec::new(),
            simulate_hit_rate: 0.2,
        }
    }
}

impl ReaderConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.retry_backoff_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.join_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioKind {
    /// An external player process per clip.
    Command,
    /// No sound; every clip "plays" for a fixed time.
    Silent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub backend: AudioKind,
    pub program: String,
    /// Arguments placed before the clip path.
    pub args: Vec<String>,
    pub mixer_program: String,
    /// ALSA mixer control receiving volume changes; `None` keeps volume local.
    pub mixer_control: Option<String>,
    pub silent_clip_secs: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioKind::Command,
            program: "aplay".to_string(),
            args: vec!["-q".to_string()],
            mixer_program: "amixer".to_string(),
            mixer_control: None,
            silent_clip_secs: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub check_interval_secs: f64,
    pub alert_cooldown_secs: f64,
    /// Clip for the low-voltage alert. The shipped toy keeps it silent.
    pub alert_clip: Option<String>,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "vcgencmd".to_string(),
            args: vec!["get_throttled".to_string()],
            check_interval_secs: 30.0,
            alert_cooldown_secs: 300.0,
            alert_clip: None,
        }
    }
}

impl BatteryConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.alert_cooldown_secs)
    }
}

/// Complete, immutable runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root that every clip path is relative to.
    pub audio_dir: PathBuf,
    pub volume: f32,
    pub tags: BTreeMap<TagId, String>,
    pub actions: BTreeMap<String, CareAction>,
    pub clips: SystemClips,
    pub levels: BTreeMap<u32, LevelRequirement>,
    pub care: CareTuning,
    pub timing: Timing,
    pub reader: ReaderConfig,
    pub audio: AudioConfig,
    pub battery: BatteryConfig,
}

const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("04:1E:72:12:BD:2A:81", "block"),
    ("04:56:6B:12:BD:2A:81", "cookie"),
    ("04:EA:77:12:BD:2A:81", "strawberry"),
    ("04:F8:7D:12:BD:2A:81", "sleep"),
    ("04:E7:84:12:BD:2A:81", "medicine"),
    ("04:BD:A8:12:BD:2A:81", "curry"),
    ("04:D8:97:12:BD:2A:81", "bread"),
    ("04:C9:91:12:BD:2A:81", "dentifrice"),
    ("04:33:9E:12:BD:2A:81", "song"),
    ("1D:DC:AF:27:0F:10:80", "hamburger_steak"),
    ("1D:DB:AF:27:0F:10:80", "going_out"),
    ("1D:DA:AF:27:0F:10:80", "neapolitan"),
];

const FOOD_ACTIONS: &[&str] = &["bread", "curry", "cookie", "strawberry", "hamburger_steak", "neapolitan"];

fn default_actions() -> BTreeMap<String, CareAction> {
    let numbered = |name: &str, numbers: &[u32]| -> Vec<String> {
        numbers.iter().map(|n| format!("{name}/{name}_{n:02}.wav")).collect()
    };

    let mut actions = BTreeMap::new();
    for (_, name) in DEFAULT_TAGS {
        let clips = match *name {
            "medicine" => numbered(name, &[3, 4, 5]),
            "song" => numbered(name, &[1, 2, 3, 4]),
            _ => numbered(name, &[1, 2, 3]),
        };
        let full_clip = match *name {
            "medicine" => "status/full_medicine1.wav".to_string(),
            _ => format!("status/full_{name}.wav"),
        };
        let kind = if FOOD_ACTIONS.contains(name) {
            ActionKind::Food
        } else {
            ActionKind::Attention
        };
        actions.insert(
            (*name).to_string(),
            CareAction {
                kind,
                clips,
                full_clip: Some(full_clip),
            },
        );
    }
    actions
}

fn default_levels() -> BTreeMap<u32, LevelRequirement> {
    [(2, 10, 0.0), (3, 20, 0.5), (4, 40, 0.8), (5, 70, 0.8)]
        .into_iter()
        .map(|(level, care_count, ratio)| {
            (
                level,
                LevelRequirement {
                    care_count,
                    hunger_ratio: ratio,
                    attention_ratio: ratio,
                    clip: format!("status/level{level}.wav"),
                },
            )
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("audio"),
            volume: 1.0,
            tags: DEFAULT_TAGS
                .iter()
                .filter_map(|(id, action)| Some((TagId::parse(id).ok()?, (*action).to_string())))
                .collect(),
            actions: default_actions(),
            clips: SystemClips::default(),
            levels: default_levels(),
            care: CareTuning::default(),
            timing: Timing::default(),
            reader: ReaderConfig::default(),
            audio: AudioConfig::default(),
            battery: BatteryConfig::default(),
        }
    }
}

/// Returns the platform-appropriate configuration file path.
///
/// The file is not created; only its parent directory is looked up.
///
/// # Errors
///
/// Fails when the platform has no standard configuration directory.
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system config directory. Pass --config explicitly."
        )
    })?;

    Ok(config_dir.join("plushcare").join("config.json"))
}

impl Config {
    /// Resolve the configuration following the lookup order in the module docs.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_config_path() {
            Ok(path) if path.exists() => Self::from_file(&path),
            Ok(path) => {
                debug!("No config at {}, using built-in defaults", path.display());
                Self::default().validated()
            }
            Err(e) => {
                debug!("{e}; using built-in defaults");
                Self::default().validated()
            }
        }
    }

    /// Read and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("Failed to parse config JSON")?;
        config.validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check the invariants every other module relies on.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.volume),
            "volume {} is outside 0.0..=1.0",
            self.volume
        );

        for (tag, action) in &self.tags {
            ensure!(
                self.actions.contains_key(action),
                "tag {tag} maps to undefined action `{action}`"
            );
        }
        for (name, action) in &self.actions {
            ensure!(!action.clips.is_empty(), "action `{name}` has no clips");
        }

        let care = &self.care;
        ensure!(care.max_hunger > 0, "max_hunger must be positive");
        ensure!(care.max_attention > 0, "max_attention must be positive");
        ensure!(care.same_tag_limit >= 1, "same_tag_limit must be at least 1");
        ensure!(
            (0.0..=1.0).contains(&care.alert_probability),
            "alert_probability {} is outside 0.0..=1.0",
            care.alert_probability
        );

        for (level, requirement) in &self.levels {
            ensure!(*level >= 2, "level {level} cannot be reached; levels start at 1");
            for (what, ratio) in [
                ("hunger_ratio", requirement.hunger_ratio),
                ("attention_ratio", requirement.attention_ratio),
            ] {
                ensure!(
                    (0.0..=1.0).contains(&ratio),
                    "level {level} {what} {ratio} is outside 0.0..=1.0"
                );
            }
        }

        ensure!(
            (0.0..=1.0).contains(&self.reader.simulate_hit_rate),
            "reader.simulate_hit_rate is outside 0.0..=1.0"
        );

        let periods = [
            ("timing.scan_interval_secs", self.timing.scan_interval_secs),
            ("timing.decay_interval_secs", self.timing.decay_interval_secs),
            ("timing.status_interval_secs", self.timing.status_interval_secs),
            ("timing.watch_interval_secs", self.timing.watch_interval_secs),
            ("timing.stop_timeout_secs", self.timing.stop_timeout_secs),
            ("reader.read_timeout_secs", self.reader.read_timeout_secs),
            ("reader.join_timeout_secs", self.reader.join_timeout_secs),
            ("audio.silent_clip_secs", self.audio.silent_clip_secs),
            ("battery.check_interval_secs", self.battery.check_interval_secs),
        ];
        for (name, secs) in periods {
            ensure!(
                secs > 0.0 && secs <= MAX_PERIOD_SECS,
                "{name} must be between 0 and {MAX_PERIOD_SECS} seconds, got {secs}"
            );
        }
        for (name, secs) in [
            ("reader.retry_backoff_secs", self.reader.retry_backoff_secs),
            ("battery.alert_cooldown_secs", self.battery.alert_cooldown_secs),
        ] {
            ensure!(
                (0.0..=MAX_PERIOD_SECS).contains(&secs),
                "{name} must be between 0 and {MAX_PERIOD_SECS} seconds, got {secs}"
            );
        }

        Ok(())
    }

    /// Make `audio_dir` absolute against the current directory.
    pub fn resolve_audio_dir(&mut self) -> Result<()> {
        let absolute = self
            .audio_dir
            .absolutize()
            .with_context(|| format!("Failed to resolve audio directory {}", self.audio_dir.display()))?
            .into_owned();
        self.audio_dir = absolute;
        Ok(())
    }

    /// Look up the care action a tag stands for.
    pub fn action_for(&self, tag: &TagId) -> Option<(&str, &CareAction)> {
        let name = self.tags.get(tag)?;
        self.actions.get(name).map(|action| (name.as_str(), action))
    }

    pub fn level_requirement(&self, level: u32) -> Option<&LevelRequirement> {
        self.levels.get(&level)
    }

    /// Tags the simulated reader may report.
    pub fn registered_tags(&self) -> Vec<TagId> {
        self.tags.keys().cloned().collect()
    }

    /// Every clip the configuration can ever ask the player for.
    pub fn all_clips(&self) -> BTreeSet<String> {
        let mut clips = BTreeSet::new();
        for action in self.actions.values() {
            clips.extend(action.clips.iter().cloned());
            clips.extend(action.full_clip.iter().cloned());
        }
        let system = &self.clips;
        for clip in [
            &system.power_on,
            &system.battery_low,
            &system.hungry,
            &system.lonely,
            &system.full_hungry,
            &system.full_attention,
        ] {
            clips.insert(clip.clone());
        }
        clips.extend(self.levels.values().map(|req| req.clip.clone()));
        clips.extend(self.battery.alert_clip.iter().cloned());
        clips
    }

    /// Referenced clips with no file under `audio_dir`.
    pub fn missing_clips(&self) -> Vec<String> {
        self.all_clips()
            .into_iter()
            .filter(|clip| !self.audio_dir.join(clip).is_file())
            .collect()
    }

    /// Human-readable overview printed at startup and by `plushcare config`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "==== plushcare configuration ====");
        let _ = writeln!(out, "Audio directory: {}", self.audio_dir.display());
        let _ = writeln!(out, "Reader backend:  {:?}", self.reader.backend);
        let _ = writeln!(out, "Audio backend:   {:?}", self.audio.backend);
        let _ = writeln!(out, "Scan interval:   {}s", self.timing.scan_interval_secs);
        let _ = writeln!(out, "Volume:          {}", self.volume);
        let _ = writeln!(out, "Registered tags: {}", self.tags.len());
        let _ = writeln!(out, "Care actions:");
        for (name, action) in &self.actions {
            let kind = match action.kind {
                ActionKind::Food => "food",
                ActionKind::Attention => "attention",
            };
            let full = action.full_clip.as_deref().unwrap_or("-");
            let _ = writeln!(out, "  - {name} ({kind}): {} clips, full: {full}", action.clips.len());
        }
        let _ = writeln!(out, "Levels: {}", self.levels.len() + 1);
        let _ = write!(out, "=================================");
        out
    }
}
