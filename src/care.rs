//! # Care State Machine
//!
//! The toy's "personality": hunger, attention, level and the number of
//! successful care actions, plus the rules that turn a scanned tag into a
//! clip choice.
//!
//! ## Tag handling, in order
//!
//! 1. While a clip plays the toy is "speaking" and ignores tags entirely
//! 2. Unregistered tags are logged and ignored
//! 3. The same-tag streak is updated
//! 4. A full stomach (food) or full heart (everything else) plays the
//!    matching full clip and stops there
//! 5. Too many reads of one tag in a row play that action's full clip
//! 6. Otherwise a random clip of the action plays, avoiding the clip heard
//!    last, and the matching stat grows
//! 7. A level-up is checked once
//!
//! Stats decay on a timer through [`CareEngine::decay_tick`], which may also
//! make the toy complain that it is hungry or lonely.
//!
//! All state sits behind one mutex. Tag reads arrive sequentially from the
//! polling thread, decay ticks from their own thread.

use crate::config::{ActionKind, CareAction, Config};
use crate::playback::PlaybackEngine;
use crate::sync::lock;
use crate::tag::TagId;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Mutable pet state. Created once at startup, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CareState {
    pub hunger: u32,
    pub attention: u32,
    pub level: u32,
    pub care_count: u32,
    pub last_tag: Option<TagId>,
    pub same_tag_streak: u32,
}

impl CareState {
    /// Starting state, clamped into the configured ranges.
    pub fn initial(config: &Config) -> Self {
        let care = &config.care;
        Self {
            hunger: care.initial_hunger.min(care.max_hunger),
            attention: care.initial_attention.min(care.max_attention),
            level: 1,
            care_count: 0,
            last_tag: None,
            same_tag_streak: 0,
        }
    }
}

/// Snapshot for status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CareStatus {
    pub level: u32,
    pub care_count: u32,
    pub hunger: u32,
    pub attention: u32,
}

impl fmt::Display for CareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level={}, hunger={}, attention={}, care_count={}",
            self.level, self.hunger, self.attention, self.care_count
        )
    }
}

/// What a tag read led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CareOutcome {
    /// A clip was playing; the read was dropped.
    Busy,
    UnknownTag,
    /// Food offered on a full stomach.
    FullHunger,
    /// Attention offered while attention is maxed out.
    FullAttention,
    /// Same tag read too often in a row.
    StreakLimit { action: String },
    /// The chosen clip could not be played; stats were left alone.
    PlaybackFailed { action: String, clip: String },
    /// A normal response.
    Cared {
        action: String,
        clip: String,
        /// Whether the stat actually grew (it may already sit at max).
        counted: bool,
        leveled_up: Option<u32>,
    },
}

/// Which alert cues a decay tick played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayOutcome {
    pub hungry_cue: bool,
    pub lonely_cue: bool,
}

/// Pick a clip at random, skipping the one heard last.
///
/// Falls back to the full list when skipping would leave nothing.
pub fn choose_clip<'a, R: Rng + ?Sized>(clips: &'a [String], last_played: Option<&str>, rng: &mut R) -> Option<&'a str> {
    let fresh: Vec<&String> = clips
        .iter()
        .filter(|clip| Some(clip.as_str()) != last_played)
        .collect();

    if fresh.is_empty() {
        clips.choose(rng).map(String::as_str)
    } else {
        fresh.choose(rng).map(|clip| clip.as_str())
    }
}

/// Sole owner of the pet state.
pub struct CareEngine {
    config: Arc<Config>,
    player: Arc<PlaybackEngine>,
    state: Mutex<CareState>,
    rng: Mutex<StdRng>,
}

impl CareEngine {
    pub fn new(config: Arc<Config>, player: Arc<PlaybackEngine>) -> Self {
        Self::with_rng(config, player, StdRng::from_entropy())
    }

    /// Engine with a caller-provided random source (seed it for repeatable runs).
    pub fn with_rng(config: Arc<Config>, player: Arc<PlaybackEngine>, rng: StdRng) -> Self {
        let state = CareState::initial(&config);
        Self {
            config,
            player,
            state: Mutex::new(state),
            rng: Mutex::new(rng),
        }
    }

    pub fn state(&self) -> CareState {
        lock(&self.state).clone()
    }

    /// Replace the pet state wholesale, clamping stats into range.
    ///
    /// Test fixture only: it may lower `level` and `care_count`.
    #[cfg(test)]
    pub(crate) fn restore(&self, mut state: CareState) {
        state.hunger = state.hunger.min(self.config.care.max_hunger);
        state.attention = state.attention.min(self.config.care.max_attention);
        state.level = state.level.max(1);
        *lock(&self.state) = state;
    }

    pub fn status(&self) -> CareStatus {
        let state = lock(&self.state);
        CareStatus {
            level: state.level,
            care_count: state.care_count,
            hunger: state.hunger,
            attention: state.attention,
        }
    }

    /// React to a scanned tag.
    pub fn on_tag_read(&self, tag: &TagId) -> CareOutcome {
        if self.player.is_playing() {
            debug!("Ignoring {tag} while speaking");
            return CareOutcome::Busy;
        }

        let Some((name, action)) = self.config.action_for(tag) else {
            info!("Unregistered tag: {tag}");
            return CareOutcome::UnknownTag;
        };

        let mut state = lock(&self.state);

        if state.last_tag.as_ref() == Some(tag) {
            state.same_tag_streak += 1;
        } else {
            state.last_tag = Some(tag.clone());
            state.same_tag_streak = 1;
        }

        let care = &self.config.care;
        match action.kind {
            ActionKind::Food if state.hunger >= care.max_hunger => {
                self.play_logged(&self.config.clips.full_hungry);
                println!("[FULL_HUNGRY] {}", self.config.clips.full_hungry);
                return CareOutcome::FullHunger;
            }
            ActionKind::Attention if state.attention >= care.max_attention => {
                self.play_logged(&self.config.clips.full_attention);
                println!("[FULL_ATTENTION] {}", self.config.clips.full_attention);
                return CareOutcome::FullAttention;
            }
            _ => {}
        }

        if state.same_tag_streak >= care.same_tag_limit {
            if let Some(full_clip) = &action.full_clip {
                self.play_logged(full_clip);
                println!("[FULL_TAG_REPEAT] {name} - {full_clip}");
            }
            return CareOutcome::StreakLimit {
                action: name.to_string(),
            };
        }

        self.care_for(&mut state, name, action)
    }

    fn care_for(&self, state: &mut CareState, name: &str, action: &CareAction) -> CareOutcome {
        let last_played = self.player.last_played();
        let clip = {
            let mut rng = lock(&self.rng);
            match choose_clip(&action.clips, last_played.as_deref(), &mut *rng) {
                Some(clip) => clip.to_string(),
                // Validation guarantees clips; an empty list just means silence.
                None => return CareOutcome::UnknownTag,
            }
        };

        if let Err(e) = self.player.play(&clip) {
            warn!("{e:#}");
            if !self.config.care.count_failed_playback {
                return CareOutcome::PlaybackFailed {
                    action: name.to_string(),
                    clip,
                };
            }
        } else {
            println!("[PLAY] {name} - {clip}");
        }

        let care = &self.config.care;
        let counted = match action.kind {
            ActionKind::Food => raise(&mut state.hunger, care.hunger_gain, care.max_hunger),
            ActionKind::Attention => raise(&mut state.attention, care.attention_gain, care.max_attention),
        };
        if counted {
            state.care_count += 1;
        }

        let leveled_up = self.check_level_up(state);

        CareOutcome::Cared {
            action: name.to_string(),
            clip,
            counted,
            leveled_up,
        }
    }

    /// Advance at most one level if every requirement of the next one holds.
    fn check_level_up(&self, state: &mut CareState) -> Option<u32> {
        let next_level = state.level + 1;
        let requirement = self.config.level_requirement(next_level)?;
        let care = &self.config.care;

        let ready = state.care_count >= requirement.care_count
            && f64::from(state.hunger) >= f64::from(care.max_hunger) * requirement.hunger_ratio
            && f64::from(state.attention) >= f64::from(care.max_attention) * requirement.attention_ratio;
        if !ready {
            return None;
        }

        state.level = next_level;
        self.play_logged(&requirement.clip);
        println!("Level up! Now level {next_level}");
        Some(next_level)
    }

    /// One decay step, possibly followed by hungry and lonely cues.
    pub fn decay_tick(&self) -> DecayOutcome {
        let care = &self.config.care;
        let (hungry, lonely) = {
            let mut state = lock(&self.state);
            state.hunger = state.hunger.saturating_sub(care.hunger_decay);
            state.attention = state.attention.saturating_sub(care.attention_decay);
            debug!("Decayed to hunger={} attention={}", state.hunger, state.attention);
            (
                state.hunger < care.hunger_alert_threshold,
                state.attention <= care.attention_alert_threshold,
            )
        };

        let (hungry_cue, lonely_cue) = {
            let mut rng = lock(&self.rng);
            (
                hungry && rng.gen_bool(care.alert_probability),
                lonely && rng.gen_bool(care.alert_probability),
            )
        };

        if hungry_cue {
            self.play_logged(&self.config.clips.hungry);
        }
        if lonely_cue {
            self.play_logged(&self.config.clips.lonely);
        }
        DecayOutcome { hungry_cue, lonely_cue }
    }

    fn play_logged(&self, clip: &str) {
        if let Err(e) = self.player.play(clip) {
            warn!("{e:#}");
        }
    }
}

/// Add `gain` to `stat`, capped at `max`. Returns whether the stat was below max.
fn raise(stat: &mut u32, gain: u32, max: u32) -> bool {
    if *stat >= max {
        return false;
    }
    *stat = stat.saturating_add(gain).min(max);
    true
}
