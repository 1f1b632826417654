//! Low-voltage watch for the Raspberry Pi power supply.
//!
//! The firmware reports under-voltage through `vcgencmd get_throttled`:
//!
//! ```text
//! throttled=0x50005
//! ```
//!
//! Bit 0 is set while the supply voltage is currently too low.

use crate::config::BatteryConfig;
use crate::playback::PlaybackEngine;
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

const UNDER_VOLTAGE_NOW: u32 = 0x1;

pub trait VoltageProbe: Send {
    fn is_low_voltage(&mut self) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct VcgencmdProbe {
    program: String,
    args: Vec<String>,
}

impl VcgencmdProbe {
    pub fn new(config: &BatteryConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }
}

impl VoltageProbe for VcgencmdProbe {
    fn is_low_voltage(&mut self) -> Result<bool> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run `{}`", self.program))?;

        if !output.status.success() {
            bail!("{} exited with {}", self.program, output.status);
        }
        let flags = parse_throttled(&String::from_utf8_lossy(&output.stdout))?;
        Ok(flags & UNDER_VOLTAGE_NOW != 0)
    }
}

/// Parse the flag word out of `throttled=0x...`.
pub fn parse_throttled(output: &str) -> Result<u32> {
    let value = output
        .trim()
        .strip_prefix("throttled=")
        .with_context(|| format!("Unexpected get_throttled output: {}", output.trim()))?;
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(hex, 16).with_context(|| format!("Bad throttled value `{value}`"))
}

/// Rate-limited low-voltage alerts.
pub struct BatteryMonitor<P> {
    probe: P,
    player: Arc<PlaybackEngine>,
    alert_clip: Option<String>,
    cooldown: Duration,
    last_alert: Option<Instant>,
}

impl<P: VoltageProbe> BatteryMonitor<P> {
    pub fn new(probe: P, player: Arc<PlaybackEngine>, config: &BatteryConfig) -> Self {
        Self {
            probe,
            player,
            alert_clip: config.alert_clip.clone(),
            cooldown: config.alert_cooldown(),
            last_alert: None,
        }
    }

    /// Probe once. Returns whether an alert was raised.
    ///
    /// A probe failure is logged and treated as "voltage fine".
    pub fn check(&mut self, now: Instant) -> bool {
        let low = match self.probe.is_low_voltage() {
            Ok(low) => low,
            Err(e) => {
                debug!("Voltage probe failed: {e:#}");
                return false;
            }
        };
        if !low {
            return false;
        }

        if let Some(last) = self.last_alert {
            if now.saturating_duration_since(last) <= self.cooldown {
                return false;
            }
        }
        self.last_alert = Some(now);

        warn!("Low voltage detected");
        if let Some(clip) = &self.alert_clip {
            if let Err(e) = self.player.play(clip) {
                warn!("{e:#}");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{clip_dir, MockAudio};
    use std::collections::VecDeque;

    struct FixedProbe(VecDeque<Result<bool>>);

    impl VoltageProbe for FixedProbe {
        fn is_low_voltage(&mut self) -> Result<bool> {
            self.0.pop_front().unwrap_or(Ok(false))
        }
    }

    type Fixture = (BatteryMonitor<FixedProbe>, Arc<PlaybackEngine>, tempfile::TempDir);

    fn monitor(readings: Vec<Result<bool>>, alert_clip: Option<&str>) -> Fixture {
        let (dir, _) = clip_dir(&["system/battery_low.wav"]);
        let player = Arc::new(PlaybackEngine::new(
            Box::new(MockAudio::new()),
            dir.path(),
            Duration::from_millis(5),
            Duration::from_millis(500),
        ));
        let config = BatteryConfig {
            alert_cooldown_secs: 60.0,
            alert_clip: alert_clip.map(str::to_string),
            ..BatteryConfig::default()
        };
        let monitor = BatteryMonitor::new(FixedProbe(readings.into()), Arc::clone(&player), &config);
        (monitor, player, dir)
    }

    #[test]
    fn test_parse_throttled() {
        assert_eq!(parse_throttled("throttled=0x50005\n").unwrap(), 0x50005);
        assert_eq!(parse_throttled("throttled=0x0").unwrap(), 0);
        assert!(parse_throttled("voltage=1.2V").is_err());
        assert!(parse_throttled("throttled=0xzz").is_err());
    }

    #[test]
    fn test_alerts_respect_cooldown() {
        let (mut monitor, _player, _dir) = monitor(vec![Ok(true), Ok(true), Ok(true)], None);
        let start = Instant::now();

        assert!(monitor.check(start));
        assert!(!monitor.check(start + Duration::from_secs(30)));
        assert!(monitor.check(start + Duration::from_secs(61)));
    }

    #[test]
    fn test_healthy_and_failed_probes_never_alert() {
        let readings = vec![Ok(false), Err(anyhow::anyhow!("no vcgencmd"))];
        let (mut monitor, player, _dir) = monitor(readings, Some("system/battery_low.wav"));
        let now = Instant::now();

        assert!(!monitor.check(now));
        assert!(!monitor.check(now));
        assert!(player.history().is_empty());
    }

    #[test]
    fn test_alert_plays_configured_clip() {
        let (mut monitor, player, _dir) = monitor(vec![Ok(true)], Some("system/battery_low.wav"));
        assert!(monitor.check(Instant::now()));
        assert_eq!(player.last_played().as_deref(), Some("system/battery_low.wav"));
    }

    #[test]
    fn test_alert_without_clip_stays_silent() {
        let (mut monitor, player, _dir) = monitor(vec![Ok(true)], None);
        assert!(monitor.check(Instant::now()));
        assert!(player.history().is_empty());
    }
}
