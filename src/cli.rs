//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `plushcare` binary.
//!
//! ## Commands
//!
//! - `run`: wake the toy and keep it running until Ctrl-C
//! - `config`: print the effective configuration
//! - `check-assets`: verify every referenced clip exists
//! - `completion`: generate a shell completion script
//!
//! ## Examples
//!
//! ```bash
//! plushcare run
//! plushcare --simulate --silent run
//! plushcare --audio-dir /srv/toy/audio check-assets
//! plushcare config --json > ~/.config/plushcare/config.json
//! ```

use crate::config::{AudioKind, Config, ReaderKind};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Main application arguments structure.
///
/// Global options override the loaded configuration before any command runs.
#[derive(Parser, Debug)]
#[command(name = "plushcare")]
#[command(about = "plushcare: an NFC-driven talking plush toy")]
#[command(version)]
pub struct Args {
    /// Configuration file (JSON)
    ///
    /// Defaults to `config.json` in the platform config directory, falling
    /// back to built-in defaults when that file does not exist.
    #[arg(long, global = true, env = "PLUSHCARE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory containing the audio clips
    #[arg(long, global = true)]
    pub audio_dir: Option<PathBuf>,

    /// Output volume between 0.0 and 1.0
    #[arg(long, global = true)]
    pub volume: Option<f32>,

    /// Use a simulated NFC reader instead of libnfc
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Do not produce sound; clips "play" for a fixed time
    #[arg(long, global = true)]
    pub silent: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Fold command-line overrides into `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.audio_dir {
            config.audio_dir = dir.clone();
        }
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        if self.simulate {
            config.reader.backend = ReaderKind::Simulated;
        }
        if self.silent {
            config.audio.backend = AudioKind::Silent;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wake the toy up
    ///
    /// Plays the power-on clip, then listens for tags, decays stats and
    /// prints status lines until interrupted with Ctrl-C or SIGTERM.
    Run,

    /// Show the effective configuration
    Config {
        /// Print the full configuration as JSON
        ///
        /// The output is a valid configuration file and a good starting point
        /// for customizing the toy.
        #[arg(long)]
        json: bool,
    },

    /// Check that every configured clip exists in the audio directory
    ///
    /// Exits with an error when any clip is missing.
    CheckAssets,

    /// Generate shell completions
    ///
    /// ```bash
    /// plushcare completion bash > ~/.local/share/bash-completion/completions/plushcare
    /// plushcare completion fish > ~/.config/fish/completions/plushcare.fish
    /// ```
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_options_after_subcommand() {
        let args = Args::try_parse_from(["plushcare", "run", "--simulate", "--volume", "0.3"]).unwrap();
        assert!(matches!(args.command, Command::Run));
        assert!(args.simulate);
        assert_eq!(args.volume, Some(0.3));
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let args = Args::try_parse_from([
            "plushcare",
            "--audio-dir",
            "/tmp/clips",
            "--silent",
            "--simulate",
            "check-assets",
        ])
        .unwrap();
        let mut config = Config::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.audio_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.audio.backend, AudioKind::Silent);
        assert_eq!(config.reader.backend, ReaderKind::Simulated);
        assert_eq!(config.volume, 1.0);
    }

    #[test]
    fn test_config_json_flag() {
        let args = Args::try_parse_from(["plushcare", "config", "--json"]).unwrap();
        assert!(matches!(args.command, Command::Config { json: true }));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Args::try_parse_from(["plushcare"]).is_err());
    }
}
