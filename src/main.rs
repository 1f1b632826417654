//! # plushcare
//!
//! A talking plush toy: NFC tags stand for food and toys, the toy answers
//! with voice clips and keeps track of how well it is cared for.
//!
//! ## Usage
//!
//! ```bash
//! # Run on the toy hardware
//! plushcare run
//!
//! # Desk test without a reader or speakers
//! RUST_LOG=debug plushcare --simulate --silent run
//!
//! # Verify the audio directory
//! plushcare check-assets
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use plushcare::config::{Config, ReaderKind};
use plushcare::reader::{CommandReader, SimulatedReader};
use plushcare::{cli, completion, daemon};
use std::sync::Arc;

/// Initializes logging, resolves configuration and routes the subcommand.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug plushcare run` - every read and clip
/// - `RUST_LOG=plushcare::reader=debug plushcare run` - reader detail only
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    if let cli::Command::Completion { shell } = args.command {
        let mut cmd = cli::Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let config = load_config(&args)?;

    match args.command {
        cli::Command::Run => {
            let config = Arc::new(config);
            match config.reader.backend {
                ReaderKind::Command => {
                    let reader = CommandReader::new(&config.reader);
                    daemon::run(config, reader)?;
                }
                ReaderKind::Simulated => {
                    info!("Using simulated NFC reader");
                    let reader = SimulatedReader::new(config.registered_tags(), config.reader.simulate_hit_rate);
                    daemon::run(config, reader)?;
                }
            }
        }
        cli::Command::Config { json } => {
            if json {
                let text = serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
                println!("{text}");
            } else {
                println!("{}", config.summary());
            }
        }
        cli::Command::CheckAssets => {
            let clips = config.all_clips();
            let missing = config.missing_clips();
            for clip in &missing {
                println!("missing: {clip}");
            }
            println!(
                "{} of {} clips present in {}",
                clips.len() - missing.len(),
                clips.len(),
                config.audio_dir.display()
            );
            if !missing.is_empty() {
                bail!("{} audio clips are missing", missing.len());
            }
        }
        cli::Command::Completion { .. } => {}
    }

    Ok(())
}

/// Load the configuration file and apply command-line overrides.
fn load_config(args: &cli::Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid command-line override")?;
    config.resolve_audio_dir()?;
    debug!("Audio directory: {}", config.audio_dir.display());
    Ok(config)
}
