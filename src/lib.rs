//! Software for a talking plush toy that is cared for with NFC tags.
//!
//! Each tag stands for a care action (food, a toy, a song). Scanning it makes
//! the toy answer with a voice clip and raises its hunger or attention;
//! both stats decay over time, and enough care makes the toy level up.
//!
//! Core modules:
//! - [`care`] - Care state machine (stats, clip choice, levels)
//! - [`reader`] - NFC polling with retry and reconnect
//! - [`playback`] - Single-slot clip player with completion detection
//! - [`daemon`] - Background workers and shutdown cascade
//!
//! ### Supporting Modules
//!
//! - [`config`] - Tag, clip and tuning tables loaded once at startup
//! - [`audio`] - Audio output backends
//! - [`battery`] - Low-voltage alerts
//! - [`tag`] - Normalized tag identifiers
//! - [`sync`] - Stop signals and bounded joins
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use plushcare::care::CareEngine;
//! use plushcare::config::Config;
//! use plushcare::daemon::build_player;
//! use plushcare::tag::TagId;
//! use std::sync::Arc;
//!
//! let config = Arc::new(Config::load(None)?);
//! let player = build_player(&config);
//! let engine = CareEngine::new(Arc::clone(&config), player);
//!
//! let outcome = engine.on_tag_read(&TagId::parse("04:D8:97:12:BD:2A:81")?);
//! println!("{outcome:?} -> {}", engine.status());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Only configuration problems are fatal, and they surface before any thread
//! starts. Reader faults are retried inside [`reader`]; missing clips and
//! audio failures are logged and the toy carries on.

pub mod audio;
pub mod battery;
pub mod care;
pub mod cli;
pub mod completion;
pub mod config;
pub mod daemon;
pub mod playback;
pub mod reader;
pub mod sync;
pub mod tag;

#[cfg(test)]
mod test_support;
