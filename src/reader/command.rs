//! Reader backend built on the libnfc command-line tools.
//!
//! `nfc-scan-device` tells whether a reader is attached; `nfc-list` reports
//! the tag currently in the field:
//!
//! ```text
//! ISO/IEC 14443A (106 kbps) target:
//!     ATQA (SENS_RES): 00  44
//!        UID (NFCID1): 04  1e  72  12  bd  2a  81
//!       SAK (SEL_RES): 00
//! ```

use super::ReaderBackend;
use crate::config::ReaderConfig;
use anyhow::{bail, Context, Result};
use log::debug;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Connection token; the tools open the device themselves on every call.
#[derive(Debug)]
pub struct CommandHandle {
    opened_at: Instant,
}

#[derive(Debug, Clone)]
pub struct CommandReader {
    probe_program: String,
    probe_args: Vec<String>,
    read_program: String,
    read_args: Vec<String>,
}

impl CommandReader {
    pub fn new(config: &ReaderConfig) -> Self {
        Self {
            probe_program: config.probe_program.clone(),
            probe_args: config.probe_args.clone(),
            read_program: config.read_program.clone(),
            read_args: config.read_args.clone(),
        }
    }
}

impl ReaderBackend for CommandReader {
    type Handle = CommandHandle;

    fn open(&mut self) -> Result<CommandHandle> {
        let output = Command::new(&self.probe_program)
            .args(&self.probe_args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run `{}`. Is libnfc installed?", self.probe_program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} found no reader: {}", self.probe_program, stderr.trim());
        }
        Ok(CommandHandle {
            opened_at: Instant::now(),
        })
    }

    fn close(&mut self, handle: CommandHandle) {
        debug!("Releasing reader held for {:?}", handle.opened_at.elapsed());
    }

    fn read_once(&mut self, _handle: &mut CommandHandle, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut child = Command::new(&self.read_program)
            .args(&self.read_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run `{}`", self.read_program))?;

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait().context("Failed to poll reader process")? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                debug!("{} timed out after {timeout:?}", self.read_program);
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(10));
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout)
                .context("Failed to read reader output")?;
        }

        if !status.success() {
            bail!("{} exited with {status}", self.read_program);
        }
        parse_uid(&stdout)
    }
}

/// Extract the UID bytes from `nfc-list` output.
///
/// No `UID` line means no tag in the field.
pub fn parse_uid(output: &str) -> Result<Option<Vec<u8>>> {
    let Some(line) = output.lines().find(|line| line.trim_start().starts_with("UID")) else {
        return Ok(None);
    };
    let (_, hex) = line
        .split_once(':')
        .with_context(|| format!("Malformed UID line: {line}"))?;

    let bytes = hex
        .split_whitespace()
        .map(|byte| u8::from_str_radix(byte, 16).with_context(|| format!("Bad UID byte `{byte}`")))
        .collect::<Result<Vec<u8>>>()?;

    if bytes.is_empty() {
        bail!("Empty UID in line: {line}");
    }
    Ok(Some(bytes))
}
