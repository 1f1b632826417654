//! # Tag Source
//!
//! Turns a flaky NFC reader into a steady stream of tag observations.
//!
//! ## Architecture
//!
//! ```text
//! ReaderBackend ──▶ TagPoller::tick() ──▶ TagSource thread ──▶ on_tag(TagId)
//!   open/read/close     retry + reconnect      every scan interval
//! ```
//!
//! - [`ReaderBackend`] is the driver boundary: open a connection, read once
//!   with a bounded timeout, close.
//! - [`TagPoller`] owns the connection and implements one scan: reconnect
//!   when needed, retry failed reads, normalize the UID.
//! - [`TagSource`] runs the poller on a background thread and hands every
//!   tag to a callback, strictly one at a time.
//!
//! Hardware faults never escape this module. A scan that cannot read a tag
//! simply reports nothing, and the next scan starts over.

use crate::config::ReaderConfig;
use crate::sync::{join_with_timeout, lock, StopSignal};
use crate::tag::TagId;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

mod command;
mod simulated;

pub use command::{parse_uid, CommandReader};
pub use simulated::SimulatedReader;

/// Driver for a tag reader.
pub trait ReaderBackend: Send {
    /// A live connection to the device.
    type Handle: Send;

    fn open(&mut self) -> Result<Self::Handle>;

    fn close(&mut self, handle: Self::Handle);

    /// Wait up to `timeout` for a tag.
    ///
    /// Returns the raw UID bytes, or `None` when no tag entered the field.
    fn read_once(&mut self, handle: &mut Self::Handle, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Timing and retry policy of a [`TagPoller`].
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub read_timeout: Duration,
}

impl From<&ReaderConfig> for PollSettings {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// One reader connection plus its retry bookkeeping.
pub struct TagPoller<B: ReaderBackend> {
    backend: B,
    handle: Option<B::Handle>,
    retry_count: u32,
    settings: PollSettings,
}

impl<B: ReaderBackend> TagPoller<B> {
    pub fn new(backend: B, settings: PollSettings) -> Self {
        Self {
            backend,
            handle: None,
            retry_count: 0,
            settings,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open a connection unless one is already live.
    pub fn ensure_connection(&mut self) -> bool {
        if self.handle.is_some() {
            return true;
        }
        match self.backend.open() {
            Ok(handle) => {
                info!("NFC reader opened");
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                warn!("NFC reader unavailable: {e:#}");
                false
            }
        }
    }

    /// Close and forget the current connection, if any.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.close(handle);
            debug!("NFC reader closed");
        }
    }

    /// Run one scan.
    ///
    /// Failed reads are retried after a reconnect and a short backoff, up to
    /// `max_retries` times; then the scan gives up and reports no tag.
    pub fn tick(&mut self) -> Option<TagId> {
        if !self.ensure_connection() {
            return None;
        }

        loop {
            let Some(handle) = self.handle.as_mut() else {
                // The reconnect after a failed read did not succeed.
                self.retry_count = 0;
                return None;
            };

            match self.backend.read_once(handle, self.settings.read_timeout) {
                Ok(Some(raw)) => {
                    self.retry_count = 0;
                    let tag = TagId::from_bytes(&raw);
                    debug!("NFC read success: {tag}");
                    return Some(tag);
                }
                Ok(None) => return None,
                Err(e) => {
                    self.retry_count += 1;
                    warn!(
                        "NFC read failed ({}/{}): {e:#}",
                        self.retry_count, self.settings.max_retries
                    );
                    if self.retry_count > self.settings.max_retries {
                        self.retry_count = 0;
                        return None;
                    }
                    self.disconnect();
                    self.ensure_connection();
                    thread::sleep(self.settings.retry_backoff);
                }
            }
        }
    }
}

/// Background polling loop delivering tags to a callback.
pub struct TagSource<B: ReaderBackend + 'static> {
    poller: Arc<Mutex<TagPoller<B>>>,
    scan_interval: Duration,
    join_timeout: Duration,
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl<B: ReaderBackend + 'static> TagSource<B> {
    pub fn new(backend: B, config: &ReaderConfig, scan_interval: Duration) -> Self {
        Self::with_settings(backend, PollSettings::from(config), scan_interval, config.join_timeout())
    }

    pub fn with_settings(
        backend: B,
        settings: PollSettings,
        scan_interval: Duration,
        join_timeout: Duration,
    ) -> Self {
        Self {
            poller: Arc::new(Mutex::new(TagPoller::new(backend, settings))),
            scan_interval,
            join_timeout,
            stop: Arc::new(StopSignal::new()),
            thread: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Start polling. `on_tag` runs on the polling thread, one tag at a time.
    ///
    /// Calling `start` on a running source does nothing.
    pub fn start<F>(&mut self, mut on_tag: F) -> Result<()>
    where
        F: FnMut(TagId) + Send + 'static,
    {
        if self.thread.is_some() {
            return Ok(());
        }

        // Try the device early so a missing reader shows up in the log at startup.
        lock(&self.poller).ensure_connection();

        self.stop = Arc::new(StopSignal::new());
        let stop = Arc::clone(&self.stop);
        let poller = Arc::clone(&self.poller);
        let interval = self.scan_interval;

        let handle = thread::Builder::new()
            .name("tag-source".to_string())
            .spawn(move || {
                while stop.wait(interval) {
                    let tag = lock(&poller).tick();
                    if let Some(tag) = tag {
                        on_tag(tag);
                    }
                }
                debug!("Tag polling loop exited");
            })
            .context("Failed to spawn tag polling thread")?;

        self.thread = Some(handle);
        info!("NFC reader polling every {interval:?}");
        Ok(())
    }

    /// Stop polling and release the reader.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.thread.take() {
            join_with_timeout(handle, self.join_timeout, "tag-source");
        }
        lock(&self.poller).disconnect();
        info!("NFC reader stopped");
    }
}

impl<B: ReaderBackend + 'static> Drop for TagSource<B> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wait_until;
    use anyhow::bail;
    use std::collections::VecDeque;

    /// What the scripted backend does on its next call.
    #[derive(Debug, Clone)]
    enum Step {
        Tag(Vec<u8>),
        Nothing,
        Fail,
    }

    #[derive(Debug, Default)]
    struct Script {
        open_failures: u32,
        reads: VecDeque<Step>,
        opens: u32,
        closes: u32,
        read_calls: u32,
    }

    #[derive(Debug, Clone, Default)]
    struct ScriptedReader(Arc<Mutex<Script>>);

    impl ScriptedReader {
        fn with_reads(reads: impl IntoIterator<Item = Step>) -> Self {
            let reader = Self::default();
            lock(&reader.0).reads = reads.into_iter().collect();
            reader
        }

        fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            lock(&self.0)
        }
    }

    impl ReaderBackend for ScriptedReader {
        type Handle = ();

        fn open(&mut self) -> Result<()> {
            let mut script = self.script();
            if script.open_failures > 0 {
                script.open_failures -= 1;
                bail!("no device");
            }
            script.opens += 1;
            Ok(())
        }

        fn close(&mut self, _handle: ()) {
            self.script().closes += 1;
        }

        fn read_once(&mut self, _handle: &mut (), _timeout: Duration) -> Result<Option<Vec<u8>>> {
            let mut script = self.script();
            script.read_calls += 1;
            match script.reads.pop_front().unwrap_or(Step::Nothing) {
                Step::Tag(bytes) => Ok(Some(bytes)),
                Step::Nothing => Ok(None),
                Step::Fail => bail!("read error"),
            }
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            max_retries: 3,
            retry_backoff: Duration::from_millis(1),
            read_timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_tick_normalizes_tag() {
        let reader = ScriptedReader::with_reads([Step::Tag(vec![0x04, 0xd8, 0x97])]);
        let mut poller = TagPoller::new(reader, settings());

        assert_eq!(poller.tick(), Some(TagId::parse("04:D8:97").unwrap()));
        assert_eq!(poller.tick(), None);
    }

    #[test]
    fn test_tick_recovers_after_failed_read() {
        let reader = ScriptedReader::with_reads([Step::Fail, Step::Fail, Step::Tag(vec![0xab])]);
        let mut poller = TagPoller::new(reader.clone(), settings());

        assert_eq!(poller.tick(), Some(TagId::from_bytes(&[0xab])));
        let script = reader.script();
        assert_eq!(script.read_calls, 3);
        // Every failure closes the connection and opens a fresh one.
        assert_eq!(script.closes, 2);
        assert_eq!(script.opens, 3);
    }

    #[test]
    fn test_tick_gives_up_after_max_retries() {
        let reader = ScriptedReader::with_reads(vec![Step::Fail; 10]);
        let mut poller = TagPoller::new(reader.clone(), settings());

        assert_eq!(poller.tick(), None);
        // The first read plus three retries.
        assert_eq!(reader.script().read_calls, 4);
        assert_eq!(poller.retry_count, 0);

        // The next scan gets a fresh budget.
        assert_eq!(poller.tick(), None);
        assert_eq!(reader.script().read_calls, 8);
    }

    #[test]
    fn test_tick_survives_open_failures() {
        let reader = ScriptedReader::with_reads([Step::Tag(vec![0x01, 0x02])]);
        reader.script().open_failures = 3;
        let mut poller = TagPoller::new(reader.clone(), settings());

        for _ in 0..3 {
            assert_eq!(poller.tick(), None);
            assert!(!poller.is_connected());
        }
        assert_eq!(reader.script().read_calls, 0);

        assert_eq!(poller.tick(), Some(TagId::from_bytes(&[0x01, 0x02])));
        assert!(poller.is_connected());
    }

    #[test]
    fn test_tick_ends_scan_when_reconnect_fails() {
        let reader = ScriptedReader::with_reads([Step::Fail, Step::Tag(vec![0x07])]);
        let mut poller = TagPoller::new(reader.clone(), settings());
        assert!(poller.ensure_connection());
        reader.script().open_failures = 1;

        assert_eq!(poller.tick(), None);
        assert_eq!(poller.retry_count, 0);
        assert_eq!(poller.tick(), Some(TagId::from_bytes(&[0x07])));
    }

    #[test]
    fn test_source_delivers_tags_in_order() {
        let reader = ScriptedReader::with_reads([
            Step::Tag(vec![0x01]),
            Step::Nothing,
            Step::Fail,
            Step::Tag(vec![0x02]),
        ]);
        let mut source =
            TagSource::with_settings(reader, settings(), Duration::from_millis(2), Duration::from_secs(1));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        source.start(move |tag| lock(&sink).push(tag)).unwrap();
        assert!(source.is_running());

        assert!(wait_until(|| lock(&seen).len() == 2));
        source.stop();
        assert!(!source.is_running());

        let seen = lock(&seen);
        assert_eq!(*seen, vec![TagId::from_bytes(&[0x01]), TagId::from_bytes(&[0x02])]);
    }

    #[test]
    fn test_stop_releases_connection() {
        let reader = ScriptedReader::default();
        let mut source = TagSource::with_settings(
            reader.clone(),
            settings(),
            Duration::from_millis(2),
            Duration::from_secs(1),
        );
        source.start(|_| {}).unwrap();
        assert!(wait_until(|| reader.script().read_calls > 0));

        source.stop();
        let script = reader.script();
        assert_eq!(script.opens, script.closes);
    }
}
