//! Poll loop
//!
//! Drives the whole pipeline:
//!
//! ```text
//! Init -> Connecting -> AwaitingMetadata -> Running -> Terminated(reason)
//! ```
//!
//! Each running cycle sleeps for `general.delay`, fetches the latest window,
//! reduces it to RMS, and publishes one value per channel. Every failure is
//! terminal; there is no reconnection.

use crate::config::{ConfigError, Patch};
use crate::monitor::Reporter;
use crate::processing::channels::{channel_map, check_against_stream, ChannelSpec};
use crate::processing::rms::RmsResult;
use crate::processing::window::{window_length, FetchError, WindowFetcher};
use crate::source::{SampleSource, SourceError, StreamMetadata};
use crate::stats::store::StatsStore;
use crate::store::{StoreError, ValueStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Longest uninterrupted sleep; bounds how long an interrupt goes unnoticed
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Terminal conditions of a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot connect to value store: {0}")]
    StoreConnection(StoreError),

    #[error("Cannot connect to sample buffer: {0}")]
    Connection(SourceError),

    #[error("Timeout after {timeout:?} while waiting for the buffer header")]
    HeaderTimeout { timeout: Duration },

    #[error("Buffer reset detected: newest sample {newest} precedes last processed sample {last_end}")]
    BufferReset { newest: i64, last_end: i64 },

    #[error("Sample buffer failed: {0}")]
    Source(String),

    #[error("Publishing failed: {0}")]
    Publish(StoreError),

    #[error("Interrupted")]
    Interrupted,
}

impl RunError {
    /// Process exit code for this condition
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::StoreConnection(_) => 3,
            Self::Connection(_) => 4,
            Self::HeaderTimeout { .. } => 5,
            Self::BufferReset { .. } => 6,
            Self::Source(_) => 7,
            Self::Publish(_) => 8,
            Self::Interrupted => 130,
        }
    }
}

impl From<FetchError> for RunError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::BufferReset { newest, last_end } => Self::BufferReset { newest, last_end },
            other => Self::Source(other.to_string()),
        }
    }
}

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Connecting,
    AwaitingMetadata,
    Running,
    Terminated,
}

/// Startup settings resolved from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Buffer host name
    pub host: String,
    /// Buffer port
    pub port: u16,
    /// Overall limit for the header handshake
    pub timeout: Duration,
    /// Window length in seconds
    pub window_seconds: f64,
    /// Output key prefix
    pub prefix: String,
    /// Selected channels in publish order
    pub channels: Vec<ChannelSpec>,
}

impl Settings {
    /// Resolve every startup setting once
    pub fn from_patch<V: ValueStore>(patch: &mut Patch<V>) -> Result<Self, ConfigError> {
        let host = patch.get_string("fieldtrip", "hostname", Some("localhost"))?;
        let port = patch.get_int(
            "fieldtrip",
            "port",
            Some(i64::from(crate::DEFAULT_BUFFER_PORT)),
        )?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            section: "fieldtrip".into(),
            key: "port".into(),
            message: format!("{port} is not a valid port"),
        })?;

        let timeout = patch.get_float("fieldtrip", "timeout", None)?;
        let timeout = Duration::try_from_secs_f64(timeout).map_err(|_| ConfigError::Invalid {
            section: "fieldtrip".into(),
            key: "timeout".into(),
            message: format!("{timeout} is not a valid number of seconds"),
        })?;

        let mut entries = Vec::new();
        for name in patch.keys("input") {
            let number = patch.get_int("input", &name, None)?;
            entries.push((name, number));
        }
        let channels = channel_map(entries)?;

        Ok(Self {
            host,
            port,
            timeout,
            window_seconds: patch.get_float("processing", "window", None)?,
            prefix: patch.get_string("output", "prefix", None)?,
            channels,
        })
    }
}

/// Poll the buffer until it reports a header or `timeout` elapses
pub fn wait_for_header<S: SampleSource + ?Sized>(
    source: &mut S,
    timeout: Duration,
    retry: Duration,
) -> Result<StreamMetadata, RunError> {
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            return Err(RunError::HeaderTimeout { timeout });
        }
        if let Some(hdr) = source.header().map_err(RunError::Connection)? {
            info!(
                sample_rate = hdr.sample_rate,
                channels = hdr.channel_count(),
                samples = hdr.sample_count,
                "Data arrived"
            );
            debug!(labels = ?hdr.channel_labels, "Buffer channels");
            return Ok(hdr);
        }
        debug!("Waiting for data to arrive");
        std::thread::sleep(retry);
    }
}

/// Outcome of a single cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Cycle {
    /// Not enough samples yet
    Skipped,
    /// Values were published
    Published(RmsResult),
}

/// The running phase of the loop
pub struct PollLoop<S, V, R> {
    source: S,
    patch: Patch<V>,
    reporter: R,
    fetcher: WindowFetcher,
    prefix: String,
    metadata: StreamMetadata,
    stats: StatsStore,
    state: LoopState,
}

impl<S, V, R> PollLoop<S, V, R>
where
    S: SampleSource,
    V: ValueStore,
    R: Reporter,
{
    /// Wait for the buffer header, size the window, and enter the running state
    pub fn start(
        mut source: S,
        patch: Patch<V>,
        reporter: R,
        settings: Settings,
    ) -> Result<Self, RunError> {
        let retry = Duration::from_millis(crate::HEADER_RETRY_INTERVAL_MS);
        let metadata = wait_for_header(&mut source, settings.timeout, retry)?;

        let window_samples = window_length(settings.window_seconds, metadata.sample_rate)?;
        check_against_stream(&settings.channels, &metadata)?;
        info!(
            window_samples,
            window_seconds = settings.window_seconds,
            channels = settings.channels.len(),
            "Window configured"
        );

        let mut stats = StatsStore::new();
        stats.set_stream(window_samples, metadata.sample_rate);

        Ok(Self {
            source,
            patch,
            reporter,
            fetcher: WindowFetcher::new(window_samples, settings.channels),
            prefix: settings.prefix,
            metadata,
            stats,
            state: LoopState::Running,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Window length in samples
    pub fn window_samples(&self) -> usize {
        self.fetcher.state().window_samples
    }

    /// Metadata seen at the handshake
    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    pub fn patch(&self) -> &Patch<V> {
        &self.patch
    }

    /// Output key for a channel
    pub fn key_for(&self, channel: &str) -> String {
        format!("{}.{}", self.prefix, channel)
    }

    /// One fetch, reduce, publish step without the leading sleep
    pub fn cycle(&mut self) -> Result<Cycle, RunError> {
        let window = match self.fetcher.fetch(&mut self.source)? {
            Some(w) => w,
            None => {
                self.stats.record_skip();
                return Ok(Cycle::Skipped);
            }
        };

        let result = RmsResult::compute(self.fetcher.channels(), &window);
        debug!(rms = ?result.values(), "Computed RMS");

        for (name, value) in result.values() {
            let key = self.key_for(name);
            self.patch
                .set_value(&key, *value)
                .map_err(RunError::Publish)?;
            self.reporter.record(&key, *value);
        }

        self.stats
            .record_cycle(&result, self.fetcher.state().last_end_sample);
        Ok(Cycle::Published(result))
    }

    /// Sleep for the current `general.delay`, waking early on interrupt
    fn pause(&mut self, running: &AtomicBool) -> Result<(), RunError> {
        let delay = self.patch.get_float("general", "delay", None)?;
        let delay = Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(Duration::ZERO);

        let deadline = Instant::now() + delay;
        loop {
            if !running.load(Ordering::SeqCst) {
                return Err(RunError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Cycle until a terminal condition occurs, and return it
    pub fn run(&mut self, running: &AtomicBool) -> RunError {
        let reason = loop {
            self.reporter.tick();
            if let Err(e) = self.pause(running) {
                break e;
            }
            if let Err(e) = self.cycle() {
                break e;
            }
        };

        self.state = LoopState::Terminated;
        match &reason {
            RunError::Interrupted => warn!("Loop interrupted"),
            other => error!(error = %other, "Loop terminated"),
        }
        reason
    }
}

/// Run the full lifecycle: connect, handshake, then cycle until termination
///
/// `connect` opens the buffer connection; it is called exactly once.
pub fn run<S, F, V, R>(
    settings: Settings,
    connect: F,
    patch: Patch<V>,
    reporter: R,
    running: &AtomicBool,
) -> (RunError, Option<StatsStore>)
where
    S: SampleSource,
    F: FnOnce(&str, u16) -> Result<S, SourceError>,
    V: ValueStore,
    R: Reporter,
{
    transition(LoopState::Init, LoopState::Connecting);
    let source = match connect(&settings.host, settings.port) {
        Ok(s) => s,
        Err(e) => {
            transition(LoopState::Connecting, LoopState::Terminated);
            return (RunError::Connection(e), None);
        }
    };

    transition(LoopState::Connecting, LoopState::AwaitingMetadata);
    let mut poll = match PollLoop::start(source, patch, reporter, settings) {
        Ok(p) => p,
        Err(e) => {
            transition(LoopState::AwaitingMetadata, LoopState::Terminated);
            return (e, None);
        }
    };

    transition(LoopState::AwaitingMetadata, poll.state());
    let reason = poll.run(running);
    transition(LoopState::Running, poll.state());
    (reason, Some(poll.stats))
}

fn transition(from: LoopState, to: LoopState) {
    debug!(?from, ?to, "Loop state");
}
