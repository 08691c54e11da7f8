//! rmsbridge Core - sample-buffer client, windowed RMS, and value-store publishing
//!
//! This library polls a continuously growing multichannel sample buffer,
//! reduces the most recent fixed-length window of each selected channel to
//! its root-mean-square energy, and republishes the results to a key-value
//! broadcast store at a configurable cadence.

pub mod config;
pub mod monitor;
pub mod poll;
pub mod processing;
pub mod source;
pub mod stats;
pub mod store;

pub use config::{ConfigError, FileConfig, Patch};
pub use monitor::{ChangeMonitor, Reporter};
pub use poll::{LoopState, PollLoop, RunError, Settings};
pub use processing::{
    channels::ChannelSpec, rms::RmsResult, window::AggregationState, window::SampleWindow,
};
pub use source::{fieldtrip::FieldTripClient, SampleMatrix, SampleSource, StreamMetadata};
pub use stats::store::StatsStore;
pub use store::{memory::MemoryStore, redis::RedisStore, ValueStore};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Interval between header requests while waiting for the producer to start
pub const HEADER_RETRY_INTERVAL_MS: u64 = 100;

/// Default FieldTrip buffer port
pub const DEFAULT_BUFFER_PORT: u16 = 1972;

/// Default Redis port
pub const DEFAULT_REDIS_PORT: u16 = 6379;
