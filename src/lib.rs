//! rmsbridge - sliding-window RMS of a sample buffer, republished to a value store
//!
//! This library re-exports the sample-buffer client, windowed aggregation,
//! and value-store publishing from `rmsbridge-core`.

pub use rmsbridge_core::{config, monitor, poll, processing, source, stats, store};

pub use rmsbridge_core::{
    ChangeMonitor, ChannelSpec, FieldTripClient, FileConfig, MemoryStore, Patch, PollLoop,
    RedisStore, Reporter, RmsResult, RunError, SampleMatrix, SampleSource, SampleWindow,
    Settings, StatsStore, StreamMetadata, ValueStore,
};
pub use rmsbridge_core::{DEFAULT_BUFFER_PORT, DEFAULT_REDIS_PORT, HEADER_RETRY_INTERVAL_MS, VERSION};
