//! Time-series data storage for statistics
//!
//! Stores recent RMS measurements per channel with automatic cleanup of old
//! data, plus running statistics for the end-of-run summary.

use crate::processing::rms::RmsResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Maximum number of data points to keep per channel
const MAX_HISTORY_SIZE: usize = 3600; // 6 minutes at 10 cycles/sec

/// A single measurement point
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    /// Timestamp of the measurement
    pub timestamp: DateTime<Utc>,
    /// Value of the measurement
    pub value: f64,
}

/// Running statistics for one channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    /// Most recent RMS
    pub current: f64,
    /// Minimum RMS observed
    pub min: f64,
    /// Maximum RMS observed
    pub max: f64,
    /// Mean over the retained history
    pub mean: f64,
    /// Number of values recorded
    pub count: u64,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            current: 0.0,
            min: f64::MAX,
            max: 0.0,
            mean: 0.0,
            count: 0,
        }
    }
}

/// Run-level counters
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunningStats {
    /// Cycles that published a result
    pub cycles_published: u64,
    /// Cycles skipped for lack of data
    pub cycles_skipped: u64,
    /// Window length in samples
    pub window_samples: usize,
    /// Sample rate reported by the buffer
    pub sample_rate: f64,
    /// Last sample of the most recent processed window
    pub last_end_sample: i64,
    /// When the loop entered the running state
    pub started_at: Option<DateTime<Utc>>,
}

/// Snapshot written at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub run: RunningStats,
    /// Channels in publish order
    pub channels: Vec<(String, ChannelStats)>,
}

/// Statistics store for time-series data
#[derive(Debug)]
pub struct StatsStore {
    /// RMS history per channel
    history: HashMap<String, VecDeque<Measurement>>,
    /// Running statistics per channel
    channel_stats: HashMap<String, ChannelStats>,
    /// Channel names in first-seen order
    order: Vec<String>,
    /// Maximum history size
    max_size: usize,
    /// Running statistics
    stats: RunningStats,
}

impl StatsStore {
    /// Create a new statistics store
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_SIZE)
    }

    /// Create a store that keeps at most `max_size` points per channel
    fn with_capacity(max_size: usize) -> Self {
        Self {
            history: HashMap::new(),
            channel_stats: HashMap::new(),
            order: Vec::new(),
            max_size: max_size.max(1),
            stats: RunningStats {
                last_end_sample: -1,
                ..Default::default()
            },
        }
    }

    /// Note the stream parameters once the loop is running
    pub fn set_stream(&mut self, window_samples: usize, sample_rate: f64) {
        self.stats.window_samples = window_samples;
        self.stats.sample_rate = sample_rate;
        self.stats.started_at = Some(Utc::now());
    }

    /// Record a published cycle
    ///
    /// # Arguments
    /// * `result` - RMS values in publish order
    /// * `end_sample` - Last sample of the window they were computed from
    pub fn record_cycle(&mut self, result: &RmsResult, end_sample: i64) {
        let now = Utc::now();
        for (name, value) in result.values() {
            self.record_value(name, *value, now);
        }
        self.stats.cycles_published += 1;
        self.stats.last_end_sample = end_sample;
    }

    /// Record a cycle skipped for insufficient data
    pub fn record_skip(&mut self) {
        self.stats.cycles_skipped += 1;
    }

    fn record_value(&mut self, name: &str, value: f64, timestamp: DateTime<Utc>) {
        if !self.history.contains_key(name) {
            self.order.push(name.to_string());
        }
        let max_size = self.max_size;
        let history = self
            .history
            .entry(name.to_string())
            .or_insert_with(|| VecDeque::with_capacity(max_size.min(MAX_HISTORY_SIZE)));

        // Update history
        if history.len() >= max_size {
            history.pop_front();
        }
        history.push_back(Measurement { timestamp, value });

        // Update running stats
        let stats = self.channel_stats.entry(name.to_string()).or_default();
        stats.current = value;
        stats.min = stats.min.min(value);
        stats.max = stats.max.max(value);
        stats.count += 1;

        // Recalculate mean over retained history
        let sum: f64 = history.iter().map(|m| m.value).sum();
        stats.mean = sum / history.len() as f64;
    }

    /// Running statistics for one channel
    pub fn channel(&self, name: &str) -> Option<&ChannelStats> {
        self.channel_stats.get(name)
    }

    /// Get run-level statistics
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Snapshot of everything recorded so far
    pub fn summary(&self) -> Summary {
        Summary {
            run: self.stats.clone(),
            channels: self
                .order
                .iter()
                .filter_map(|n| self.channel_stats.get(n).map(|s| (n.clone(), s.clone())))
                .collect(),
        }
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}
