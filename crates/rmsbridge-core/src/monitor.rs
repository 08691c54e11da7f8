//! Change reporting
//!
//! A [`Reporter`] is told about every value the loop produces. The default
//! [`ChangeMonitor`] only logs values that differ from the previous one seen
//! for the same key, and periodically logs how fast the loop is cycling.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How often [`ChangeMonitor::tick`] reports loop throughput
const THROUGHPUT_INTERVAL: Duration = Duration::from_secs(10);

/// Sink for values produced by the loop
pub trait Reporter {
    /// A value was produced for `key`
    fn record(&mut self, key: &str, value: f64);

    /// One loop iteration started
    fn tick(&mut self) {}
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn record(&mut self, key: &str, value: f64) {
        (**self).record(key, value)
    }

    fn tick(&mut self) {
        (**self).tick()
    }
}

/// Logs values only when they change
#[derive(Debug)]
pub struct ChangeMonitor {
    last: HashMap<String, f64>,
    loops: u64,
    window_start: Instant,
}

impl ChangeMonitor {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
            loops: 0,
            window_start: Instant::now(),
        }
    }

    /// Whether `value` differs from the last value recorded for `key`
    pub fn is_change(&self, key: &str, value: f64) -> bool {
        self.last.get(key) != Some(&value)
    }
}

impl Default for ChangeMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ChangeMonitor {
    fn record(&mut self, key: &str, value: f64) {
        if self.is_change(key, value) {
            info!(key, value, "Value changed");
            self.last.insert(key.to_string(), value);
        }
    }

    fn tick(&mut self) {
        self.loops += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= THROUGHPUT_INTERVAL {
            let rate = self.loops as f64 / elapsed.as_secs_f64();
            debug!(loops = self.loops, rate_hz = rate, "Loop throughput");
            self.loops = 0;
            self.window_start = Instant::now();
        }
    }
}
