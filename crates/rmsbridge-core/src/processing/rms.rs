//! Root-mean-square energy per channel

use crate::processing::channels::ChannelSpec;
use crate::processing::window::SampleWindow;

/// RMS of a single channel's samples
///
/// An all-zero (or empty) input yields exactly 0 without taking a square root.
///
/// # Example
/// ```
/// use rmsbridge_core::processing::rms::rms;
///
/// assert_eq!(rms(&[3.0, -3.0, 3.0, -3.0]), 3.0);
/// assert_eq!(rms(&[0.0; 16]), 0.0);
/// ```
pub fn rms(samples: &[f64]) -> f64 {
    let sum_sq: f64 = samples.iter().map(|x| x * x).sum();
    if sum_sq == 0.0 {
        return 0.0;
    }
    (sum_sq / samples.len() as f64).sqrt()
}

/// RMS of every channel in a window, in window column order
pub fn window_rms(window: &SampleWindow) -> Vec<f64> {
    window.columns().iter().map(|col| rms(col)).collect()
}

/// Named RMS values for one cycle, in channel selection order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmsResult {
    values: Vec<(String, f64)>,
}

impl RmsResult {
    /// Reduce a window to per-channel RMS values
    ///
    /// # Panics
    /// If the window's column count differs from `channels.len()`; the
    /// fetcher always builds windows from the same channel list.
    pub fn compute(channels: &[ChannelSpec], window: &SampleWindow) -> Self {
        assert_eq!(
            channels.len(),
            window.channel_count(),
            "window columns must match channel selection"
        );
        let values = channels
            .iter()
            .zip(window_rms(window))
            .map(|(c, v)| (c.name.clone(), v))
            .collect();
        Self { values }
    }

    /// `(channel name, rms)` pairs in selection order
    pub fn values(&self) -> &[(String, f64)] {
        &self.values
    }

    /// Look up one channel's value
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
