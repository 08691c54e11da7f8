//! Window sizing and latest-window fetching
//!
//! Each poll cycle looks only at the most recent `window_samples` samples in
//! the buffer. Older samples that scrolled past between polls are never
//! revisited; there is no backlog.

use crate::config::ConfigError;
use crate::processing::channels::ChannelSpec;
use crate::source::{SampleMatrix, SampleSource, SourceError};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that end a fetch attempt
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Buffer reset detected: newest sample {newest} precedes last processed sample {last_end}")]
    BufferReset { newest: i64, last_end: i64 },

    #[error("Buffer no longer reports a header")]
    HeaderLost,

    #[error("Buffer returned {rows}x{cols} samples, expected {expected_rows} rows")]
    Shape {
        rows: usize,
        cols: usize,
        expected_rows: usize,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Convert a window duration to a length in samples
///
/// Rounds half to even, so 0.5 s at 101 Hz gives 50 samples.
///
/// # Errors
/// [`ConfigError::Invalid`] for a non-positive or non-finite duration or rate,
/// [`ConfigError::ZeroWindow`] if the rounded length is zero.
///
/// # Example
/// ```
/// use rmsbridge_core::processing::window::window_length;
///
/// assert_eq!(window_length(1.0, 256.0).unwrap(), 256);
/// assert_eq!(window_length(0.5, 100.0).unwrap(), 50);
/// ```
pub fn window_length(seconds: f64, sample_rate: f64) -> Result<usize, ConfigError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::Invalid {
            section: "processing".into(),
            key: "window".into(),
            message: format!("window must be a positive number of seconds, got {seconds}"),
        });
    }
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(ConfigError::Invalid {
            section: "fieldtrip".into(),
            key: "fsample".into(),
            message: format!("buffer reports sample rate {sample_rate}"),
        });
    }

    let samples = (seconds * sample_rate).round_ties_even();
    if samples < 1.0 {
        return Err(ConfigError::ZeroWindow {
            seconds,
            sample_rate,
        });
    }
    Ok(samples as usize)
}

/// Loop state carried between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationState {
    /// Window length in samples, fixed after the handshake
    pub window_samples: usize,
    /// Last sample of the most recently processed window, -1 before the first
    pub last_end_sample: i64,
}

impl AggregationState {
    pub fn new(window_samples: usize) -> Self {
        Self {
            window_samples,
            last_end_sample: -1,
        }
    }
}

/// The selected channels of one window, column per channel in selection order
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    length: usize,
    columns: Vec<Vec<f64>>,
}

impl SampleWindow {
    /// Build a window from per-channel columns
    ///
    /// Returns `None` unless every column has exactly `length` samples.
    pub fn from_columns(length: usize, columns: Vec<Vec<f64>>) -> Option<Self> {
        columns
            .iter()
            .all(|c| c.len() == length)
            .then_some(Self { length, columns })
    }

    /// Select and reorder columns of a raw matrix
    fn select(matrix: &SampleMatrix, channels: &[ChannelSpec]) -> Option<Self> {
        let columns = channels
            .iter()
            .map(|c| matrix.column(c.source_index))
            .collect::<Option<Vec<_>>>()?;
        Self::from_columns(matrix.rows(), columns)
    }

    /// Samples per channel
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of selected channels
    pub fn channel_count(&self) -> usize {
        self.columns.len()
    }

    /// All columns, in selection order
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }
}

/// Fetches the latest window of the selected channels each cycle
#[derive(Debug)]
pub struct WindowFetcher {
    state: AggregationState,
    channels: Vec<ChannelSpec>,
}

impl WindowFetcher {
    pub fn new(window_samples: usize, channels: Vec<ChannelSpec>) -> Self {
        Self {
            state: AggregationState::new(window_samples),
            channels,
        }
    }

    pub fn state(&self) -> AggregationState {
        self.state
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    /// Run one fetch step
    ///
    /// Returns `Ok(None)` while fewer than `window_samples` samples exist.
    /// The state only advances when a window was actually retrieved.
    pub fn fetch<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<SampleWindow>, FetchError> {
        let hdr = source.header()?.ok_or(FetchError::HeaderLost)?;
        let newest = hdr.sample_count as i64 - 1;

        if newest < self.state.last_end_sample {
            return Err(FetchError::BufferReset {
                newest,
                last_end: self.state.last_end_sample,
            });
        }

        let window = self.state.window_samples as u64;
        if hdr.sample_count < window {
            debug!(
                available = hdr.sample_count,
                needed = window,
                "Waiting for data"
            );
            return Ok(None);
        }

        let begin = hdr.sample_count - window;
        let end = hdr.sample_count - 1;
        let matrix = source.data(begin, end)?;
        trace!(begin, end, "Fetched window");

        if matrix.rows() != self.state.window_samples {
            return Err(FetchError::Shape {
                rows: matrix.rows(),
                cols: matrix.cols(),
                expected_rows: self.state.window_samples,
            });
        }
        let selected = SampleWindow::select(&matrix, &self.channels).ok_or(FetchError::Shape {
            rows: matrix.rows(),
            cols: matrix.cols(),
            expected_rows: self.state.window_samples,
        })?;

        self.state.last_end_sample = end as i64;
        Ok(Some(selected))
    }
}
