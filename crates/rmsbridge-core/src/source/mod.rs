//! Sample-buffer source abstraction
//!
//! The poll loop only needs two things from a buffer: the current stream
//! metadata and an inclusive range of raw samples. Anything that can answer
//! those (a FieldTrip buffer, a test fake) implements [`SampleSource`].

pub mod fieldtrip;

use thiserror::Error;

/// Errors that can occur while talking to a sample-buffer source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Cannot connect to buffer at {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("Buffer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer rejected request for samples {begin}..={end}")]
    DataUnavailable { begin: u64, end: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported sample data type: {0}")]
    UnsupportedDataType(u32),
}

/// Metadata describing the stream currently held by the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    /// Total samples written so far; non-decreasing while the producer is healthy
    pub sample_count: u64,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Channel labels in the buffer's native order
    pub channel_labels: Vec<String>,
}

impl StreamMetadata {
    /// Number of channels in the stream
    pub fn channel_count(&self) -> usize {
        self.channel_labels.len()
    }
}

/// Raw sample block as returned by the buffer
///
/// Row-major: one row per sample, one column per channel in native order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl SampleMatrix {
    /// Build a matrix from row-major data
    ///
    /// Returns `None` if `data.len() != rows * cols`.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (rows.checked_mul(cols)? == data.len()).then_some(Self { rows, cols, data })
    }

    /// Number of samples (rows)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of channels (columns)
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Copy one column out of the matrix
    pub fn column(&self, col: usize) -> Option<Vec<f64>> {
        if col >= self.cols {
            return None;
        }
        Some(
            self.data
                .chunks_exact(self.cols)
                .map(|row| row[col])
                .collect(),
        )
    }
}

/// A queryable multichannel sample buffer
pub trait SampleSource {
    /// Current stream metadata, or `None` until the producer has started streaming
    fn header(&mut self) -> Result<Option<StreamMetadata>, SourceError>;

    /// Samples `begin..=end` in native channel order
    fn data(&mut self, begin: u64, end: u64) -> Result<SampleMatrix, SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn header(&mut self) -> Result<Option<StreamMetadata>, SourceError> {
        (**self).header()
    }

    fn data(&mut self, begin: u64, end: u64) -> Result<SampleMatrix, SourceError> {
        (**self).data(begin, end)
    }
}
