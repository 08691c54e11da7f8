//! Signal processing module
//!
//! This module contains the per-cycle aggregation pipeline:
//! - Channel selection from configuration ([`channels`])
//! - Window sizing and latest-window fetching ([`window`])
//! - Root-mean-square reduction ([`rms`])

pub mod channels;
pub mod rms;
pub mod window;
