//! Statistics storage and management
//!
//! Stores per-channel RMS history and cycle counters for the run summary.

pub mod store;
