//! Key-value broadcast store
//!
//! Results are published as scalars under dotted keys; the same store also
//! serves live overrides for configuration values (see [`crate::config::Patch`]).

pub mod memory;
pub mod redis;

use thiserror::Error;

/// Errors that can occur while talking to the value store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot connect to value store at {address}: {message}")]
    Connect { address: String, message: String },

    #[error("Value store command failed for key {key}: {message}")]
    Command { key: String, message: String },
}

/// A key-value store that broadcasts every write
pub trait ValueStore {
    /// Current value under `key`, if any
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key` and notify subscribers
    fn set(&mut self, key: &str, value: f64) -> Result<(), StoreError>;
}

impl<V: ValueStore + ?Sized> ValueStore for Box<V> {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: f64) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}
