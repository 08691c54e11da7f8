//! Channel selection
//!
//! Configuration names channels with 1-based numbers; the buffer indexes
//! them from zero. The mapping is resolved once at startup and keeps the
//! configuration's declaration order, which is also the publish order.

use crate::config::ConfigError;
use crate::source::StreamMetadata;

/// A selected channel: output name plus 0-based index into the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Name used as the last key segment when publishing
    pub name: String,
    /// 0-based column in the buffer's native channel order
    pub source_index: usize,
}

/// Build the ordered channel selection from `(name, 1-based number)` pairs
///
/// # Errors
/// [`ConfigError::ChannelNumber`] if any number is below 1.
///
/// # Example
/// ```
/// use rmsbridge_core::processing::channels::channel_map;
///
/// let specs = channel_map([("chanB", 2), ("chanA", 1)]).unwrap();
/// assert_eq!(specs[0].name, "chanB");
/// assert_eq!(specs[0].source_index, 1);
/// assert_eq!(specs[1].source_index, 0);
/// ```
pub fn channel_map<I, S>(entries: I) -> Result<Vec<ChannelSpec>, ConfigError>
where
    I: IntoIterator<Item = (S, i64)>,
    S: Into<String>,
{
    entries
        .into_iter()
        .map(|(name, number)| {
            let name = name.into();
            if number < 1 {
                return Err(ConfigError::ChannelNumber { name, number });
            }
            Ok(ChannelSpec {
                name,
                source_index: (number - 1) as usize,
            })
        })
        .collect()
}

/// Check that every selected channel exists in the stream
pub fn check_against_stream(
    channels: &[ChannelSpec],
    metadata: &StreamMetadata,
) -> Result<(), ConfigError> {
    let available = metadata.channel_count();
    match channels.iter().find(|c| c.source_index >= available) {
        Some(c) => Err(ConfigError::ChannelOutOfRange {
            name: c.name.clone(),
            number: c.source_index + 1,
            available,
        }),
        None => Ok(()),
    }
}
