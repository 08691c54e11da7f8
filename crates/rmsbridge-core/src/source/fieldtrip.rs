//! FieldTrip buffer client
//!
//! Speaks version 1 of the FieldTrip realtime buffer protocol over TCP.
//! Every request and response starts with an 8-byte message definition:
//!
//! ```text
//! version: u16 (=1) | command: u16 | bufsize: u32 | payload[bufsize]
//! ```
//!
//! Only the two read requests the poll loop needs are implemented:
//! `GET_HDR` (stream metadata) and `GET_DAT` (an inclusive sample range).
//! All integers are little-endian.

use super::{SampleMatrix, SampleSource, SourceError, StreamMetadata};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use tracing::{debug, info};

/// Protocol version understood by this client
pub const VERSION: u16 = 0x0001;

pub const GET_HDR: u16 = 0x201;
pub const GET_DAT: u16 = 0x202;
pub const GET_OK: u16 = 0x204;
pub const GET_ERR: u16 = 0x205;

/// Chunk carrying NUL-separated channel names
pub const CHUNK_CHANNEL_NAMES: u32 = 1;

/// Size of the message definition preceding every payload
const MESSAGE_DEF_SIZE: usize = 8;
/// Size of the fixed part of a header payload
const HEADER_DEF_SIZE: usize = 24;
/// Size of the fixed part of a data payload
const DATA_DEF_SIZE: usize = 16;

/// Upper bound on a single payload, to reject garbage length fields
const MAX_PAYLOAD_SIZE: u32 = 512 * 1024 * 1024;

/// Upper bound on the channel count a header may announce
const MAX_CHANNELS: usize = 1 << 16;

/// Sample encodings used in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Map the protocol's numeric type code
    pub fn from_code(code: u32) -> Result<Self, SourceError> {
        Ok(match code {
            1 => Self::Uint8,
            2 => Self::Uint16,
            3 => Self::Uint32,
            4 => Self::Uint64,
            5 => Self::Int8,
            6 => Self::Int16,
            7 => Self::Int32,
            8 => Self::Int64,
            9 => Self::Float32,
            10 => Self::Float64,
            other => return Err(SourceError::UnsupportedDataType(other)),
        })
    }

    /// Bytes per sample
    pub fn size(self) -> usize {
        match self {
            Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Uint64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    fn read_sample(self, cur: &mut Cursor<&[u8]>) -> std::io::Result<f64> {
        Ok(match self {
            Self::Uint8 => cur.read_u8()? as f64,
            Self::Uint16 => cur.read_u16::<LittleEndian>()? as f64,
            Self::Uint32 => cur.read_u32::<LittleEndian>()? as f64,
            Self::Uint64 => cur.read_u64::<LittleEndian>()? as f64,
            Self::Int8 => cur.read_i8()? as f64,
            Self::Int16 => cur.read_i16::<LittleEndian>()? as f64,
            Self::Int32 => cur.read_i32::<LittleEndian>()? as f64,
            Self::Int64 => cur.read_i64::<LittleEndian>()? as f64,
            Self::Float32 => cur.read_f32::<LittleEndian>()? as f64,
            Self::Float64 => cur.read_f64::<LittleEndian>()?,
        })
    }
}

/// TCP client for a FieldTrip buffer
pub struct FieldTripClient {
    stream: TcpStream,
}

impl FieldTripClient {
    /// Open a connection to the buffer
    ///
    /// A single attempt is made; an unreachable buffer is reported as
    /// [`SourceError::Connect`].
    pub fn connect(host: &str, port: u16) -> Result<Self, SourceError> {
        info!(host, port, "Connecting to FieldTrip buffer");
        let stream = TcpStream::connect((host, port)).map_err(|source| SourceError::Connect {
            host: host.to_string(),
            port,
            source,
        })?;
        stream.set_nodelay(true)?;
        info!(host, port, "Connected to FieldTrip buffer");

        Ok(Self { stream })
    }

    fn request(&mut self, command: u16, payload: &[u8]) -> Result<(u16, Vec<u8>), SourceError> {
        self.stream.write_all(&encode_message(command, payload))?;
        self.stream.flush()?;

        let mut def = [0u8; MESSAGE_DEF_SIZE];
        self.stream.read_exact(&mut def)?;
        let mut cur = Cursor::new(&def[..]);
        let version = cur.read_u16::<LittleEndian>()?;
        let status = cur.read_u16::<LittleEndian>()?;
        let bufsize = cur.read_u32::<LittleEndian>()?;

        if version != VERSION {
            return Err(SourceError::Protocol(format!(
                "unexpected protocol version {version:#06x}"
            )));
        }
        if bufsize > MAX_PAYLOAD_SIZE {
            return Err(SourceError::Protocol(format!(
                "payload of {bufsize} bytes exceeds limit"
            )));
        }

        let mut body = vec![0u8; bufsize as usize];
        self.stream.read_exact(&mut body)?;
        Ok((status, body))
    }
}

impl SampleSource for FieldTripClient {
    fn header(&mut self) -> Result<Option<StreamMetadata>, SourceError> {
        let (status, body) = self.request(GET_HDR, &[])?;
        match status {
            GET_OK => decode_header(&body).map(Some),
            // The buffer answers GET_ERR until a producer has written a header
            GET_ERR => Ok(None),
            other => Err(SourceError::Protocol(format!(
                "unexpected reply {other:#06x} to GET_HDR"
            ))),
        }
    }

    fn data(&mut self, begin: u64, end: u64) -> Result<SampleMatrix, SourceError> {
        let to_u32 = |v: u64| {
            u32::try_from(v).map_err(|_| SourceError::Protocol(format!("sample index {v} out of range")))
        };
        let mut payload = Vec::with_capacity(8);
        payload.write_u32::<LittleEndian>(to_u32(begin)?)?;
        payload.write_u32::<LittleEndian>(to_u32(end)?)?;

        let (status, body) = self.request(GET_DAT, &payload)?;
        match status {
            GET_OK => {
                let matrix = decode_data(&body)?;
                debug!(begin, end, rows = matrix.rows(), cols = matrix.cols(), "Received samples");
                Ok(matrix)
            }
            GET_ERR => Err(SourceError::DataUnavailable { begin, end }),
            other => Err(SourceError::Protocol(format!(
                "unexpected reply {other:#06x} to GET_DAT"
            ))),
        }
    }
}

/// Frame a request: message definition followed by `payload`
pub fn encode_message(command: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MESSAGE_DEF_SIZE + payload.len());
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&command.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Decode a `GET_HDR` reply payload
pub fn decode_header(body: &[u8]) -> Result<StreamMetadata, SourceError> {
    if body.len() < HEADER_DEF_SIZE {
        return Err(SourceError::Protocol(format!(
            "header payload too short ({} bytes)",
            body.len()
        )));
    }

    let mut cur = Cursor::new(body);
    let nchans = cur.read_u32::<LittleEndian>()? as usize;
    let nsamples = cur.read_u32::<LittleEndian>()?;
    let _nevents = cur.read_u32::<LittleEndian>()?;
    let fsample = cur.read_f32::<LittleEndian>()?;
    let _data_type = cur.read_u32::<LittleEndian>()?;
    let chunk_bytes = cur.read_u32::<LittleEndian>()? as usize;

    if nchans > MAX_CHANNELS {
        return Err(SourceError::Protocol(format!(
            "header announces {nchans} channels, limit is {MAX_CHANNELS}"
        )));
    }

    let chunks = &body[HEADER_DEF_SIZE..];
    if chunks.len() < chunk_bytes {
        return Err(SourceError::Protocol("truncated header chunks".to_string()));
    }

    let mut labels = channel_names(&chunks[..chunk_bytes])?.unwrap_or_default();
    labels.resize(nchans, String::new());
    // Unnamed channels are numbered 1..n by position
    for (i, label) in labels.iter_mut().enumerate() {
        if label.is_empty() {
            *label = (i + 1).to_string();
        }
    }

    Ok(StreamMetadata {
        sample_count: u64::from(nsamples),
        sample_rate: f64::from(fsample),
        channel_labels: labels,
    })
}

fn channel_names(mut chunks: &[u8]) -> Result<Option<Vec<String>>, SourceError> {
    while chunks.len() >= 8 {
        let mut cur = Cursor::new(chunks);
        let kind = cur.read_u32::<LittleEndian>()?;
        let size = cur.read_u32::<LittleEndian>()? as usize;
        let rest = &chunks[8..];
        if rest.len() < size {
            return Err(SourceError::Protocol("truncated header chunk".to_string()));
        }
        if kind == CHUNK_CHANNEL_NAMES {
            let blob = &rest[..size];
            if blob.is_empty() {
                return Ok(Some(Vec::new()));
            }
            // Names are NUL-terminated; an empty name keeps its position
            let blob = blob.strip_suffix(&[0]).unwrap_or(blob);
            let names = blob
                .split(|&b| b == 0)
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect();
            return Ok(Some(names));
        }
        chunks = &rest[size..];
    }
    Ok(None)
}

/// Decode a `GET_DAT` reply payload into a row-major matrix
pub fn decode_data(body: &[u8]) -> Result<SampleMatrix, SourceError> {
    if body.len() < DATA_DEF_SIZE {
        return Err(SourceError::Protocol(format!(
            "data payload too short ({} bytes)",
            body.len()
        )));
    }

    let mut cur = Cursor::new(body);
    let nchans = cur.read_u32::<LittleEndian>()? as usize;
    let nsamples = cur.read_u32::<LittleEndian>()? as usize;
    let data_type = DataType::from_code(cur.read_u32::<LittleEndian>()?)?;
    let bufsize = cur.read_u32::<LittleEndian>()? as usize;

    let count = nchans
        .checked_mul(nsamples)
        .ok_or_else(|| SourceError::Protocol(format!("{nsamples}x{nchans} samples overflow")))?;
    let expected = count
        .checked_mul(data_type.size())
        .ok_or_else(|| SourceError::Protocol(format!("{nsamples}x{nchans} samples overflow")))?;
    if bufsize != expected || body.len() < DATA_DEF_SIZE + bufsize {
        return Err(SourceError::Protocol(format!(
            "data size mismatch: {nsamples}x{nchans} of {data_type:?} in {bufsize} bytes"
        )));
    }

    let mut samples = Cursor::new(&body[DATA_DEF_SIZE..DATA_DEF_SIZE + bufsize]);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(data_type.read_sample(&mut samples)?);
    }

    SampleMatrix::from_row_major(nsamples, nchans, values)
        .ok_or_else(|| SourceError::Protocol("inconsistent data shape".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_payload(nchans: u32, nsamples: u32, fsample: f32, names: Option<&[&str]>) -> Vec<u8> {
        let mut chunks = Vec::new();
        if let Some(names) = names {
            let mut blob = Vec::new();
            for n in names {
                blob.extend_from_slice(n.as_bytes());
                blob.push(0);
            }
            chunks.write_u32::<LittleEndian>(CHUNK_CHANNEL_NAMES).unwrap();
            chunks.write_u32::<LittleEndian>(blob.len() as u32).unwrap();
            chunks.extend_from_slice(&blob);
        }
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(nchans).unwrap();
        body.write_u32::<LittleEndian>(nsamples).unwrap();
        body.write_u32::<LittleEndian>(0).unwrap();
        body.write_f32::<LittleEndian>(fsample).unwrap();
        body.write_u32::<LittleEndian>(9).unwrap();
        body.write_u32::<LittleEndian>(chunks.len() as u32).unwrap();
        body.extend_from_slice(&chunks);
        body
    }

    #[test]
    fn test_encode_message_layout() {
        let msg = encode_message(GET_DAT, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&msg[..2], &[0x01, 0x00]);
        assert_eq!(&msg[2..4], &[0x02, 0x02]);
        assert_eq!(&msg[4..8], &[8, 0, 0, 0]);
        assert_eq!(msg.len(), 16);
    }

    #[test]
    fn test_decode_header_with_names() {
        let body = header_payload(2, 512, 256.0, Some(&["Fz", "Cz"]));
        let hdr = decode_header(&body).unwrap();
        assert_eq!(hdr.sample_count, 512);
        assert_eq!(hdr.sample_rate, 256.0);
        assert_eq!(hdr.channel_labels, vec!["Fz", "Cz"]);
    }

    #[test]
    fn test_decode_header_without_names() {
        let body = header_payload(3, 0, 100.0, None);
        let hdr = decode_header(&body).unwrap();
        assert_eq!(hdr.channel_labels, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_decode_header_too_short() {
        assert!(matches!(
            decode_header(&[0u8; 10]),
            Err(SourceError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_float32_data() {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(2).unwrap(); // nchans
        body.write_u32::<LittleEndian>(2).unwrap(); // nsamples
        body.write_u32::<LittleEndian>(9).unwrap(); // float32
        body.write_u32::<LittleEndian>(16).unwrap();
        for v in [1.0f32, -1.0, 0.5, 2.0] {
            body.write_f32::<LittleEndian>(v).unwrap();
        }
        let m = decode_data(&body).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.column(1), Some(vec![-1.0, 2.0]));
    }

    #[test]
    fn test_decode_int16_data() {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(1).unwrap();
        body.write_u32::<LittleEndian>(3).unwrap();
        body.write_u32::<LittleEndian>(6).unwrap(); // int16
        body.write_u32::<LittleEndian>(6).unwrap();
        for v in [-3i16, 0, 7] {
            body.write_i16::<LittleEndian>(v).unwrap();
        }
        let m = decode_data(&body).unwrap();
        assert_eq!(m.column(0), Some(vec![-3.0, 0.0, 7.0]));
    }

    #[test]
    fn test_decode_data_size_mismatch() {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(2).unwrap();
        body.write_u32::<LittleEndian>(2).unwrap();
        body.write_u32::<LittleEndian>(10).unwrap(); // float64
        body.write_u32::<LittleEndian>(16).unwrap(); // should be 32
        body.extend_from_slice(&[0u8; 16]);
        assert!(matches!(decode_data(&body), Err(SourceError::Protocol(_))));
    }

    #[test]
    fn test_decode_header_keeps_position_of_empty_names() {
        let body = header_payload(4, 0, 100.0, Some(&["Fz", "", "Pz"]));
        let hdr = decode_header(&body).unwrap();
        assert_eq!(hdr.channel_labels, vec!["Fz", "2", "Pz", "4"]);
    }

    #[test]
    fn test_decode_header_rejects_huge_channel_count() {
        let body = header_payload(u32::MAX, 0, 100.0, None);
        assert!(matches!(decode_header(&body), Err(SourceError::Protocol(_))));
    }

    #[test]
    fn test_decode_data_rejects_overflowing_shape() {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(1 << 31).unwrap(); // nchans
        body.write_u32::<LittleEndian>(1 << 30).unwrap(); // nsamples
        body.write_u32::<LittleEndian>(10).unwrap(); // float64
        body.write_u32::<LittleEndian>(0).unwrap();
        assert!(matches!(decode_data(&body), Err(SourceError::Protocol(_))));
    }

    #[test]
    fn test_unknown_data_type() {
        assert!(matches!(
            DataType::from_code(0),
            Err(SourceError::UnsupportedDataType(0))
        ));
    }
}
