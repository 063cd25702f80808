//! Wire framing: `topic|payload` datagrams and the 16-byte chunk header.
//!
//! # Frame Format
//!
//! ```text
//! ┌─────────────┬─────┬──────────────────┐
//! │ topic bytes │ '|' │ payload bytes    │
//! └─────────────┴─────┴──────────────────┘
//! ```
//!
//! The first `|` is the delimiter; any later `|` bytes belong to the
//! payload. Topics are non-empty UTF-8 and may not contain `|`.
//!
//! # Chunk Packet Format
//!
//! When the topic ends in `/chunk`, the payload is a chunk packet:
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬────────────┬────────────┐
//! │ frame_id │ chunk_id │ total_chunks │ chunk_size │ chunk data │
//! │ u32 BE   │ u32 BE   │ u32 BE       │ u32 BE     │ variable   │
//! └──────────┴──────────┴──────────────┴────────────┴────────────┘
//! ```
//!
//! The header is deliberately independent of any payload serialization so
//! the reassembler never needs to understand message schemas.

use crate::error::{Error, Result};

/// Largest UDP payload that fits one datagram (65 535 minus IP/UDP headers).
pub const MAX_DATAGRAM: usize = 65_507;

/// Delimiter between topic and payload.
pub const TOPIC_DELIMITER: u8 = b'|';

/// Topics carrying chunk packets end in this suffix.
pub const CHUNK_TOPIC_SUFFIX: &str = "/chunk";

/// Fixed size of the chunk header on the wire.
pub const CHUNK_HEADER_LEN: usize = 16;

/// Check that `topic` is usable on the wire: non-empty and free of the
/// frame delimiter.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() || topic.bytes().any(|b| b == TOPIC_DELIMITER) {
        return Err(Error::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

/// Encode one frame. Rejects invalid topics; the caller bounds the total
/// length against [`MAX_DATAGRAM`].
pub fn encode_frame(topic: &str, payload: &[u8]) -> Result<Vec<u8>> {
    validate_topic(topic)?;
    let mut frame = Vec::with_capacity(topic.len() + 1 + payload.len());
    frame.extend_from_slice(topic.as_bytes());
    frame.push(TOPIC_DELIMITER);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Split a received datagram at the first `|`.
///
/// Returns `None` when the delimiter is missing, the topic is empty, or
/// the topic bytes are not UTF-8; the caller drops such datagrams.
pub fn decode_frame(datagram: &[u8]) -> Option<(&str, &[u8])> {
    let sep = datagram.iter().position(|&b| b == TOPIC_DELIMITER)?;
    let topic = std::str::from_utf8(&datagram[..sep]).ok()?;
    if topic.is_empty() {
        return None;
    }
    Some((topic, &datagram[sep + 1..]))
}

/// Strip the `/chunk` suffix, yielding the topic reassembled payloads are
/// delivered on. `None` for ordinary topics.
pub fn parent_topic(topic: &str) -> Option<&str> {
    topic
        .strip_suffix(CHUNK_TOPIC_SUFFIX)
        .filter(|parent| !parent.is_empty())
}

/// Header prepended to every chunk packet. All fields big-endian u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Identifies the logical payload the chunk belongs to.
    pub frame_id: u32,
    /// Position of this chunk within the frame, `0..total_chunks`.
    pub chunk_id: u32,
    /// Number of chunks the frame was split into.
    pub total_chunks: u32,
    /// Byte length of the data following the header.
    pub chunk_size: u32,
}

impl ChunkHeader {
    pub fn encode(&self) -> [u8; CHUNK_HEADER_LEN] {
        let mut header = [0u8; CHUNK_HEADER_LEN];
        header[0..4].copy_from_slice(&self.frame_id.to_be_bytes());
        header[4..8].copy_from_slice(&self.chunk_id.to_be_bytes());
        header[8..12].copy_from_slice(&self.total_chunks.to_be_bytes());
        header[12..16].copy_from_slice(&self.chunk_size.to_be_bytes());
        header
    }

    /// Decode a chunk packet into header and data.
    ///
    /// Fails when the packet is shorter than the header or when
    /// `chunk_size` disagrees with the number of remaining bytes.
    pub fn decode(packet: &[u8]) -> Option<(ChunkHeader, &[u8])> {
        if packet.len() < CHUNK_HEADER_LEN {
            return None;
        }
        let field = |i: usize| u32::from_be_bytes([packet[i], packet[i + 1], packet[i + 2], packet[i + 3]]);
        let header = ChunkHeader {
            frame_id: field(0),
            chunk_id: field(4),
            total_chunks: field(8),
            chunk_size: field(12),
        };
        let data = &packet[CHUNK_HEADER_LEN..];
        if header.chunk_size as usize != data.len() {
            return None;
        }
        Some((header, data))
    }
}
