//! Chunked transfer for payloads above the effective MTU.
//!
//! Large payloads (camera frames, planned trajectories, map geometry) are
//! split into numbered chunk packets published on `<topic>/chunk`; the
//! receive path feeds those packets into a [`Reassembler`] and delivers
//! the rebuilt payload on the parent topic. Incomplete frames are evicted
//! after [`REASSEMBLY_TIMEOUT`] of silence — a partial payload is never
//! delivered.

use crate::wire::{ChunkHeader, CHUNK_HEADER_LEN};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Whole chunk packet budget (header + data), conservatively below a
/// 1500-byte path MTU with room for IP/UDP overhead.
pub const MAX_CHUNK_PACKET: usize = 1200;

/// Topic bytes and the frame delimiter share the datagram with the chunk
/// packet; reserve a fixed allowance for them.
pub const TOPIC_OVERHEAD_ALLOWANCE: usize = 50;

/// Data bytes carried per chunk.
pub const EFFECTIVE_CHUNK_SIZE: usize = MAX_CHUNK_PACKET - TOPIC_OVERHEAD_ALLOWANCE - CHUNK_HEADER_LEN;

/// Reassembly buffers idle longer than this are evicted.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between chunk sends so a burst of chunks does not crowd out
/// the high-rate publishers sharing the socket.
pub const INTER_CHUNK_PACING: Duration = Duration::from_millis(1);

/// Split a payload into ready-to-publish chunk packets.
///
/// Each packet is a 16-byte [`ChunkHeader`] followed by at most
/// [`EFFECTIVE_CHUNK_SIZE`] data bytes. Callers only reach for this when
/// the payload exceeds one chunk.
pub fn split_chunks(frame_id: u32, payload: &[u8]) -> Vec<Vec<u8>> {
    let total_chunks = payload.len().div_ceil(EFFECTIVE_CHUNK_SIZE) as u32;
    payload
        .chunks(EFFECTIVE_CHUNK_SIZE)
        .enumerate()
        .map(|(chunk_id, data)| {
            let header = ChunkHeader {
                frame_id,
                chunk_id: chunk_id as u32,
                total_chunks,
                chunk_size: data.len() as u32,
            };
            let mut packet = Vec::with_capacity(CHUNK_HEADER_LEN + data.len());
            packet.extend_from_slice(&header.encode());
            packet.extend_from_slice(data);
            packet
        })
        .collect()
}

struct ReassemblyBuffer {
    chunks: Vec<Option<Vec<u8>>>,
    filled: usize,
    last_update: Instant,
}

impl ReassemblyBuffer {
    fn new(total_chunks: u32, now: Instant) -> Self {
        Self {
            chunks: (0..total_chunks).map(|_| None).collect(),
            filled: 0,
            last_update: now,
        }
    }

    /// Store one chunk. True when the frame is complete. Duplicate chunks
    /// overwrite their slot without advancing the fill count, so UDP
    /// duplication is harmless.
    fn insert(&mut self, chunk_id: u32, data: &[u8], now: Instant) -> bool {
        let slot = &mut self.chunks[chunk_id as usize];
        if slot.is_none() {
            self.filled += 1;
        }
        *slot = Some(data.to_vec());
        self.last_update = now;
        self.filled == self.chunks.len()
    }

    fn assemble(self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(
            self.chunks.iter().map(|c| c.as_ref().map_or(0, Vec::len)).sum(),
        );
        for chunk in self.chunks.into_iter().flatten() {
            payload.extend_from_slice(&chunk);
        }
        payload
    }
}

/// Per-(parent topic, frame id) reassembly state.
///
/// Independent frames never block one another; a missing chunk only ever
/// stalls its own frame until the timeout sweep collects it.
pub struct Reassembler {
    buffers: HashMap<(String, u32), ReassemblyBuffer>,
    timeout: Duration,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            timeout: REASSEMBLY_TIMEOUT,
        }
    }

    /// Feed one chunk packet received for `parent`'s chunk topic.
    /// Returns the whole payload when this packet completes its frame.
    pub fn ingest(&mut self, parent: &str, packet: &[u8]) -> Option<Vec<u8>> {
        self.ingest_at(parent, packet, Instant::now())
    }

    fn ingest_at(&mut self, parent: &str, packet: &[u8], now: Instant) -> Option<Vec<u8>> {
        // Every arrival doubles as the GC tick; stale frames are evicted
        // before the new chunk is considered.
        self.sweep(now);

        let (header, data) = ChunkHeader::decode(packet)?;
        if header.total_chunks == 0 || header.chunk_id >= header.total_chunks {
            return None;
        }

        let key = (parent.to_string(), header.frame_id);
        let buffer = self
            .buffers
            .entry(key.clone())
            .or_insert_with(|| ReassemblyBuffer::new(header.total_chunks, now));
        if buffer.chunks.len() != header.total_chunks as usize {
            // A frame id that changed its chunk count mid-flight is corrupt.
            log::warn!(
                "dropping chunk with inconsistent total_chunks for {} frame {}",
                parent,
                header.frame_id
            );
            return None;
        }

        if buffer.insert(header.chunk_id, data, now) {
            let buffer = self.buffers.remove(&key)?;
            return Some(buffer.assemble());
        }
        None
    }

    /// Evict buffers idle past the timeout.
    pub fn sweep(&mut self, now: Instant) {
        self.buffers
            .retain(|_, buffer| now.duration_since(buffer.last_update) <= self.timeout);
    }

    /// Number of in-flight buffers. Exposed so eviction is observable.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
