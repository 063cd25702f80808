//! Chunk transfer properties at the wire level.
//!
//! The reassembler is fed hand-built chunk packets (not just the
//! splitter's output) so the tests cover arbitrary chunk sizes and
//! arrival orders, the way a real wire would present them.

use samvaad::chunk::{split_chunks, Reassembler, EFFECTIVE_CHUNK_SIZE};
use samvaad::wire::ChunkHeader;

/// Split `payload` into chunks of `size` bytes by hand.
fn manual_packets(frame_id: u32, payload: &[u8], size: usize) -> Vec<Vec<u8>> {
    let total = payload.len().div_ceil(size) as u32;
    payload
        .chunks(size)
        .enumerate()
        .map(|(i, data)| {
            let header = ChunkHeader {
                frame_id,
                chunk_id: i as u32,
                total_chunks: total,
                chunk_size: data.len() as u32,
            };
            let mut packet = header.encode().to_vec();
            packet.extend_from_slice(data);
            packet
        })
        .collect()
}

#[test]
fn shuffled_chunks_reassemble_exactly() {
    let payload: Vec<u8> = (0..9001u32).map(|i| (i * 31 % 256) as u8).collect();

    for size in [1usize, 7, 250, 1000, EFFECTIVE_CHUNK_SIZE] {
        // Skip pathological single-byte splitting of the full payload.
        let payload = &payload[..payload.len().min(size * 40)];
        let mut packets = manual_packets(42, payload, size);

        // Deterministic shuffle: reverse then interleave halves.
        packets.reverse();
        let half = packets.len() / 2;
        let (front, back) = packets.split_at(half);
        let mut order: Vec<&Vec<u8>> = Vec::with_capacity(packets.len());
        for i in 0..half.max(back.len()) {
            if i < back.len() {
                order.push(&back[i]);
            }
            if i < front.len() {
                order.push(&front[i]);
            }
        }

        let mut reassembler = Reassembler::new();
        let mut delivered = None;
        for packet in &order {
            if let Some(whole) = reassembler.ingest("t", packet) {
                assert!(delivered.is_none(), "delivered more than once");
                delivered = Some(whole);
            }
        }
        assert_eq!(delivered.as_deref(), Some(payload), "chunk size {}", size);
        assert_eq!(reassembler.live_buffers(), 0);
    }
}

#[test]
fn five_kilobyte_map_payload_uses_five_chunks() {
    let payload = vec![b'{'; 5000];
    let packets = split_chunks(1, &payload);
    assert_eq!(packets.len(), 5);
    for packet in &packets {
        let (header, data) = ChunkHeader::decode(packet).unwrap();
        assert_eq!(header.total_chunks, 5);
        assert!(header.chunk_id < 5);
        assert!(data.len() <= EFFECTIVE_CHUNK_SIZE);
        assert_eq!(header.chunk_size as usize, data.len());
    }

    let mut reassembler = Reassembler::new();
    let mut delivered = Vec::new();
    for packet in &packets {
        if let Some(whole) = reassembler.ingest("visualizer/map", packet) {
            delivered.push(whole);
        }
    }
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0], payload);
}

#[test]
fn incomplete_frame_is_never_delivered() {
    let payload = vec![9u8; 4 * EFFECTIVE_CHUNK_SIZE];
    let packets = split_chunks(2, &payload);
    let mut reassembler = Reassembler::new();
    for packet in packets.iter().skip(1) {
        assert!(reassembler.ingest("t", packet).is_none());
    }
    assert_eq!(reassembler.live_buffers(), 1);
}

#[test]
fn stale_buffer_is_evicted_by_wall_clock_timeout() {
    let payload = vec![5u8; 3 * EFFECTIVE_CHUNK_SIZE];
    let packets = split_chunks(3, &payload);
    let mut reassembler = Reassembler::new();
    assert!(reassembler.ingest("t", &packets[0]).is_none());
    assert!(reassembler.ingest("t", &packets[1]).is_none());
    assert_eq!(reassembler.live_buffers(), 1);

    std::thread::sleep(std::time::Duration::from_millis(1200));

    // Any later arrival sweeps the stale buffer out.
    let other = split_chunks(4, &vec![6u8; 2 * EFFECTIVE_CHUNK_SIZE]);
    assert!(reassembler.ingest("t", &other[0]).is_none());
    assert_eq!(reassembler.live_buffers(), 1);

    // The original frame's last chunk no longer completes anything.
    assert!(reassembler.ingest("t", &packets[2]).is_none());
}
