//! The process-wide pub/sub bus.
//!
//! # Dispatch Discipline
//!
//! `publish` fans out in two directions: an immediate local dispatch to
//! in-process subscribers and one broadcast datagram for everyone else.
//! Local dispatch **snapshots** the topic's callbacks under the registry
//! mutex, releases the mutex, and only then invokes them. That ordering
//! is the only reason a callback may itself publish (on the same or
//! another topic) without deadlocking.
//!
//! # Receive Path
//!
//! A dedicated thread blocks on the socket, decodes `topic|payload`
//! frames, and dispatches. Topics ending in `/chunk` are routed through
//! the [`Reassembler`] instead; the rebuilt payload is delivered on the
//! parent topic once the last chunk lands.
//!
//! # Degraded Mode
//!
//! When the socket cannot be set up (port taken without reuse support,
//! sandboxed environment), the bus keeps working with local fan-out only.
//! [`Bus::local_only`] constructs that mode deliberately; it is also what
//! the single-process tests run on.

use crate::chunk::{self, Reassembler};
use crate::error::{Error, Result};
use crate::message::{now_ms, Callback, Message};
use crate::ratelimit::LogEvery;
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::transport::{SendOutcome, Transport, RECV_BUFFER_LEN};
use crate::wire;
use std::io::ErrorKind;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Cloneable handle to the process-wide bus. All clones share one
/// registry, one socket, and one receive thread.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    registry: Mutex<SubscriptionRegistry>,
    transport: Option<Transport>,
    reassembler: Mutex<Reassembler>,
    next_frame_id: AtomicU32,
    running: AtomicBool,
    recv_thread: Mutex<Option<JoinHandle<()>>>,
    send_faults: LogEvery,
    recv_faults: LogEvery,
    decode_drops: LogEvery,
}

impl Bus {
    /// Create the bus with broadcast transport, falling back to
    /// local-only fan-out if the socket cannot be initialized.
    pub fn new() -> Bus {
        match Transport::bind() {
            Ok(transport) => Self::build(Some(transport)),
            Err(e) => {
                log::error!("bus transport unavailable, running local-only: {}", e);
                Self::build(None)
            }
        }
    }

    /// Create a bus with no network transport: publishes fan out to
    /// in-process subscribers only.
    pub fn local_only() -> Bus {
        Self::build(None)
    }

    fn build(transport: Option<Transport>) -> Bus {
        let inner = Arc::new(BusInner {
            registry: Mutex::new(SubscriptionRegistry::new()),
            transport,
            reassembler: Mutex::new(Reassembler::new()),
            next_frame_id: AtomicU32::new(0),
            running: AtomicBool::new(true),
            recv_thread: Mutex::new(None),
            send_faults: LogEvery::new(100),
            recv_faults: LogEvery::new(100),
            decode_drops: LogEvery::new(100),
        });

        if inner.transport.is_some() {
            let loop_inner = Arc::clone(&inner);
            match thread::Builder::new()
                .name("bus-recv".to_string())
                .spawn(move || receive_loop(loop_inner))
            {
                Ok(handle) => *inner.recv_thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle),
                Err(e) => log::error!("failed to spawn bus receive thread: {}", e),
            }
        }

        Bus { inner }
    }

    /// Whether the broadcast transport came up. False means local-only.
    pub fn transport_active(&self) -> bool {
        self.inner.transport.is_some()
    }

    /// Register a callback for a topic. Callbacks run on whichever thread
    /// delivers the message (the publisher's for local traffic, the
    /// receive thread for network traffic) and must not block for long.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        wire::validate_topic(topic)?;
        let mut registry = self.inner.registry();
        Ok(registry.insert(topic, Arc::new(callback) as Arc<Callback>))
    }

    /// Remove one subscription. True iff the id existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.registry().remove(id)
    }

    /// Remove every subscription of a topic; returns how many there were.
    pub fn unsubscribe_topic(&self, topic: &str) -> usize {
        self.inner.registry().remove_topic(topic)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.registry().subscriber_count(topic)
    }

    pub fn all_topics(&self) -> Vec<String> {
        self.inner.registry().topics()
    }

    /// Publish one payload: local fan-out first, then one broadcast
    /// datagram.
    ///
    /// Local subscribers are always served — the MTU check only gates the
    /// network path, so an oversized payload still reaches in-process
    /// callbacks before `TooLarge` is returned.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        wire::validate_topic(topic)?;
        self.inner.dispatch_local(topic, payload);
        self.inner.broadcast(topic, payload)
    }

    /// Publish a payload of any size.
    ///
    /// Payloads that fit one chunk go out as a plain [`publish`]. Larger
    /// ones are delivered to local subscribers whole, then split into
    /// numbered chunk packets broadcast on `<topic>/chunk` with a short
    /// pacing sleep between sends.
    ///
    /// [`publish`]: Bus::publish
    pub fn publish_large(&self, topic: &str, payload: &[u8]) -> Result<()> {
        wire::validate_topic(topic)?;
        if payload.len() <= chunk::EFFECTIVE_CHUNK_SIZE {
            return self.publish(topic, payload);
        }

        self.inner.dispatch_local(topic, payload);
        if self.inner.transport.is_none() {
            return Ok(());
        }

        let frame_id = self
            .inner
            .next_frame_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);
        let packets = chunk::split_chunks(frame_id, payload);
        let chunk_topic = format!("{}{}", topic, wire::CHUNK_TOPIC_SUFFIX);
        let last = packets.len() - 1;

        log::debug!(
            "publishing {} bytes on {} as {} chunks (frame {})",
            payload.len(),
            topic,
            packets.len(),
            frame_id
        );

        for (i, packet) in packets.iter().enumerate() {
            self.inner.broadcast(&chunk_topic, packet)?;
            if i < last {
                thread::sleep(chunk::INTER_CHUNK_PACING);
            }
        }
        Ok(())
    }

    /// Stop the receive thread and join it. Idempotent; call from the
    /// thread that owns shutdown, never from inside a callback.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::Relaxed) {
            return;
        }
        let handle = self
            .inner
            .recv_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusInner {
    fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver to in-process subscribers: snapshot under the lock, invoke
    /// outside it, isolate every callback fault.
    fn dispatch_local(&self, topic: &str, payload: &[u8]) {
        let (callbacks, timestamp_ms) = {
            let registry = self.registry();
            let callbacks = registry.snapshot(topic);
            if callbacks.is_empty() {
                return;
            }
            (callbacks, now_ms())
        };

        let message = Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            timestamp_ms,
        };

        for callback in callbacks {
            if let Err(fault) = catch_unwind(AssertUnwindSafe(|| callback(&message))) {
                log::error!(
                    "subscriber callback panicked on {}: {}",
                    topic,
                    panic_text(&fault)
                );
            }
        }
    }

    /// Send one frame over the broadcast transport. Transient send faults
    /// are absorbed here with rate-limited logging; only the MTU violation
    /// surfaces to the publisher.
    fn broadcast(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let frame_len = topic.len() + 1 + payload.len();
        if frame_len > wire::MAX_DATAGRAM {
            return Err(Error::TooLarge {
                len: frame_len,
                max: wire::MAX_DATAGRAM,
            });
        }
        let Some(transport) = &self.transport else {
            return Ok(());
        };

        let frame = wire::encode_frame(topic, payload)?;
        match transport.send(&frame) {
            SendOutcome::Sent => {}
            SendOutcome::ShortWrite { sent, len } => {
                if self.send_faults.admit() {
                    log::warn!(
                        "short write on {}: {} of {} bytes ({} send faults so far)",
                        topic,
                        sent,
                        len,
                        self.send_faults.occurrences()
                    );
                }
            }
            SendOutcome::Failed(e) => {
                if self.send_faults.admit() {
                    log::warn!(
                        "send failed on {}: {} ({} send faults so far)",
                        topic,
                        e,
                        self.send_faults.occurrences()
                    );
                }
            }
        }
        Ok(())
    }
}

fn receive_loop(inner: Arc<BusInner>) {
    let Some(transport) = inner.transport.as_ref() else {
        return;
    };
    log::info!("bus receive thread started");

    let mut buffer = vec![0u8; RECV_BUFFER_LEN];
    while inner.running.load(Ordering::Relaxed) {
        let len = match transport.recv(&mut buffer) {
            Ok((len, _src)) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                if inner.recv_faults.admit() {
                    log::warn!(
                        "bus recv error: {} ({} recv faults so far)",
                        e,
                        inner.recv_faults.occurrences()
                    );
                }
                continue;
            }
        };

        let Some((topic, payload)) = wire::decode_frame(&buffer[..len]) else {
            if inner.decode_drops.admit() {
                log::warn!(
                    "dropping undecodable datagram of {} bytes ({} drops so far)",
                    len,
                    inner.decode_drops.occurrences()
                );
            }
            continue;
        };

        if let Some(parent) = wire::parent_topic(topic) {
            let completed = {
                let mut reassembler = inner
                    .reassembler
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                reassembler.ingest(parent, payload)
            };
            if let Some(whole) = completed {
                let parent = parent.to_string();
                inner.dispatch_local(&parent, &whole);
            }
        } else {
            inner.dispatch_local(topic, payload);
        }
    }

    log::info!("bus receive thread stopped");
}

fn panic_text(fault: &(dyn std::any::Any + Send)) -> &str {
    if let Some(text) = fault.downcast_ref::<&str>() {
        text
    } else if let Some(text) = fault.downcast_ref::<String>() {
        text
    } else {
        "non-string panic payload"
    }
}
