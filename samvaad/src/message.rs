//! The message value delivered to subscriber callbacks.

use std::time::{SystemTime, UNIX_EPOCH};

/// One delivered publication.
///
/// Built by the dispatcher at delivery time and shared by reference with
/// every callback in the dispatch snapshot; dropped once the last callback
/// returns.
#[derive(Debug, Clone)]
pub struct Message {
    /// Topic the payload was published on.
    pub topic: String,
    /// Opaque payload bytes. May be empty.
    pub payload: Vec<u8>,
    /// Wall-clock milliseconds stamped by the dispatcher at delivery.
    pub timestamp_ms: i64,
}

/// Subscriber callback: consumes one message, returns nothing.
///
/// Stored behind an `Arc` in the registry so an in-flight dispatch keeps
/// its snapshot alive even if the subscription is removed mid-delivery.
pub type Callback = dyn Fn(&Message) + Send + Sync;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
