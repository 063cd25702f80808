//! Error types for the samvaad bus.
//!
//! # Error Recovery Strategies
//!
//! ## Caller Errors (Fix the Call Site)
//!
//! - **`InvalidTopic`**: The topic was empty or contained the `|` frame
//!   delimiter. The registry and the wire are untouched; correct the topic.
//!
//! ## Transport Limits (Chunk or Shrink)
//!
//! - **`TooLarge`**: The encoded frame exceeds what one UDP datagram can
//!   carry. Local subscribers have already been served by the time this is
//!   returned; use [`Bus::publish_large`](crate::Bus::publish_large) to
//!   reach remote subscribers with payloads of this size.
//!
//! ## Transient Errors (Log and Continue)
//!
//! Short writes, send failures and receive failures never surface through
//! this enum. The transport absorbs them with rate-limited logging and the
//! affected loop keeps running; subscribers simply miss one datagram.

use thiserror::Error;

/// Errors that can surface from the samvaad middleware.
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid topic {0:?}: topics must be non-empty and free of '|'")]
    InvalidTopic(String),

    #[error("frame of {len} bytes exceeds the {max}-byte datagram limit")]
    TooLarge { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
