//! Samvaad — UDP-broadcast pub/sub middleware for the Sarathi demonstrator.
//!
//! Independent processes exchange typed payloads over one UDP broadcast
//! bus addressed by string topics. There is no discovery and no delivery
//! guarantee; publishers fan out locally and broadcast one datagram, and
//! every process receives everything on port 12345.
//!
//! ```text
//! publish ──► local dispatch (snapshot → unlock → invoke)
//!         └─► UDP broadcast ──► remote bus-recv ──► decode ─┬─► dispatch
//!                                                           └─► /chunk? reassemble ─► dispatch
//! ```
//!
//! Payloads above the effective MTU travel as numbered chunk packets on
//! `<topic>/chunk` (see [`chunk`]) and are rebuilt on the receive side
//! before delivery. Every node reuses the same periodic-worker skeleton
//! ([`runtime::Worker`]) and liveness heartbeat ([`status::StatusReporter`]).

pub mod bus;
pub mod chunk;
pub mod error;
pub mod message;
pub mod ratelimit;
pub mod registry;
pub mod runtime;
pub mod status;
pub mod transport;
pub mod wire;

pub use bus::Bus;
pub use error::{Error, Result};
pub use message::{now_ms, Message};
pub use registry::SubscriptionId;
pub use runtime::Worker;
pub use status::{NodeState, NodeStatus, StatusReporter, NODE_STATUS_TOPIC};
