//! Node liveness heartbeat.
//!
//! Every node owns a [`StatusReporter`] that publishes one serialized
//! [`NodeStatus`] on [`NODE_STATUS_TOPIC`] per second. The daemon folds
//! these into the combined `system/status` record; the monitor shows them
//! directly.

use crate::bus::Bus;
use crate::message::now_ms;
use crate::runtime::Worker;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Well-known heartbeat topic.
pub const NODE_STATUS_TOPIC: &str = "system/node_status";

/// Heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Ok,
    Warn,
    Error,
    Offline,
}

/// One heartbeat record. `cpu_usage`/`memory_usage` are filled in by the
/// daemon, not by the reporting node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_name: String,
    pub state: NodeState,
    pub message: String,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f32>,
}

/// Background heartbeat publisher. State defaults to OK at construction;
/// nodes call [`set_status`](StatusReporter::set_status) when that
/// changes. No final record is published on stop.
pub struct StatusReporter {
    current: Arc<Mutex<(NodeState, String)>>,
    worker: Worker,
}

impl StatusReporter {
    pub fn start(bus: Bus, node_name: &str) -> StatusReporter {
        let current = Arc::new(Mutex::new((NodeState::Ok, "node initialized".to_string())));
        let shared = Arc::clone(&current);
        let name = node_name.to_string();
        let pid = std::process::id();

        let worker = Worker::spawn_periodic("status-report", HEARTBEAT_PERIOD, move || {
            let (state, message) = shared.lock().unwrap_or_else(|e| e.into_inner()).clone();
            let status = NodeStatus {
                node_name: name.clone(),
                state,
                message,
                timestamp_ms: now_ms(),
                pid: Some(pid),
                cpu_usage: None,
                memory_usage: None,
            };
            let payload = serde_json::to_vec(&status)?;
            bus.publish(NODE_STATUS_TOPIC, &payload)
        });

        StatusReporter { current, worker }
    }

    pub fn set_status(&self, state: NodeState, message: impl Into<String>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = (state, message.into());
    }

    /// Stop the heartbeat thread and join it.
    pub fn stop(&mut self) {
        self.worker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_reporter_publishes_heartbeats() {
        let bus = Bus::local_only();
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&beats);
        let node_names = Arc::new(Mutex::new(Vec::new()));
        let names = Arc::clone(&node_names);
        bus.subscribe(NODE_STATUS_TOPIC, move |msg| {
            let status: NodeStatus = serde_json::from_slice(&msg.payload).unwrap();
            names.lock().unwrap().push(status.node_name.clone());
            assert_eq!(status.state, NodeState::Ok);
            assert!(status.pid.is_some());
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        let mut reporter = StatusReporter::start(bus.clone(), "TestNode");
        thread::sleep(Duration::from_millis(150));
        reporter.stop();

        assert!(beats.load(Ordering::Relaxed) >= 1);
        assert!(node_names.lock().unwrap().iter().all(|n| n == "TestNode"));
    }

    #[test]
    fn test_set_status_changes_published_state() {
        let bus = Bus::local_only();
        let last_state = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_state);
        bus.subscribe(NODE_STATUS_TOPIC, move |msg| {
            let status: NodeStatus = serde_json::from_slice(&msg.payload).unwrap();
            *sink.lock().unwrap() = Some((status.state, status.message));
        })
        .unwrap();

        let mut reporter = StatusReporter::start(bus.clone(), "TestNode");
        reporter.set_status(NodeState::Warn, "sensor degraded");
        thread::sleep(Duration::from_millis(1100));
        reporter.stop();

        let seen = last_state.lock().unwrap().clone();
        let (state, message) = seen.expect("no heartbeat observed");
        assert_eq!(state, NodeState::Warn);
        assert_eq!(message, "sensor degraded");
    }
}
