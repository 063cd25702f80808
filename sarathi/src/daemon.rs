//! Daemon: node process supervision and the combined status feed.
//!
//! Listens on `system/command` for start/stop requests, launches sibling
//! node binaries as child processes, reaps them, samples per-PID CPU and
//! memory through `ps`, and publishes one combined `system/status` record
//! per second. Per-node heartbeats from `system/node_status` are folded
//! in so nodes the daemon did not launch still show up.

use samvaad::{now_ms, Bus, NodeStatus, StatusReporter, SubscriptionId, Worker};
use sarathi_msgs::{
    topics, CommandResponse, NodeProcessStatus, SystemAction, SystemCommand, SystemStatus,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Node names the daemon may launch. Binaries are expected next to the
/// daemon executable itself (one cargo target directory).
const MANAGED_NODES: &[&str] = &[
    "simulator",
    "sensor",
    "perception",
    "prediction",
    "planning",
    "control",
    "map",
    "visualizer",
    "monitor",
];

/// Heartbeats older than this no longer count as alive.
const HEARTBEAT_STALE_MS: u64 = 5000;

struct ManagedProcess {
    child: Child,
    is_running: bool,
}

#[derive(Default)]
struct DaemonState {
    processes: HashMap<String, ManagedProcess>,
    heartbeats: HashMap<String, (NodeStatus, Instant)>,
}

pub struct Daemon {
    bus: Bus,
    state: Arc<Mutex<DaemonState>>,
    subscriptions: Vec<SubscriptionId>,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl Daemon {
    pub fn new(bus: Bus) -> Daemon {
        Daemon {
            bus,
            state: Arc::new(Mutex::new(DaemonState::default())),
            subscriptions: Vec::new(),
            worker: None,
            reporter: None,
        }
    }

    pub fn start(&mut self) -> samvaad::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let bus = self.bus.clone();
        self.subscriptions.push(self.bus.subscribe(topics::SYSTEM_COMMAND, move |msg| {
            let command = match serde_json::from_slice::<SystemCommand>(&msg.payload) {
                Ok(command) => command,
                Err(e) => {
                    log::warn!("daemon: unparsable system command: {}", e);
                    return;
                }
            };
            log::info!(
                "daemon: {:?} {} (request {})",
                command.action,
                command.target,
                command.request_id
            );
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            let (success, message) = match command.action {
                SystemAction::Start => start_node(&mut state, &command.target),
                SystemAction::Stop => stop_node(&mut state, &command.target),
            };
            send_response(&bus, &command.request_id, success, &message);
        })?);

        let state = Arc::clone(&self.state);
        self.subscriptions.push(self.bus.subscribe(samvaad::NODE_STATUS_TOPIC, move |msg| {
            let Ok(status) = serde_json::from_slice::<NodeStatus>(&msg.payload) else {
                return;
            };
            state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .heartbeats
                .insert(status.node_name.clone(), (status, Instant::now()));
        })?);

        let bus = self.bus.clone();
        let state = Arc::clone(&self.state);
        self.worker = Some(Worker::spawn_periodic(
            "daemon-monitor",
            Duration::from_secs(1),
            move || {
                let status = {
                    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                    reap_children(&mut state);
                    build_system_status(&state)
                };
                let json = serde_json::to_vec(&status)?;
                bus.publish(topics::SYSTEM_STATUS, &json)
            },
        ));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "DaemonNode"));
        log::info!("daemon started, listening on {}", topics::SYSTEM_COMMAND);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut reporter) = self.reporter.take() {
            reporter.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }

        // Stop every child we launched.
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for (name, process) in state.processes.iter_mut() {
            if process.is_running {
                log::info!("daemon: stopping {} on shutdown", name);
                signal_terminate(process.child.id());
            }
        }
        for (_, process) in state.processes.iter_mut() {
            let _ = process.child.wait();
        }
        state.processes.clear();
        log::info!("daemon stopped");
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_response(bus: &Bus, request_id: &str, success: bool, message: &str) {
    if request_id.is_empty() {
        return;
    }
    let response = CommandResponse {
        request_id: request_id.to_string(),
        success,
        message: message.to_string(),
    };
    match serde_json::to_vec(&response) {
        Ok(json) => {
            if let Err(e) = bus.publish(topics::SYSTEM_RESPONSE, &json) {
                log::warn!("daemon: failed to publish response: {}", e);
            }
        }
        Err(e) => log::warn!("daemon: failed to serialize response: {}", e),
    }
}

/// Resolve a node name to its executable beside the daemon binary.
fn executable_path(node: &str) -> Option<PathBuf> {
    if !MANAGED_NODES.contains(&node) {
        return None;
    }
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(node))
}

fn start_node(state: &mut DaemonState, node: &str) -> (bool, String) {
    if state
        .processes
        .get(node)
        .map_or(false, |process| process.is_running)
    {
        return (false, format!("{} is already running", node));
    }
    let Some(path) = executable_path(node) else {
        return (false, format!("unknown node name: {}", node));
    };
    if !path.exists() {
        return (false, format!("executable not found at {}", path.display()));
    }

    match Command::new(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
    {
        Ok(child) => {
            let pid = child.id();
            state.processes.insert(
                node.to_string(),
                ManagedProcess {
                    child,
                    is_running: true,
                },
            );
            log::info!("daemon: started {} with pid {}", node, pid);
            (true, format!("started {} (pid {})", node, pid))
        }
        Err(e) => (false, format!("failed to start {}: {}", node, e)),
    }
}

fn stop_node(state: &mut DaemonState, node: &str) -> (bool, String) {
    match state.processes.get(node) {
        Some(process) if process.is_running => {
            if signal_terminate(process.child.id()) {
                log::info!("daemon: sent SIGTERM to {} (pid {})", node, process.child.id());
                (true, format!("stop signal sent to {}", node))
            } else {
                (false, format!("failed to signal {}", node))
            }
        }
        _ => (false, format!("{} is not running", node)),
    }
}

fn signal_terminate(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

/// Collect exit statuses without blocking; a reaped child flips to not
/// running and stays in the table so its last state remains visible.
fn reap_children(state: &mut DaemonState) {
    for (name, process) in state.processes.iter_mut() {
        if !process.is_running {
            continue;
        }
        match process.child.try_wait() {
            Ok(Some(exit)) => {
                log::info!("daemon: {} exited with {}", name, exit);
                process.is_running = false;
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("daemon: wait on {} failed: {}", name, e);
                process.is_running = false;
            }
        }
    }
}

/// Merge the process table with observed heartbeats into one record.
/// The process table is authoritative for `is_running`; the heartbeat's
/// own state rides along as `reported_state`.
fn build_system_status(state: &DaemonState) -> SystemStatus {
    let mut nodes = Vec::new();

    for (name, process) in &state.processes {
        let pid = process.child.id();
        let (cpu, mem) = if process.is_running {
            sample_process_stats(pid)
        } else {
            (0.0, 0.0)
        };
        let reported_state = state
            .heartbeats
            .get(name)
            .map(|(status, _)| format!("{:?}", status.state).to_uppercase());
        nodes.push(NodeProcessStatus {
            name: name.clone(),
            is_running: process.is_running,
            pid: Some(pid),
            cpu_usage: cpu,
            memory_usage: mem,
            reported_state,
        });
    }

    // Heartbeat-only nodes (started by hand, not by this daemon).
    for (name, (status, last_seen)) in &state.heartbeats {
        if state.processes.contains_key(name) {
            continue;
        }
        let alive = last_seen.elapsed() < Duration::from_millis(HEARTBEAT_STALE_MS);
        let (cpu, mem) = match status.pid {
            Some(pid) if alive => sample_process_stats(pid),
            _ => (0.0, 0.0),
        };
        nodes.push(NodeProcessStatus {
            name: name.clone(),
            is_running: alive,
            pid: status.pid,
            cpu_usage: cpu,
            memory_usage: mem,
            reported_state: Some(format!("{:?}", status.state).to_uppercase()),
        });
    }

    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    SystemStatus {
        timestamp_ms: now_ms(),
        nodes,
    }
}

/// CPU percent and resident MB for one PID via `ps`, the portable route
/// across Linux and macOS. Returns zeros when sampling fails.
fn sample_process_stats(pid: u32) -> (f32, f32) {
    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "%cpu=", "-o", "rss="])
        .output();
    match output {
        Ok(output) if output.status.success() => {
            parse_ps_line(&String::from_utf8_lossy(&output.stdout))
        }
        _ => (0.0, 0.0),
    }
}

fn parse_ps_line(line: &str) -> (f32, f32) {
    let mut fields = line.split_whitespace();
    let cpu = fields.next().and_then(|f| f.parse::<f32>().ok()).unwrap_or(0.0);
    let rss_kb = fields.next().and_then(|f| f.parse::<f32>().ok()).unwrap_or(0.0);
    (cpu, rss_kb / 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use samvaad::NodeState;

    #[test]
    fn test_ps_line_parsing() {
        let (cpu, mem) = parse_ps_line("  2.5  10240\n");
        assert!((cpu - 2.5).abs() < 1e-6);
        assert!((mem - 10.0).abs() < 1e-6);
        assert_eq!(parse_ps_line(""), (0.0, 0.0));
        assert_eq!(parse_ps_line("garbage fields"), (0.0, 0.0));
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        assert!(executable_path("rogue-binary").is_none());
        assert!(executable_path("planning").is_some());
    }

    #[test]
    fn test_heartbeat_only_nodes_appear_in_status() {
        let mut state = DaemonState::default();
        state.heartbeats.insert(
            "SensorNode".to_string(),
            (
                NodeStatus {
                    node_name: "SensorNode".to_string(),
                    state: NodeState::Warn,
                    message: "degraded".to_string(),
                    timestamp_ms: 1,
                    pid: None,
                    cpu_usage: None,
                    memory_usage: None,
                },
                Instant::now(),
            ),
        );
        let status = build_system_status(&state);
        assert_eq!(status.nodes.len(), 1);
        let node = &status.nodes[0];
        assert!(node.is_running);
        assert_eq!(node.reported_state.as_deref(), Some("WARN"));
    }

    #[test]
    fn test_stale_heartbeat_marks_node_down() {
        let mut state = DaemonState::default();
        state.heartbeats.insert(
            "MapNode".to_string(),
            (
                NodeStatus {
                    node_name: "MapNode".to_string(),
                    state: NodeState::Ok,
                    message: String::new(),
                    timestamp_ms: 1,
                    pid: None,
                    cpu_usage: None,
                    memory_usage: None,
                },
                Instant::now() - Duration::from_secs(10),
            ),
        );
        let status = build_system_status(&state);
        assert!(!status.nodes[0].is_running);
    }

    #[test]
    fn test_command_flow_over_local_bus() {
        let bus = Bus::local_only();
        let responses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&responses);
        bus.subscribe(topics::SYSTEM_RESPONSE, move |msg| {
            let response: CommandResponse = serde_json::from_slice(&msg.payload).unwrap();
            sink.lock().unwrap().push(response);
        })
        .unwrap();

        let mut daemon = Daemon::new(bus.clone());
        daemon.start().unwrap();

        bus.publish(
            topics::SYSTEM_COMMAND,
            br#"{"action":"start","target":"no-such-node","request_id":"r1"}"#,
        )
        .unwrap();
        bus.publish(
            topics::SYSTEM_COMMAND,
            br#"{"action":"stop","target":"planning","request_id":"r2"}"#,
        )
        .unwrap();

        daemon.stop();

        let seen = responses.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].success);
        assert!(seen[0].message.contains("unknown node"));
        assert!(!seen[1].success, "stopping a never-started node fails");
    }
}
