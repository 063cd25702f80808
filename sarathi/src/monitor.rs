//! Monitor: terminal dashboard for bus traffic and node health.
//!
//! Subscribes to the demonstrator's main topics, meters each one
//! (rate, message and byte counters, freshness), and redraws an ANSI
//! dashboard once per second: vehicle state, the daemon's node table,
//! and the per-topic traffic panel.

use samvaad::{Bus, StatusReporter, SubscriptionId, Worker};
use sarathi_msgs::{topics, SystemStatus, WorldState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Which dashboard panels to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    All,
    TopicStatus,
    NodeStatus,
}

impl MonitorMode {
    /// "topics" / "nodes" select a single panel; anything else shows all.
    pub fn from_arg(arg: Option<&str>) -> MonitorMode {
        match arg {
            Some("topics") => MonitorMode::TopicStatus,
            Some("nodes") => MonitorMode::NodeStatus,
            _ => MonitorMode::All,
        }
    }
}

#[derive(Debug, Clone)]
struct TopicStats {
    count: u64,
    bytes: u64,
    last_msg: Instant,
    window_start: Instant,
    msgs_in_window: u32,
    current_hz: f32,
}

impl TopicStats {
    fn new(now: Instant) -> TopicStats {
        TopicStats {
            count: 0,
            bytes: 0,
            last_msg: now,
            window_start: now,
            msgs_in_window: 0,
            current_hz: 0.0,
        }
    }

    fn record(&mut self, bytes: usize, now: Instant) {
        self.count += 1;
        self.bytes += bytes as u64;
        self.last_msg = now;
        self.msgs_in_window += 1;

        let window = now.duration_since(self.window_start);
        if window >= Duration::from_secs(1) {
            self.current_hz = self.msgs_in_window as f32 / window.as_secs_f32();
            self.msgs_in_window = 0;
            self.window_start = now;
        }
    }

    fn status(&self, now: Instant, topic: &str) -> &'static str {
        let idle = now.duration_since(self.last_msg);
        if idle > Duration::from_secs(5) {
            "OFFLINE"
        } else if idle > Duration::from_secs(1) {
            "IDLE"
        } else if topic == topics::VISUALIZER_DATA && self.current_hz > 0.0 && self.current_hz < 5.0
        {
            "LOW FPS"
        } else {
            "ACTIVE"
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct VehicleDashboard {
    has_data: bool,
    frame_id: u64,
    x: f64,
    y: f64,
    speed: f64,
    obstacle_count: usize,
}

#[derive(Default)]
struct MonitorState {
    topics: HashMap<String, TopicStats>,
    vehicle: VehicleDashboard,
    system: Option<SystemStatus>,
}

pub struct Monitor {
    bus: Bus,
    mode: MonitorMode,
    state: Arc<Mutex<MonitorState>>,
    subscriptions: Vec<SubscriptionId>,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl Monitor {
    pub fn new(bus: Bus, mode: MonitorMode) -> Monitor {
        Monitor {
            bus,
            mode,
            state: Arc::new(Mutex::new(MonitorState::default())),
            subscriptions: Vec::new(),
            worker: None,
            reporter: None,
        }
    }

    pub fn start(&mut self) -> samvaad::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let metered = [
            topics::VISUALIZER_DATA,
            topics::VISUALIZER_CONTROL,
            topics::CAMERA_FRONT,
            topics::PERCEPTION_OBSTACLES,
            topics::PREDICTION_TRAJECTORIES,
            topics::PLANNING_TRAJECTORY,
            topics::CONTROL_COMMAND,
            topics::SYSTEM_STATUS,
            samvaad::NODE_STATUS_TOPIC,
        ];
        for topic in metered {
            let state = Arc::clone(&self.state);
            self.subscriptions.push(self.bus.subscribe(topic, move |msg| {
                let now = Instant::now();
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                state
                    .topics
                    .entry(msg.topic.clone())
                    .or_insert_with(|| TopicStats::new(now))
                    .record(msg.payload.len(), now);

                match msg.topic.as_str() {
                    topics::VISUALIZER_DATA => {
                        if let Ok(world) = bincode::deserialize::<WorldState>(&msg.payload) {
                            state.vehicle = VehicleDashboard {
                                has_data: true,
                                frame_id: world.frame_id,
                                x: world.car.position.x,
                                y: world.car.position.y,
                                speed: world.car.speed,
                                obstacle_count: world.obstacles.len(),
                            };
                        }
                    }
                    topics::SYSTEM_STATUS => {
                        if let Ok(status) = serde_json::from_slice::<SystemStatus>(&msg.payload) {
                            state.system = Some(status);
                        }
                    }
                    _ => {}
                }
            })?);
        }

        let state = Arc::clone(&self.state);
        let mode = self.mode;
        self.worker = Some(Worker::spawn_periodic(
            "monitor-render",
            Duration::from_secs(1),
            move || {
                let rendered = {
                    let state = state.lock().unwrap_or_else(|e| e.into_inner());
                    render(&state, mode, Instant::now())
                };
                // Clear screen, home cursor, repaint.
                print!("\x1b[2J\x1b[1;1H{}", rendered);
                use std::io::Write;
                std::io::stdout().flush().ok();
                Ok(())
            },
        ));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "MonitorNode"));
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
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render(state: &MonitorState, mode: MonitorMode, now: Instant) -> String {
    let mut out = String::new();
    out.push_str("=== Sarathi System Monitor ===\n");
    out.push_str("----------------------------------------------------------------\n");

    if mode == MonitorMode::All {
        out.push_str(">>> Vehicle Dashboard\n");
        if state.vehicle.has_data {
            out.push_str(&format!(
                "Speed:    {:>5.1} m/s   Obstacles: {}\n",
                state.vehicle.speed, state.vehicle.obstacle_count
            ));
            out.push_str(&format!(
                "Position: ({:.1}, {:.1})   Frame: {}\n",
                state.vehicle.x, state.vehicle.y, state.vehicle.frame_id
            ));
        } else {
            out.push_str("(waiting for vehicle data...)\n");
        }
        out.push('\n');
    }

    if mode != MonitorMode::TopicStatus {
        out.push_str(">>> Node Status (reported by daemon)\n");
        out.push_str(&format!(
            "{:<16}{:<10}{:<8}{:<8}{:<9}{}\n",
            "NODE", "STATE", "PID", "%CPU", "MEM(MB)", "REPORTED"
        ));
        match &state.system {
            Some(system) if !system.nodes.is_empty() => {
                for node in &system.nodes {
                    let state_str = if node.is_running {
                        "\x1b[32mRUNNING\x1b[0m"
                    } else {
                        "\x1b[31mSTOPPED\x1b[0m"
                    };
                    out.push_str(&format!(
                        "{:<16}{:<19}{:<8}{:<8.1}{:<9.1}{}\n",
                        node.name,
                        state_str, // width includes the escape codes
                        node.pid.map_or_else(|| "-".to_string(), |p| p.to_string()),
                        node.cpu_usage,
                        node.memory_usage,
                        node.reported_state.as_deref().unwrap_or("-"),
                    ));
                }
            }
            _ => out.push_str("(no daemon status received)\n"),
        }
        out.push('\n');
    }

    if mode != MonitorMode::NodeStatus {
        out.push_str(">>> Network Traffic\n");
        out.push_str(&format!(
            "{:<28}{:<8}{:<10}{:<12}{}\n",
            "TOPIC", "HZ", "MSGS", "BYTES", "STATUS"
        ));
        let mut names: Vec<&String> = state.topics.keys().collect();
        names.sort();
        for name in names {
            let stats = &state.topics[name];
            out.push_str(&format!(
                "{:<28}{:<8.1}{:<10}{:<12}{}\n",
                name,
                stats.current_hz,
                stats.count,
                stats.bytes,
                stats.status(now, name)
            ));
        }
    }

    out.push_str("----------------------------------------------------------------\n");
    out.push_str("Press Ctrl+C to exit.\n");
    out
}
