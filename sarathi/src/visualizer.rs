//! Visualizer: bridges the bus to WebSocket front-end clients.
//!
//! Bus callbacks push events into a bounded queue; one consumer thread
//! drains the queue into a rolling world snapshot and broadcasts it to
//! every connected client at a fixed cadence. Shutdown pushes a sentinel
//! so the consumer wakes exactly once and exits.
//!
//! The connection set lives behind its own mutex. Broadcasts iterate
//! under that mutex with best-effort non-blocking writes: a slow client
//! misses frames, a broken one is dropped, and neither stalls the rest.
//!
//! Incoming client JSON is republished on the bus: vehicle commands on
//! `visualizer/control`, process control on `system/command`.

use crate::config::VisualizerConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use samvaad::{now_ms, Bus, StatusReporter, SubscriptionId};
use sarathi_msgs::{topics, CameraFrame, Detection2dArray, SystemCommand, UserCommand, WorldState};
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{accept, Message as WsMessage, WebSocket};

/// Queue depth between bus callbacks and the consumer. Full queue drops
/// the newest event; the snapshot catches up on the next one.
const EVENT_QUEUE_DEPTH: usize = 64;

enum Event {
    World(Box<WorldState>),
    CameraMeta(Value),
    Detections(Detection2dArray),
    Json(&'static str, Value),
    Shutdown,
}

#[derive(Default)]
struct Snapshot {
    world: Option<Value>,
    camera: Option<Value>,
    detections: Option<Value>,
    predictions: Option<Value>,
    trajectory: Option<Value>,
    lane_map: Option<Value>,
    system_status: Option<Value>,
}

impl Snapshot {
    fn to_json(&self) -> Value {
        json!({
            "type": "snapshot",
            "timestamp_ms": now_ms(),
            "world": self.world,
            "camera": self.camera,
            "detections": self.detections,
            "predictions": self.predictions,
            "trajectory": self.trajectory,
            "map": self.lane_map,
            "system_status": self.system_status,
        })
    }
}

struct Connection {
    id: u64,
    websocket: WebSocket<TcpStream>,
}

type ConnectionSet = Arc<Mutex<Vec<Connection>>>;

pub struct Visualizer {
    bus: Bus,
    config: VisualizerConfig,
    events: Sender<Event>,
    event_rx: Option<Receiver<Event>>,
    connections: ConnectionSet,
    running: Arc<AtomicBool>,
    subscriptions: Vec<SubscriptionId>,
    threads: Vec<JoinHandle<()>>,
    reporter: Option<StatusReporter>,
}

impl Visualizer {
    pub fn new(bus: Bus, config: VisualizerConfig) -> Visualizer {
        let (events, event_rx) = bounded(EVENT_QUEUE_DEPTH);
        Visualizer {
            bus,
            config,
            events,
            event_rx: Some(event_rx),
            connections: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            subscriptions: Vec::new(),
            threads: Vec::new(),
            reporter: None,
        }
    }

    pub fn start(&mut self) -> samvaad::Result<()> {
        let Some(event_rx) = self.event_rx.take() else {
            return Ok(()); // already started
        };
        self.running.store(true, Ordering::Relaxed);

        self.subscribe_bus_topics()?;

        // Consumer: queue -> snapshot -> broadcast.
        let connections = Arc::clone(&self.connections);
        let bus = self.bus.clone();
        let interval = Duration::from_millis(self.config.snapshot_interval_ms);
        match thread::Builder::new().name("viz-consumer".to_string()).spawn(move || {
            consumer_loop(event_rx, connections, bus, interval);
        }) {
            Ok(handle) => self.threads.push(handle),
            Err(e) => log::error!("visualizer: failed to spawn consumer: {}", e),
        }

        // Accept pool: one listener thread, connections appended to the
        // shared set.
        let listener = TcpListener::bind(&self.config.ws_bind)?;
        listener.set_nonblocking(true)?;
        log::info!("visualizer: websocket listening on {}", self.config.ws_bind);

        let connections = Arc::clone(&self.connections);
        let running = Arc::clone(&self.running);
        match thread::Builder::new().name("viz-accept".to_string()).spawn(move || {
            accept_loop(listener, connections, running);
        }) {
            Ok(handle) => self.threads.push(handle),
            Err(e) => log::error!("visualizer: failed to spawn acceptor: {}", e),
        }

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "VisualizerNode"));
        log::info!("visualizer started");
        Ok(())
    }

    fn subscribe_bus_topics(&mut self) -> samvaad::Result<()> {
        let events = self.events.clone();
        self.subscriptions.push(self.bus.subscribe(topics::VISUALIZER_DATA, move |msg| {
            if let Ok(world) = bincode::deserialize::<WorldState>(&msg.payload) {
                events.try_send(Event::World(Box::new(world))).ok();
            }
        })?);

        let events = self.events.clone();
        self.subscriptions.push(self.bus.subscribe(topics::CAMERA_FRONT, move |msg| {
            let Ok(frame) = bincode::deserialize::<CameraFrame>(&msg.payload) else {
                return;
            };
            // The raw image stays out of the front-end snapshot; clients
            // only need the frame geometry and freshness.
            let meta = json!({
                "timestamp_ms": frame.timestamp_ms,
                "width": frame.image_width,
                "height": frame.image_height,
                "format": frame.image_format,
                "image_bytes": frame.image.len(),
                "objects": frame.objects.len(),
            });
            events.try_send(Event::CameraMeta(meta)).ok();
        })?);

        let events = self.events.clone();
        self.subscriptions.push(self.bus.subscribe(topics::DETECTION_2D, move |msg| {
            if let Ok(detections) = bincode::deserialize::<Detection2dArray>(&msg.payload) {
                events.try_send(Event::Detections(detections)).ok();
            }
        })?);

        for (topic, slot) in [
            (topics::PREDICTION_TRAJECTORIES, "predictions"),
            (topics::PLANNING_TRAJECTORY, "trajectory"),
            (topics::VISUALIZER_MAP, "map"),
            (topics::SYSTEM_STATUS, "system_status"),
        ] {
            let events = self.events.clone();
            self.subscriptions.push(self.bus.subscribe(topic, move |msg| {
                match serde_json::from_slice::<Value>(&msg.payload) {
                    Ok(value) => {
                        events.try_send(Event::Json(slot, value)).ok();
                    }
                    Err(e) => log::warn!("visualizer: bad JSON on {}: {}", msg.topic, e),
                }
            })?);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::Relaxed) && self.threads.is_empty() {
            return;
        }
        if let Some(mut reporter) = self.reporter.take() {
            reporter.stop();
        }
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        // Producers are gone; the sentinel is the last event the
        // consumer will ever see.
        self.events.send(Event::Shutdown).ok();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.connections.lock().unwrap_or_else(|e| e.into_inner()).clear();
        log::info!("visualizer stopped");
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, connections: ConnectionSet, running: Arc<AtomicBool>) {
    let next_id = AtomicU64::new(1);
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                // Handshake on a blocking stream, then switch to
                // non-blocking for best-effort reads/writes.
                if let Err(e) = stream.set_nonblocking(false) {
                    log::warn!("visualizer: socket setup failed for {}: {}", addr, e);
                    continue;
                }
                match accept(stream) {
                    Ok(websocket) => {
                        if let Err(e) = websocket.get_ref().set_nonblocking(true) {
                            log::warn!("visualizer: {} left blocking: {}", addr, e);
                        }
                        let id = next_id.fetch_add(1, Ordering::Relaxed);
                        log::info!("visualizer: client {} connected from {}", id, addr);
                        connections
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(Connection { id, websocket });
                    }
                    Err(e) => log::warn!("visualizer: handshake with {} failed: {}", addr, e),
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                log::warn!("visualizer: accept error: {}", e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn consumer_loop(
    events: Receiver<Event>,
    connections: ConnectionSet,
    bus: Bus,
    interval: Duration,
) {
    let mut snapshot = Snapshot::default();
    loop {
        // Block up to one broadcast interval for the next event, then
        // drain whatever else queued up behind it.
        let first = events.recv_timeout(interval);
        let mut shutdown = false;
        match first {
            Ok(event) => shutdown |= fold_event(&mut snapshot, event),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
        while let Ok(event) = events.try_recv() {
            shutdown |= fold_event(&mut snapshot, event);
        }
        if shutdown {
            break;
        }

        let text = snapshot.to_json().to_string();
        broadcast_and_poll(&connections, &bus, &text);
    }
    log::info!("visualizer consumer stopped");
}

/// Returns true when the event is the shutdown sentinel.
fn fold_event(snapshot: &mut Snapshot, event: Event) -> bool {
    match event {
        Event::World(world) => match serde_json::to_value(&*world) {
            Ok(value) => snapshot.world = Some(value),
            Err(e) => log::warn!("visualizer: world serialization failed: {}", e),
        },
        Event::CameraMeta(meta) => snapshot.camera = Some(meta),
        Event::Detections(detections) => match serde_json::to_value(&detections) {
            Ok(value) => snapshot.detections = Some(value),
            Err(e) => log::warn!("visualizer: detection serialization failed: {}", e),
        },
        Event::Json(slot, value) => match slot {
            "predictions" => snapshot.predictions = Some(value),
            "trajectory" => snapshot.trajectory = Some(value),
            "map" => snapshot.lane_map = Some(value),
            "system_status" => snapshot.system_status = Some(value),
            _ => {}
        },
        Event::Shutdown => return true,
    }
    false
}

/// One pass over the connection set: drain any pending client commands,
/// push the current snapshot, drop connections that broke.
fn broadcast_and_poll(connections: &ConnectionSet, bus: &Bus, text: &str) {
    let mut connections = connections.lock().unwrap_or_else(|e| e.into_inner());
    connections.retain_mut(|connection| {
        // Reads first so a command sent just before a broadcast is not
        // delayed a full interval.
        loop {
            match connection.websocket.read() {
                Ok(WsMessage::Text(text)) => handle_client_message(bus, text.as_bytes()),
                Ok(WsMessage::Close(_)) => {
                    log::info!("visualizer: client {} disconnected", connection.id);
                    return false;
                }
                Ok(_) => {} // ping/pong/binary ignored
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    break;
                }
                Err(e) => {
                    log::info!("visualizer: client {} read failed: {}", connection.id, e);
                    return false;
                }
            }
        }

        match connection.websocket.send(WsMessage::Text(text.to_string())) {
            Ok(()) => true,
            Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                // Client is slow; skip this frame, keep the connection.
                true
            }
            Err(e) => {
                log::info!("visualizer: dropping client {}: {}", connection.id, e);
                false
            }
        }
    });
}

/// Route one client JSON message onto the bus.
fn handle_client_message(bus: &Bus, payload: &[u8]) {
    if UserCommand::parse(payload).is_some() {
        if let Err(e) = bus.publish(topics::VISUALIZER_CONTROL, payload) {
            log::warn!("visualizer: failed to publish user command: {}", e);
        }
        return;
    }
    if serde_json::from_slice::<SystemCommand>(payload).is_ok() {
        if let Err(e) = bus.publish(topics::SYSTEM_COMMAND, payload) {
            log::warn!("visualizer: failed to publish system command: {}", e);
        }
        return;
    }
    log::debug!("visualizer: ignoring unknown client message");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sarathi_msgs::CarState;

    #[test]
    fn test_snapshot_folds_latest_of_each_kind() {
        let mut snapshot = Snapshot::default();
        let world = WorldState {
            frame_id: 1,
            timestamp_ms: 2,
            car: CarState::default(),
            obstacles: vec![],
        };
        assert!(!fold_event(&mut snapshot, Event::World(Box::new(world.clone()))));
        let newer = WorldState {
            frame_id: 9,
            ..world
        };
        assert!(!fold_event(&mut snapshot, Event::World(Box::new(newer))));
        assert!(!fold_event(
            &mut snapshot,
            Event::Json("map", json!({"type": "map_data"}))
        ));

        let value = snapshot.to_json();
        assert_eq!(value["world"]["frame_id"], 9);
        assert_eq!(value["map"]["type"], "map_data");
        assert!(value["predictions"].is_null());
    }

    #[test]
    fn test_shutdown_sentinel_is_terminal() {
        let mut snapshot = Snapshot::default();
        assert!(fold_event(&mut snapshot, Event::Shutdown));
    }

    #[test]
    fn test_client_commands_reach_the_bus() {
        let bus = Bus::local_only();
        let user_commands = Arc::new(Mutex::new(Vec::new()));
        let system_commands = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&user_commands);
        bus.subscribe(topics::VISUALIZER_CONTROL, move |msg| {
            sink.lock().unwrap().push(UserCommand::parse(&msg.payload));
        })
        .unwrap();
        let sink = Arc::clone(&system_commands);
        bus.subscribe(topics::SYSTEM_COMMAND, move |msg| {
            let cmd: SystemCommand = serde_json::from_slice(&msg.payload).unwrap();
            sink.lock().unwrap().push(cmd.target);
        })
        .unwrap();

        handle_client_message(&bus, br#"{"cmd":"set_speed","value":3.0}"#);
        handle_client_message(&bus, br#"{"action":"start","target":"planning"}"#);
        handle_client_message(&bus, br#"{"gibberish":true}"#);

        assert_eq!(
            *user_commands.lock().unwrap(),
            vec![Some(UserCommand::SetSpeed(3.0))]
        );
        assert_eq!(*system_commands.lock().unwrap(), vec!["planning".to_string()]);
    }

    #[test]
    fn test_event_queue_drops_overflow_without_blocking() {
        let (tx, _rx) = bounded::<Event>(2);
        assert!(tx.try_send(Event::Shutdown).is_ok());
        assert!(tx.try_send(Event::Shutdown).is_ok());
        assert!(tx.try_send(Event::Shutdown).is_err());
    }
}
