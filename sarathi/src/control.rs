//! Control: pure-pursuit tracking of the planned trajectory.
//!
//! Picks a lookahead point along the latest plan and steers toward it
//! with the classic pure-pursuit law; speed comes from the trajectory
//! sample. The front-end can override with manual speed/steer commands
//! or stop the vehicle outright. Output is one `ActuationCommand` per
//! control tick on `control/command`.

use crate::config::ControlConfig;
use samvaad::{Bus, StatusReporter, SubscriptionId, Worker};
use sarathi_msgs::{
    topics, ActuationCommand, CarState, PlannedTrajectory, TrajectoryPoint, UserCommand,
    WorldState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ControlState {
    pose: CarState,
    trajectory: Vec<TrajectoryPoint>,
    /// Manual overrides from the front-end; `None` means autonomous.
    manual_speed: Option<f64>,
    manual_steer: Option<f64>,
}

pub struct Control {
    bus: Bus,
    config: ControlConfig,
    state: Arc<Mutex<ControlState>>,
    subscriptions: Vec<SubscriptionId>,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl Control {
    pub fn new(bus: Bus, config: ControlConfig) -> Control {
        Control {
            bus,
            config,
            state: Arc::new(Mutex::new(ControlState::default())),
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
        self.subscriptions.push(self.bus.subscribe(topics::VISUALIZER_DATA, move |msg| {
            if let Ok(world) = bincode::deserialize::<WorldState>(&msg.payload) {
                state.lock().unwrap_or_else(|e| e.into_inner()).pose = world.car;
            }
        })?);

        let state = Arc::clone(&self.state);
        self.subscriptions.push(self.bus.subscribe(topics::PLANNING_TRAJECTORY, move |msg| {
            let Ok(plan) = serde_json::from_slice::<PlannedTrajectory>(&msg.payload) else {
                log::warn!("control: unparsable trajectory");
                return;
            };
            if !plan.is_valid() {
                return;
            }
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.trajectory = plan.points;
            // A fresh plan resumes autonomous tracking.
            state.manual_speed = None;
            state.manual_steer = None;
        })?);

        let state = Arc::clone(&self.state);
        self.subscriptions.push(self.bus.subscribe(topics::VISUALIZER_CONTROL, move |msg| {
            let Some(cmd) = UserCommand::parse(&msg.payload) else {
                return;
            };
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            match cmd {
                UserCommand::SetSpeed(v) => {
                    state.manual_speed = Some(v.clamp(0.0, 30.0));
                    log::info!("control: manual speed {:.1}", v);
                }
                UserCommand::SetSteer(v) => {
                    state.manual_steer = Some(v);
                    log::info!("control: manual steer {:.2}", v);
                }
                UserCommand::Stop => {
                    state.trajectory.clear();
                    state.manual_speed = Some(0.0);
                    state.manual_steer = Some(0.0);
                    log::info!("control: stop requested");
                }
                UserCommand::Reset => {
                    *state = ControlState::default();
                    log::info!("control: reset");
                }
                UserCommand::SetTarget { .. } => {} // planning's business
            }
        })?);

        let bus = self.bus.clone();
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        self.worker = Some(Worker::spawn_periodic(
            "control",
            Duration::from_millis(self.config.loop_rate_ms),
            move || {
                let command = {
                    let state = state.lock().unwrap_or_else(|e| e.into_inner());
                    compute_command(&state, &config)
                };
                match bincode::serialize(&command) {
                    Ok(bytes) => bus.publish(topics::CONTROL_COMMAND, &bytes),
                    Err(e) => {
                        log::warn!("control: failed to serialize command: {}", e);
                        Ok(())
                    }
                }
            },
        ));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "ControlNode"));
        log::info!("control started");
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
        log::info!("control stopped");
    }
}

impl Drop for Control {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One actuation decision from the current state.
fn compute_command(state: &ControlState, config: &ControlConfig) -> ActuationCommand {
    // Manual overrides beat the tracker.
    if state.manual_speed.is_some() || state.manual_steer.is_some() {
        return ActuationCommand {
            speed: state.manual_speed.unwrap_or(0.0).clamp(0.0, config.max_speed),
            steering: state
                .manual_steer
                .unwrap_or(0.0)
                .clamp(-config.max_steer, config.max_steer),
        };
    }

    let Some(target) = lookahead_point(state, config) else {
        // No plan: command zero so the simulator coasts to a stop.
        return ActuationCommand::default();
    };

    let steering = pure_pursuit_steering(&state.pose, target, config);
    ActuationCommand {
        speed: target.speed.clamp(0.0, config.max_speed),
        steering,
    }
}

/// First trajectory point at least `lookahead_distance` ahead of the
/// vehicle, falling back to the last point near the end of the plan.
fn lookahead_point<'a>(
    state: &'a ControlState,
    config: &ControlConfig,
) -> Option<&'a TrajectoryPoint> {
    let pose = &state.pose;
    state
        .trajectory
        .iter()
        .find(|p| (p.x - pose.position.x).hypot(p.y - pose.position.y) >= config.lookahead_distance)
        .or_else(|| state.trajectory.last())
}

/// Pure pursuit: steering = atan2(2 L sin(alpha), d), clamped.
fn pure_pursuit_steering(pose: &CarState, target: &TrajectoryPoint, config: &ControlConfig) -> f64 {
    let dx = target.x - pose.position.x;
    let dy = target.y - pose.position.y;
    let distance = dx.hypot(dy);
    if distance < 1e-6 {
        return 0.0;
    }

    let mut alpha = dy.atan2(dx) - pose.heading;
    while alpha > std::f64::consts::PI {
        alpha -= 2.0 * std::f64::consts::PI;
    }
    while alpha < -std::f64::consts::PI {
        alpha += 2.0 * std::f64::consts::PI;
    }

    let steer = (2.0 * config.wheelbase * alpha.sin()).atan2(distance);
    steer.clamp(-config.max_steer, config.max_steer)
}
