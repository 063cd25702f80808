//! Planning: Bézier paths to the user's target with obstacle avoidance.
//!
//! A cubic Bézier connects the ego pose to the active target, bending
//! around a blocking obstacle by shifting the endpoint one lane to the
//! left (the "nudge"). An obstacle too close for the nudge forces an
//! emergency stop: the path is still produced, with zero speed, so
//! control keeps tracking while the vehicle brakes.

use crate::config::PlanningConfig;
use samvaad::{now_ms, Bus, StatusReporter, SubscriptionId, Worker};
use sarathi_msgs::{
    topics, CarState, ObstacleSet, PlannedTrajectory, Point2, TrajectoryPoint, UserCommand,
    WorldState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lateral shift of the nudge maneuver: one lane width to the left.
const NUDGE_OFFSET: f64 = 3.5;

#[derive(Debug, Clone, Copy, Default)]
struct TargetPoint {
    x: f64,
    y: f64,
    active: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct FrontObstacle {
    position: Point2,
    /// Longitudinal distance in the ego frame.
    ahead: f64,
}

#[derive(Default)]
struct PlanState {
    pose: CarState,
    target: TargetPoint,
    front_obstacle: Option<FrontObstacle>,
}

pub struct Planning {
    bus: Bus,
    config: PlanningConfig,
    state: Arc<Mutex<PlanState>>,
    subscriptions: Vec<SubscriptionId>,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl Planning {
    pub fn new(bus: Bus, config: PlanningConfig) -> Planning {
        Planning {
            bus,
            config,
            state: Arc::new(Mutex::new(PlanState::default())),
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
        self.subscriptions.push(self.bus.subscribe(topics::VISUALIZER_CONTROL, move |msg| {
            if let Some(UserCommand::SetTarget { x, y }) = UserCommand::parse(&msg.payload) {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                state.target = TargetPoint { x, y, active: true };
                log::info!("planning: new target ({:.1}, {:.1})", x, y);
            }
        })?);

        let state = Arc::clone(&self.state);
        self.subscriptions.push(self.bus.subscribe(topics::VISUALIZER_DATA, move |msg| {
            if let Ok(world) = bincode::deserialize::<WorldState>(&msg.payload) {
                state.lock().unwrap_or_else(|e| e.into_inner()).pose = world.car;
            }
        })?);

        let state = Arc::clone(&self.state);
        self.subscriptions.push(self.bus.subscribe(topics::PERCEPTION_OBSTACLES, move |msg| {
            let Ok(set) = serde_json::from_slice::<ObstacleSet>(&msg.payload) else {
                return;
            };
            if !set.is_valid() {
                return;
            }
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            let front = closest_front_obstacle(&state.pose, &set);
            state.front_obstacle = front;
        })?);

        let bus = self.bus.clone();
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let mut frame_id = 0u64;
        self.worker = Some(Worker::spawn_periodic(
            "planning",
            Duration::from_millis(self.config.loop_rate_ms),
            move || {
                let points = {
                    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                    generate_trajectory(&mut state, &config)
                };
                let Some(points) = points else {
                    return Ok(());
                };
                frame_id += 1;
                let plan = PlannedTrajectory::new(frame_id, now_ms(), points);
                let json = serde_json::to_vec(&plan)?;
                bus.publish_large(topics::PLANNING_TRAJECTORY, &json)
            },
        ));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "PlanningNode"));
        log::info!("planning started");
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
        log::info!("planning stopped");
    }
}

impl Drop for Planning {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Nearest obstacle ahead of the ego and roughly in its corridor.
fn closest_front_obstacle(pose: &CarState, set: &ObstacleSet) -> Option<FrontObstacle> {
    let (sin_h, cos_h) = (-pose.heading).sin_cos();
    let mut best: Option<FrontObstacle> = None;

    for obstacle in &set.obstacles {
        let dx = obstacle.position.x - pose.position.x;
        let dy = obstacle.position.y - pose.position.y;
        let ahead = dx * cos_h - dy * sin_h;
        let lateral = dx * sin_h + dy * cos_h;

        // Corridor slightly wider than the vehicle.
        if ahead > 0.0 && lateral.abs() < 2.5 {
            if best.map_or(true, |b| ahead < b.ahead) {
                best = Some(FrontObstacle {
                    position: Point2::new(obstacle.position.x, obstacle.position.y),
                    ahead,
                });
            }
        }
    }
    best
}

/// Build the current plan, or None when no target is active.
///
/// Deactivates the target once within the reach threshold.
fn generate_trajectory(
    state: &mut PlanState,
    config: &PlanningConfig,
) -> Option<Vec<TrajectoryPoint>> {
    if !state.target.active {
        return None;
    }

    let start = state.pose.position;
    let end_x = state.target.x;
    let mut end_y = state.target.y;
    let mut target_speed = config.default_cruise_speed;

    if let Some(obstacle) = state.front_obstacle {
        let distance = start.distance_to(&obstacle.position);
        if obstacle.ahead < config.emergency_stop_distance {
            // No room to swerve; brake on the current line.
            target_speed = 0.0;
            log::warn!(
                "planning: emergency stop, obstacle {:.1} m ahead",
                obstacle.ahead
            );
        } else if distance < config.nudge_trigger_distance {
            end_y += NUDGE_OFFSET;
            log::info!(
                "planning: obstacle at {:.1} m, nudging left to y={:.1}",
                distance,
                end_y
            );
        }
    }

    let span = (end_x - start.x).hypot(end_y - start.y);
    if span < config.target_reach_threshold {
        state.target.active = false;
        log::info!("planning: target reached");
        return None;
    }

    Some(bezier_path(
        start,
        state.pose.heading,
        Point2::new(end_x, end_y),
        0.0,
        span,
        target_speed,
    ))
}

/// Cubic Bézier sampled along its length. Control points extend one third
/// of the span along the start and end headings.
fn bezier_path(
    start: Point2,
    start_heading: f64,
    end: Point2,
    end_heading: f64,
    span: f64,
    speed: f64,
) -> Vec<TrajectoryPoint> {
    let p1 = Point2::new(
        start.x + (span / 3.0) * start_heading.cos(),
        start.y + (span / 3.0) * start_heading.sin(),
    );
    let p2 = Point2::new(
        end.x - (span / 3.0) * end_heading.cos(),
        end.y - (span / 3.0) * end_heading.sin(),
    );

    let num_points = ((span * 2.0) as usize).clamp(10, 50);
    (0..=num_points)
        .map(|i| {
            let t = i as f64 / num_points as f64;
            let u = 1.0 - t;
            let (uu, tt) = (u * u, t * t);
            let (uuu, ttt) = (uu * u, tt * t);
            TrajectoryPoint {
                x: uuu * start.x + 3.0 * uu * t * p1.x + 3.0 * u * tt * p2.x + ttt * end.x,
                y: uuu * start.y + 3.0 * uu * t * p1.y + 3.0 * u * tt * p2.y + ttt * end.y,
                speed,
            }
        })
        .collect()
}
