//! Vehicle simulator: ground-truth physics and the scenario.
//!
//! Runs a bicycle-model integration at 100 Hz and publishes the world
//! state every 5th tick, so downstream consumers see a steady 20 Hz
//! without the physics losing resolution. Actuation targets come from
//! control on `control/command`; the front-end can reset the scenario
//! through `visualizer/control`.

use crate::config::SimulatorConfig;
use samvaad::{now_ms, Bus, StatusReporter, SubscriptionId, Worker};
use sarathi_msgs::{topics, ActuationCommand, CarState, Obstacle, Point2, UserCommand, WorldState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Constant-velocity motion of a dynamic obstacle plus its respawn pose.
#[derive(Debug, Clone, Copy)]
struct DynamicMotion {
    vx: f64,
    vy: f64,
    heading: f64,
    spawn: Point2,
}

struct SimState {
    world: WorldState,
    dynamics: HashMap<u32, DynamicMotion>,
    target_speed: f64,
    target_steering: f64,
    publish_counter: u32,
}

pub struct Simulator {
    bus: Bus,
    config: SimulatorConfig,
    state: Arc<Mutex<SimState>>,
    subscriptions: Vec<SubscriptionId>,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl Simulator {
    pub fn new(bus: Bus, config: SimulatorConfig) -> Simulator {
        Simulator {
            bus,
            config,
            state: Arc::new(Mutex::new(initial_scenario())),
            subscriptions: Vec::new(),
            worker: None,
            reporter: None,
        }
    }

    /// Idempotent. Subscriptions are registered before the physics worker
    /// spawns so no early command is missed.
    pub fn start(&mut self) -> samvaad::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        self.subscriptions.push(self.bus.subscribe(topics::CONTROL_COMMAND, move |msg| {
            let Ok(cmd) = bincode::deserialize::<ActuationCommand>(&msg.payload) else {
                log::warn!("simulator: undecodable control command");
                return;
            };
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.target_speed = cmd.speed;
            state.target_steering = cmd.steering;
        })?);

        let state = Arc::clone(&self.state);
        self.subscriptions.push(self.bus.subscribe(topics::VISUALIZER_CONTROL, move |msg| {
            if let Some(UserCommand::Reset) = UserCommand::parse(&msg.payload) {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                reset_vehicle(&mut state);
                log::info!("simulator: reset vehicle to origin");
            }
        })?);

        let bus = self.bus.clone();
        let state = Arc::clone(&self.state);
        let dt = self.config.physics_rate_ms as f64 / 1000.0;
        let publish_interval = self.config.publish_interval_ticks.max(1);
        let wheelbase = self.config.wheelbase;
        let period = Duration::from_millis(self.config.physics_rate_ms);

        self.worker = Some(Worker::spawn_periodic("simulator", period, move || {
            let payload = {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                step_physics(&mut state, dt, wheelbase);

                state.publish_counter += 1;
                if state.publish_counter < publish_interval {
                    None
                } else {
                    state.publish_counter = 0;
                    state.world.frame_id += 1;
                    state.world.timestamp_ms = now_ms();
                    match bincode::serialize(&state.world) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            log::warn!("simulator: failed to serialize world state: {}", e);
                            None
                        }
                    }
                }
            };
            if let Some(payload) = payload {
                bus.publish(topics::VISUALIZER_DATA, &payload)?;
            }
            Ok(())
        }));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "SimulatorNode"));
        log::info!(
            "simulator started: physics {} Hz, publishing every {} ticks",
            1000 / self.config.physics_rate_ms.max(1),
            publish_interval
        );
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
        log::info!("simulator stopped");
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The demo scenario: a blocking car dead ahead, a slow car in the left
/// lane, an oncoming car in the right lane.
fn initial_scenario() -> SimState {
    let mut dynamics = HashMap::new();
    dynamics.insert(
        2,
        DynamicMotion {
            vx: 3.0,
            vy: 0.0,
            heading: 0.0,
            spawn: Point2::new(50.0, 3.5),
        },
    );
    dynamics.insert(
        3,
        DynamicMotion {
            vx: -5.0,
            vy: 0.0,
            heading: std::f64::consts::PI,
            spawn: Point2::new(80.0, -3.5),
        },
    );

    let obstacles = vec![
        car_obstacle(1, Point2::new(30.0, 0.0), 0.0),
        car_obstacle(2, Point2::new(50.0, 3.5), 0.0),
        car_obstacle(3, Point2::new(80.0, -3.5), std::f64::consts::PI),
    ];

    SimState {
        world: WorldState {
            frame_id: 0,
            timestamp_ms: 0,
            car: CarState::default(),
            obstacles,
        },
        dynamics,
        target_speed: 0.0,
        target_steering: 0.0,
        publish_counter: 0,
    }
}

fn car_obstacle(id: u32, position: Point2, heading: f64) -> Obstacle {
    Obstacle {
        id,
        position,
        heading,
        length: 4.5,
        width: 1.8,
        kind: "car".to_string(),
    }
}

fn reset_vehicle(state: &mut SimState) {
    state.world.car = CarState::default();
    state.target_speed = 0.0;
    state.target_steering = 0.0;
}

/// One physics step: first-order speed lag, instant steering, bicycle
/// kinematics, then the dynamic obstacles.
fn step_physics(state: &mut SimState, dt: f64, wheelbase: f64) {
    let car = &mut state.world.car;

    let speed_diff = state.target_speed - car.speed;
    car.speed += speed_diff * dt * 2.0;
    car.steering_angle = state.target_steering;

    let (sin_h, cos_h) = car.heading.sin_cos();
    car.position.x += car.speed * cos_h * dt;
    car.position.y += car.speed * sin_h * dt;
    car.heading += (car.speed / wheelbase) * car.steering_angle.tan() * dt;

    for obstacle in &mut state.world.obstacles {
        let Some(motion) = state.dynamics.get(&obstacle.id) else {
            continue;
        };
        obstacle.position.x += motion.vx * dt;
        obstacle.position.y += motion.vy * dt;
        obstacle.heading = motion.heading;

        // Loop the scenario: runaway obstacles respawn at their start.
        if obstacle.position.x > 150.0 || obstacle.position.x < -50.0 {
            obstacle.position = motion.spawn;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_converges_to_target() {
        let mut state = initial_scenario();
        state.target_speed = 10.0;
        for _ in 0..500 {
            step_physics(&mut state, 0.01, 2.8);
        }
        assert!((state.world.car.speed - 10.0).abs() < 0.1);
        assert!(state.world.car.position.x > 0.0);
        assert!(state.world.car.position.y.abs() < 1e-9);
    }

    #[test]
    fn test_steering_turns_the_vehicle() {
        let mut state = initial_scenario();
        state.target_speed = 5.0;
        state.target_steering = 0.3;
        for _ in 0..200 {
            step_physics(&mut state, 0.01, 2.8);
        }
        assert!(state.world.car.heading > 0.1);
        assert!(state.world.car.position.y > 0.0);
    }

    #[test]
    fn test_dynamic_obstacles_move_and_respawn() {
        let mut state = initial_scenario();
        let start_x = state.world.obstacles[1].position.x;
        step_physics(&mut state, 0.01, 2.8);
        assert!(state.world.obstacles[1].position.x > start_x);
        // Static obstacle 1 never moves.
        assert!((state.world.obstacles[0].position.x - 30.0).abs() < 1e-9);

        // Push the slow car past the scenario bound; it respawns.
        state.world.obstacles[1].position.x = 151.0;
        step_physics(&mut state, 0.01, 2.8);
        assert!((state.world.obstacles[1].position.x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restores_origin() {
        let mut state = initial_scenario();
        state.target_speed = 10.0;
        for _ in 0..100 {
            step_physics(&mut state, 0.01, 2.8);
        }
        reset_vehicle(&mut state);
        assert!(state.world.car.position.x.abs() < 1e-9);
        assert!(state.world.car.speed.abs() < 1e-9);
        assert!(state.target_speed.abs() < f64::EPSILON);
    }

    #[test]
    fn test_node_publishes_world_state_on_bus() {
        let bus = Bus::local_only();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        bus.subscribe(topics::VISUALIZER_DATA, move |msg| {
            let world: WorldState = bincode::deserialize(&msg.payload).unwrap();
            sink.lock().unwrap().push(world.frame_id);
        })
        .unwrap();

        let mut simulator = Simulator::new(bus.clone(), SimulatorConfig::default());
        simulator.start().unwrap();
        simulator.start().unwrap(); // idempotent
        std::thread::sleep(Duration::from_millis(200));
        simulator.stop();

        let seen = frames.lock().unwrap();
        assert!(!seen.is_empty(), "no world state published");
        // Frame ids are strictly increasing.
        assert!(seen.windows(2).all(|w| w[1] > w[0]));
    }
}
