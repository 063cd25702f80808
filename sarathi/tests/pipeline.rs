//! The full node pipeline in one process on a local-only bus.
//!
//! simulator -> sensor -> perception -> {prediction, planning} ->
//! control -> simulator. Setting a target through `visualizer/control`
//! must close the loop: plans appear, actuation flows, and the simulated
//! vehicle actually moves.

use samvaad::Bus;
use sarathi::config::NodeConfig;
use sarathi::control::Control;
use sarathi::daemon::Daemon;
use sarathi::map::MapServer;
use sarathi::perception::Perception;
use sarathi::planning::Planning;
use sarathi::prediction::Prediction;
use sarathi::sensor::Sensor;
use sarathi::simulator::Simulator;
use sarathi_msgs::{
    topics, ActuationCommand, LaneMap, ObstacleSet, PlannedTrajectory, PredictionSet, UserCommand,
    WorldState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn closed_loop_drives_the_vehicle() {
    let bus = Bus::local_only();
    let config = NodeConfig::default();

    let world_xs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&world_xs);
    bus.subscribe(topics::VISUALIZER_DATA, move |msg| {
        if let Ok(world) = bincode::deserialize::<WorldState>(&msg.payload) {
            sink.lock().unwrap().push(world.car.position.x);
        }
    })
    .unwrap();

    let obstacle_sets = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&obstacle_sets);
    bus.subscribe(topics::PERCEPTION_OBSTACLES, move |msg| {
        let set: ObstacleSet = serde_json::from_slice(&msg.payload).unwrap();
        assert!(set.is_valid());
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let plans = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&plans);
    bus.subscribe(topics::PLANNING_TRAJECTORY, move |msg| {
        let plan: PlannedTrajectory = serde_json::from_slice(&msg.payload).unwrap();
        assert!(plan.is_valid());
        assert!(!plan.points.is_empty());
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let predictions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&predictions);
    bus.subscribe(topics::PREDICTION_TRAJECTORIES, move |msg| {
        let set: PredictionSet = serde_json::from_slice(&msg.payload).unwrap();
        assert!(set.is_valid());
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let driven_commands = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&driven_commands);
    bus.subscribe(topics::CONTROL_COMMAND, move |msg| {
        let command: ActuationCommand = bincode::deserialize(&msg.payload).unwrap();
        if command.speed > 0.0 {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    })
    .unwrap();

    let maps = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&maps);
    bus.subscribe(topics::VISUALIZER_MAP, move |msg| {
        let map: LaneMap = serde_json::from_slice(&msg.payload).unwrap();
        assert!(map.is_valid());
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let mut simulator = Simulator::new(bus.clone(), config.simulator.clone());
    let mut sensor = Sensor::new(bus.clone(), config.sensor.clone());
    let mut perception = Perception::new(bus.clone());
    let mut prediction = Prediction::new(bus.clone());
    let mut planning = Planning::new(bus.clone(), config.planning.clone());
    let mut control = Control::new(bus.clone(), config.control.clone());
    let mut map_server = MapServer::new(bus.clone());
    let mut daemon = Daemon::new(bus.clone());

    simulator.start().unwrap();
    sensor.start().unwrap();
    perception.start().unwrap();
    prediction.start().unwrap();
    planning.start().unwrap();
    control.start().unwrap();
    map_server.start().unwrap();
    daemon.start().unwrap();

    // Let ground truth and camera frames settle, then give a goal.
    thread::sleep(Duration::from_millis(300));
    bus.publish(
        topics::VISUALIZER_CONTROL,
        &UserCommand::SetTarget { x: 60.0, y: 0.0 }.to_json(),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(1500));

    daemon.stop();
    map_server.stop();
    control.stop();
    planning.stop();
    prediction.stop();
    perception.stop();
    sensor.stop();
    simulator.stop();

    assert!(obstacle_sets.load(Ordering::Relaxed) > 0, "no perception output");
    assert!(predictions.load(Ordering::Relaxed) > 0, "no prediction output");
    assert!(plans.load(Ordering::Relaxed) > 0, "no plans after set_target");
    assert!(driven_commands.load(Ordering::Relaxed) > 0, "control never commanded motion");
    assert!(maps.load(Ordering::Relaxed) > 0, "no map published");

    let xs = world_xs.lock().unwrap();
    let (first, last) = (xs.first().copied().unwrap(), xs.last().copied().unwrap());
    assert!(
        last - first > 0.5,
        "vehicle did not move: {:.2} -> {:.2}",
        first,
        last
    );
}

#[test]
fn reset_command_returns_vehicle_to_origin() {
    let bus = Bus::local_only();
    let config = NodeConfig::default();

    let latest_world = Arc::new(Mutex::new(None::<WorldState>));
    let sink = Arc::clone(&latest_world);
    bus.subscribe(topics::VISUALIZER_DATA, move |msg| {
        if let Ok(world) = bincode::deserialize::<WorldState>(&msg.payload) {
            *sink.lock().unwrap() = Some(world);
        }
    })
    .unwrap();

    let mut simulator = Simulator::new(bus.clone(), config.simulator.clone());
    simulator.start().unwrap();

    // Drive forward for a while.
    let command = bincode::serialize(&ActuationCommand {
        speed: 10.0,
        steering: 0.0,
    })
    .unwrap();
    bus.publish(topics::CONTROL_COMMAND, &command).unwrap();
    thread::sleep(Duration::from_millis(600));
    let moved = latest_world.lock().unwrap().clone().expect("no world state");
    assert!(moved.car.position.x > 0.1);

    bus.publish(topics::VISUALIZER_CONTROL, &UserCommand::Reset.to_json())
        .unwrap();
    thread::sleep(Duration::from_millis(300));
    let reset = latest_world.lock().unwrap().clone().unwrap();
    assert!(
        reset.car.position.x < moved.car.position.x,
        "reset did not rewind the vehicle"
    );
    assert!(reset.car.position.x < 0.5);

    simulator.stop();
}
