//! Payload records exchanged between the Sarathi nodes.
//!
//! The bus treats every payload as opaque bytes; these are the schemas the
//! nodes agree on per topic. High-rate state records travel as bincode,
//! everything the front-end touches travels as JSON (see the topic table
//! in [`topics`]).

pub mod camera;
pub mod command;
pub mod planning;
pub mod topics;
pub mod world;

pub use camera::{BoundingBox, CameraFrame, CameraObject, Detection2dArray};
pub use command::{
    CommandResponse, NodeProcessStatus, SystemAction, SystemCommand, SystemStatus, UserCommand,
};
pub use planning::{
    Lane, LaneMap, ObstacleSet, PlannedTrajectory, PredictedObstacle, PredictedPoint,
    PredictionSet, TrajectoryPoint, Velocity, WorldObstacle,
};
pub use world::{ActuationCommand, CarState, Obstacle, Point2, Point3, WorldState};
