//! Standard topic names.
//!
//! | Topic | Producer | Payload |
//! |---|---|---|
//! | `visualizer/data` | simulator | [`WorldState`](crate::WorldState), bincode |
//! | `sensor/camera/front` | sensor | [`CameraFrame`](crate::CameraFrame), bincode, chunked |
//! | `perception/obstacles` | perception | [`ObstacleSet`](crate::ObstacleSet), JSON |
//! | `perception/detection_2d` | perception | [`Detection2dArray`](crate::Detection2dArray), bincode |
//! | `prediction/trajectories` | prediction | [`PredictionSet`](crate::PredictionSet), JSON, chunked |
//! | `planning/trajectory` | planning | [`PlannedTrajectory`](crate::PlannedTrajectory), JSON, chunked |
//! | `control/command` | control | [`ActuationCommand`](crate::ActuationCommand), bincode |
//! | `visualizer/control` | visualizer | [`UserCommand`](crate::UserCommand), JSON |
//! | `visualizer/map` | map | [`LaneMap`](crate::LaneMap), JSON, chunked |
//! | `system/command` | visualizer | [`SystemCommand`](crate::SystemCommand), JSON |
//! | `system/response` | daemon | [`CommandResponse`](crate::CommandResponse), JSON |
//! | `system/status` | daemon | [`SystemStatus`](crate::SystemStatus), JSON |
//!
//! The per-node heartbeat topic `system/node_status` is owned by the
//! middleware (`samvaad::NODE_STATUS_TOPIC`).

pub const VISUALIZER_DATA: &str = "visualizer/data";
pub const CAMERA_FRONT: &str = "sensor/camera/front";
pub const PERCEPTION_OBSTACLES: &str = "perception/obstacles";
pub const DETECTION_2D: &str = "perception/detection_2d";
pub const PREDICTION_TRAJECTORIES: &str = "prediction/trajectories";
pub const PLANNING_TRAJECTORY: &str = "planning/trajectory";
pub const CONTROL_COMMAND: &str = "control/command";
pub const VISUALIZER_CONTROL: &str = "visualizer/control";
pub const VISUALIZER_MAP: &str = "visualizer/map";
pub const SYSTEM_COMMAND: &str = "system/command";
pub const SYSTEM_RESPONSE: &str = "system/response";
pub const SYSTEM_STATUS: &str = "system/status";
