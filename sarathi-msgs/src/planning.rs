//! JSON records for the perception → prediction → planning chain and the
//! lane map.
//!
//! Each record carries a `"type"` tag so consumers can reject frames that
//! strayed onto the wrong topic, the same discipline the front-end relies
//! on.

use crate::world::Point3;
use serde::{Deserialize, Serialize};

pub const OBSTACLE_SET_TAG: &str = "perception_obstacles";
pub const PREDICTION_SET_TAG: &str = "prediction_trajectories";
pub const PLANNED_TRAJECTORY_TAG: &str = "planning_trajectory";
pub const LANE_MAP_TAG: &str = "map_data";

/// One perceived obstacle in world coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldObstacle {
    pub id: u32,
    pub position: Point3,
    pub kind: String,
}

/// Perception output on `perception/obstacles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleSet {
    #[serde(rename = "type")]
    pub tag: String,
    pub timestamp_ms: i64,
    pub obstacles: Vec<WorldObstacle>,
}

impl ObstacleSet {
    pub fn new(timestamp_ms: i64, obstacles: Vec<WorldObstacle>) -> Self {
        Self {
            tag: OBSTACLE_SET_TAG.to_string(),
            timestamp_ms,
            obstacles,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.tag == OBSTACLE_SET_TAG
    }
}

/// One predicted future position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PredictedPoint {
    pub x: f64,
    pub y: f64,
    /// Seconds from now.
    pub time_offset: f64,
    /// 0.3..=1.0, decaying with horizon distance.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
}

/// Predicted motion of one obstacle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedObstacle {
    pub id: u32,
    pub current_position: crate::world::Point2,
    pub velocity: Velocity,
    pub trajectory: Vec<PredictedPoint>,
}

/// Prediction output on `prediction/trajectories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSet {
    #[serde(rename = "type")]
    pub tag: String,
    pub timestamp_ms: i64,
    pub obstacles: Vec<PredictedObstacle>,
}

impl PredictionSet {
    pub fn new(timestamp_ms: i64, obstacles: Vec<PredictedObstacle>) -> Self {
        Self {
            tag: PREDICTION_SET_TAG.to_string(),
            timestamp_ms,
            obstacles,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.tag == PREDICTION_SET_TAG
    }
}

/// One sample along the planned path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    /// Target speed at this sample, m/s.
    pub speed: f64,
}

/// Planning output on `planning/trajectory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTrajectory {
    #[serde(rename = "type")]
    pub tag: String,
    pub frame_id: u64,
    pub timestamp_ms: i64,
    pub points: Vec<TrajectoryPoint>,
}

impl PlannedTrajectory {
    pub fn new(frame_id: u64, timestamp_ms: i64, points: Vec<TrajectoryPoint>) -> Self {
        Self {
            tag: PLANNED_TRAJECTORY_TAG.to_string(),
            frame_id,
            timestamp_ms,
            points,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.tag == PLANNED_TRAJECTORY_TAG
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    pub id: u32,
    pub center_line: Vec<Point3>,
}

/// Static lane geometry on `visualizer/map`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneMap {
    #[serde(rename = "type")]
    pub tag: String,
    pub lanes: Vec<Lane>,
}

impl LaneMap {
    pub fn new(lanes: Vec<Lane>) -> Self {
        Self {
            tag: LANE_MAP_TAG.to_string(),
            lanes,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.tag == LANE_MAP_TAG
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Point2;

    #[test]
    fn test_obstacle_set_tags_json() {
        let set = ObstacleSet::new(5, vec![]);
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.contains("\"type\":\"perception_obstacles\""));
        let back: ObstacleSet = serde_json::from_str(&json).unwrap();
        assert!(back.is_valid());
    }

    #[test]
    fn test_mistagged_record_is_detectable() {
        let json = r#"{"type":"something_else","timestamp_ms":0,"obstacles":[]}"#;
        let set: ObstacleSet = serde_json::from_str(json).unwrap();
        assert!(!set.is_valid());
    }

    #[test]
    fn test_planned_trajectory_round_trip() {
        let plan = PlannedTrajectory::new(
            3,
            9,
            vec![TrajectoryPoint {
                x: 1.0,
                y: 2.0,
                speed: 5.0,
            }],
        );
        let json = serde_json::to_vec(&plan).unwrap();
        let back: PlannedTrajectory = serde_json::from_slice(&json).unwrap();
        assert!(back.is_valid());
        assert_eq!(back.points.len(), 1);
        assert!((back.points[0].speed - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prediction_set_structure() {
        let set = PredictionSet::new(
            1,
            vec![PredictedObstacle {
                id: 2,
                current_position: Point2::new(50.0, 3.5),
                velocity: Velocity {
                    vx: 3.0,
                    vy: 0.0,
                    speed: 3.0,
                },
                trajectory: vec![PredictedPoint {
                    x: 51.5,
                    y: 3.5,
                    time_offset: 0.5,
                    confidence: 0.9,
                }],
            }],
        );
        let json = serde_json::to_vec(&set).unwrap();
        let back: PredictionSet = serde_json::from_slice(&json).unwrap();
        assert!(back.is_valid());
        assert_eq!(back.obstacles[0].trajectory.len(), 1);
    }
}
