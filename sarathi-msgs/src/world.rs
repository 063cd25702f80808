//! Ground-truth world state and actuation records (bincode on the wire).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Ego vehicle state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CarState {
    pub position: Point2,
    /// Heading in radians, CCW from +X.
    pub heading: f64,
    /// Forward speed in m/s.
    pub speed: f64,
    /// Front wheel angle in radians.
    pub steering_angle: f64,
}

/// One obstacle in the scene, world coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: u32,
    pub position: Point2,
    pub heading: f64,
    /// Bounding length/width in meters.
    pub length: f64,
    pub width: f64,
    /// Category label ("car", "pedestrian", "cone", ...).
    pub kind: String,
}

/// Ground truth published by the simulator on `visualizer/data` at 20 Hz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldState {
    pub frame_id: u64,
    pub timestamp_ms: i64,
    pub car: CarState,
    pub obstacles: Vec<Obstacle>,
}

/// Actuation request from control to the simulator on `control/command`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActuationCommand {
    /// Target forward speed in m/s.
    pub speed: f64,
    /// Target front wheel angle in radians.
    pub steering: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_state_bincode_round_trip() {
        let state = WorldState {
            frame_id: 17,
            timestamp_ms: 1_700_000_000_000,
            car: CarState {
                position: Point2::new(1.5, -2.0),
                heading: 0.3,
                speed: 4.2,
                steering_angle: -0.05,
            },
            obstacles: vec![Obstacle {
                id: 2,
                position: Point2::new(30.0, 3.5),
                heading: 0.0,
                length: 4.5,
                width: 1.8,
                kind: "car".to_string(),
            }],
        };
        let bytes = bincode::serialize(&state).unwrap();
        let back: WorldState = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.frame_id, 17);
        assert_eq!(back.obstacles.len(), 1);
        assert_eq!(back.obstacles[0].kind, "car");
        assert!((back.car.position.x - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_point_distance() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }
}
