//! Node configuration from TOML.
//!
//! Every binary accepts an optional config path as its first argument.
//! A missing file (the common case) means defaults; a present but broken
//! file is a startup error so a typo cannot silently run with defaults.
//!
//! ```toml
//! [planning]
//! loop_rate_ms = 100
//! default_cruise_speed = 5.0
//!
//! [visualizer]
//! ws_bind = "0.0.0.0:8082"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Physics step period in ms (100 Hz default).
    pub physics_rate_ms: u64,
    /// Publish every Nth physics tick (20 Hz at defaults).
    pub publish_interval_ticks: u32,
    pub wheelbase: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            physics_rate_ms: 10,
            publish_interval_ticks: 5,
            wheelbase: 2.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub frame_rate_ms: u64,
    /// Field of view in degrees.
    pub fov: f64,
    /// Detection range in meters.
    pub max_distance: f64,
    /// Camera mount offset ahead of the vehicle center, meters.
    pub mount_offset_x: f64,
    pub mount_offset_y: f64,
    /// Std-dev of the position measurement noise, meters.
    pub noise_sigma: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            frame_rate_ms: 33,
            fov: 60.0,
            max_distance: 80.0,
            mount_offset_x: 2.0,
            mount_offset_y: 0.0,
            noise_sigma: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub loop_rate_ms: u64,
    /// Distance at which the active target counts as reached, meters.
    pub target_reach_threshold: f64,
    pub default_cruise_speed: f64,
    /// Front obstacle distance that triggers the nudge maneuver.
    pub nudge_trigger_distance: f64,
    /// Front obstacle distance that forces an emergency stop.
    pub emergency_stop_distance: f64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            loop_rate_ms: 100,
            target_reach_threshold: 1.0,
            default_cruise_speed: 5.0,
            nudge_trigger_distance: 20.0,
            emergency_stop_distance: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub loop_rate_ms: u64,
    pub wheelbase: f64,
    /// Steering clamp in radians.
    pub max_steer: f64,
    /// Minimum lookahead along the trajectory, meters.
    pub lookahead_distance: f64,
    pub max_speed: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            loop_rate_ms: 100,
            wheelbase: 2.8,
            max_steer: 0.5,
            lookahead_distance: 2.0,
            max_speed: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub ws_bind: String,
    /// How often the world snapshot is pushed to clients, ms.
    pub snapshot_interval_ms: u64,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            ws_bind: "0.0.0.0:8082".to_string(),
            snapshot_interval_ms: 100,
        }
    }
}

/// Root config shared by every node binary; each reads its own section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub simulator: SimulatorConfig,
    pub sensor: SensorConfig,
    pub planning: PlanningConfig,
    pub control: ControlConfig,
    pub visualizer: VisualizerConfig,
}

impl NodeConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&str>) -> Result<NodeConfig, String> {
        let Some(path) = path else {
            return Ok(NodeConfig::default());
        };
        if !Path::new(path).exists() {
            log::warn!("config file {} not found, using defaults", path);
            return Ok(NodeConfig::default());
        }
        let text = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path, e))?;
        toml::from_str(&text).map_err(|e| format!("failed to parse {}: {}", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_path() {
        let config = NodeConfig::load(None).unwrap();
        assert_eq!(config.simulator.physics_rate_ms, 10);
        assert_eq!(config.planning.loop_rate_ms, 100);
        assert_eq!(config.visualizer.ws_bind, "0.0.0.0:8082");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [planning]
            default_cruise_speed = 8.0
            "#,
        )
        .unwrap();
        assert!((config.planning.default_cruise_speed - 8.0).abs() < f64::EPSILON);
        assert_eq!(config.planning.loop_rate_ms, 100);
        assert!((config.sensor.fov - 60.0).abs() < f64::EPSILON);
    }
}
