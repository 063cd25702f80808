//! User and system command records (JSON on the wire).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A front-end command on `visualizer/control`.
///
/// The web front-end historically sent the command name under either
/// `"cmd"` or `"type"`; both are accepted. Unknown commands parse to
/// `None` and are ignored by every consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserCommand {
    SetTarget { x: f64, y: f64 },
    SetSpeed(f64),
    SetSteer(f64),
    Reset,
    Stop,
}

impl UserCommand {
    pub fn parse(payload: &[u8]) -> Option<UserCommand> {
        let value: Value = serde_json::from_slice(payload).ok()?;
        let cmd = value
            .get("cmd")
            .and_then(Value::as_str)
            .or_else(|| value.get("type").and_then(Value::as_str))?;
        match cmd {
            "set_target" => Some(UserCommand::SetTarget {
                x: value.get("x")?.as_f64()?,
                y: value.get("y")?.as_f64()?,
            }),
            "set_speed" => Some(UserCommand::SetSpeed(value.get("value")?.as_f64()?)),
            "set_steer" => Some(UserCommand::SetSteer(value.get("value")?.as_f64()?)),
            "reset" => Some(UserCommand::Reset),
            "stop" => Some(UserCommand::Stop),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        let value = match self {
            UserCommand::SetTarget { x, y } => json!({"cmd": "set_target", "x": x, "y": y}),
            UserCommand::SetSpeed(v) => json!({"cmd": "set_speed", "value": v}),
            UserCommand::SetSteer(v) => json!({"cmd": "set_steer", "value": v}),
            UserCommand::Reset => json!({"cmd": "reset"}),
            UserCommand::Stop => json!({"cmd": "stop"}),
        };
        value.to_string().into_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemAction {
    Start,
    Stop,
}

/// Process-control request on `system/command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCommand {
    pub action: SystemAction,
    /// Node name as known to the daemon ("planning", "sensor", ...).
    pub target: String,
    #[serde(default)]
    pub request_id: String,
}

/// Daemon acknowledgement on `system/response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub request_id: String,
    pub success: bool,
    pub message: String,
}

/// Per-process entry of the combined status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeProcessStatus {
    pub name: String,
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub cpu_usage: f32,
    /// Resident set in MB.
    pub memory_usage: f32,
    /// Last node-authored heartbeat state ("OK", "WARN", ...), if any
    /// heartbeat was seen. The daemon's process table stays authoritative
    /// for `is_running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_state: Option<String>,
}

/// Combined system view published by the daemon on `system/status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStatus {
    pub timestamp_ms: i64,
    pub nodes: Vec<NodeProcessStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_command_accepts_cmd_key() {
        let cmd = UserCommand::parse(br#"{"cmd":"set_target","x":10.0,"y":-3.5}"#).unwrap();
        assert_eq!(cmd, UserCommand::SetTarget { x: 10.0, y: -3.5 });
    }

    #[test]
    fn test_user_command_accepts_type_key() {
        let cmd = UserCommand::parse(br#"{"type":"set_speed","value":5.5}"#).unwrap();
        assert_eq!(cmd, UserCommand::SetSpeed(5.5));
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        assert!(UserCommand::parse(br#"{"cmd":"warp_drive"}"#).is_none());
        assert!(UserCommand::parse(br#"{"value":1.0}"#).is_none());
        assert!(UserCommand::parse(b"not json at all").is_none());
    }

    #[test]
    fn test_malformed_arguments_are_ignored() {
        assert!(UserCommand::parse(br#"{"cmd":"set_target","x":10.0}"#).is_none());
        assert!(UserCommand::parse(br#"{"cmd":"set_steer","value":"hard left"}"#).is_none());
    }

    #[test]
    fn test_user_command_json_round_trip() {
        for cmd in [
            UserCommand::SetTarget { x: 1.0, y: 2.0 },
            UserCommand::SetSpeed(3.0),
            UserCommand::SetSteer(-0.2),
            UserCommand::Reset,
            UserCommand::Stop,
        ] {
            assert_eq!(UserCommand::parse(&cmd.to_json()), Some(cmd));
        }
    }

    #[test]
    fn test_system_command_json_shape() {
        let json = r#"{"action":"start","target":"planning","request_id":"req-1"}"#;
        let cmd: SystemCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.action, SystemAction::Start);
        assert_eq!(cmd.target, "planning");

        let no_id: SystemCommand =
            serde_json::from_str(r#"{"action":"stop","target":"sensor"}"#).unwrap();
        assert!(no_id.request_id.is_empty());
    }
}
