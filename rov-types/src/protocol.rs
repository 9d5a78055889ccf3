//! Operator protocol: the JSON message schema exchanged with the topside
//! application over the persistent websocket connection.
//!
//! Per the "dynamic message dispatch" design note, this is modeled as one
//! tagged sum type rather than runtime string dispatch — `serde`'s adjacent
//! tagging decodes the `type` discriminator directly into a variant, and
//! `rov_firmware::operator::handle_message` matches it exhaustively so no
//! message type can be silently dropped.

use serde::{Deserialize, Serialize};

use crate::config::{PidGains, RovConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub imu_ok: bool,
    pub pressure_sensor_ok: bool,
    pub microcontroller_ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub auto_stabilization: bool,
    pub depth_hold: bool,
    pub battery_percentage: f64,
    pub health: Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    pub depth: f64,
    pub desired_pitch: f64,
    pub desired_roll: f64,
    pub desired_yaw: f64,
    pub desired_depth: f64,
    pub water_temperature: f64,
    pub electronics_temperature: f64,
    pub thruster_rpms: [f64; 8],
    pub work_indicator_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegulatorSuggestions {
    pub pitch: PidGains,
    pub roll: PidGains,
    pub depth: PidGains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Info,
    Warn,
    Error,
    Loading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stable id for progress/replacement toasts (e.g. thruster-test countdown); null otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: f64,
}

/// Direction vector as received from the operator: six physical degrees of
/// freedom followed by two reserved channels that must stay zero. Kept at
/// full width rather than narrowed to 6 so a future revision can assign the
/// reserved channels without changing the wire shape.
pub type DirectionVector = [f64; 8];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OperatorMessage {
    DirectionVector(DirectionVector),
    GetConfig,
    SetConfig(RovConfig),
    Config(RovConfig),
    FlashMicrocontrollerFirmware,
    StartThrusterTest { thruster: u8 },
    CancelThrusterTest,
    StartRegulatorAutoTuning,
    CancelRegulatorAutoTuning,
    RegulatorSuggestions(RegulatorSuggestions),
    ShowToast(Toast),
    LogMessage(LogEntry),
    StatusUpdate(StatusUpdate),
    Telemetry(Telemetry),
    FirmwareVersion { version: String },
    CustomAction { name: String, payload: serde_json::Value },
    ToggleAutoStabilization,
    ToggleDepthHold,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_vector_decodes_by_type_tag() {
        let raw = serde_json::json!({
            "type": "directionVector",
            "payload": [0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        });
        let msg: OperatorMessage = serde_json::from_value(raw).unwrap();
        match msg {
            OperatorMessage::DirectionVector(v) => assert_eq!(v[0], 0.5),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let raw = serde_json::json!({"type": "doesNotExist"});
        assert!(serde_json::from_value::<OperatorMessage>(raw).is_err());
    }

    #[test]
    fn unit_variant_round_trips() {
        let msg = OperatorMessage::CancelThrusterTest;
        let json = serde_json::to_string(&msg).unwrap();
        let back: OperatorMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
