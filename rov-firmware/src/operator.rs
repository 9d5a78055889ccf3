//! Operator websocket protocol (spec §4.6): one raw axum upgrade handler,
//! message dispatch, and the outbound broadcast channel periodic senders
//! publish into. Modeled on the bench harness's own `ws_handler` / raw
//! command dispatch rather than the teacher's per-event socket.io surface —
//! the operator protocol is a flat tagged-JSON stream, not a room/namespace
//! model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use rov_types::protocol::{
    Health, LogEntry, LogLevel, OperatorMessage, StatusUpdate, Toast, ToastKind,
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::autotune::AutoTuner;
use crate::state::VehicleState;
use crate::{allocator, persistence};

pub type SharedState = Arc<RwLock<VehicleState>>;

const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
const FIRMWARE_ANNOUNCE_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct OperatorHub {
    pub state: SharedState,
    pub outbound: broadcast::Sender<OperatorMessage>,
}

impl OperatorHub {
    pub fn new(state: SharedState) -> Self {
        let (outbound, _) = broadcast::channel(256);
        Self { state, outbound }
    }

    pub fn router(self) -> Router {
        Router::new().route("/ws", get(ws_handler)).with_state(self)
    }

    pub fn publish(&self, message: OperatorMessage) {
        let _ = self.outbound.send(message);
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<OperatorHub>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: OperatorHub) {
    info!("operator connected");
    let mut rx = hub.outbound.subscribe();
    let connected_at = Instant::now();
    let mut announced_firmware = false;

    {
        let config = hub.state.read().await.config.as_ref().clone();
        let _ = send(&mut socket, &OperatorMessage::Config(config)).await;
    }

    loop {
        let remaining_grace = FIRMWARE_ANNOUNCE_GRACE.saturating_sub(connected_at.elapsed());
        tokio::select! {
            _ = tokio::time::sleep(remaining_grace), if !announced_firmware => {
                announced_firmware = true;
                let _ = send(&mut socket, &OperatorMessage::FirmwareVersion { version: FIRMWARE_VERSION.to_string() }).await;
            }
            outbound = rx.recv() => {
                match outbound {
                    Ok(message) => {
                        if send(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("operator socket lagged, dropped {skipped} outbound messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<OperatorMessage>(&text) {
                            Ok(message) => {
                                if let Some(reply) = handle_message(&hub, message).await {
                                    if send(&mut socket, &reply).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => debug!("ignoring malformed operator message: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("operator socket error: {e}");
                        break;
                    }
                }
            }
        }
    }
    info!("operator disconnected");
}

async fn send(socket: &mut WebSocket, message: &OperatorMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).expect("OperatorMessage always serializes");
    socket.send(Message::Text(text)).await
}

/// Apply one inbound message to shared state, returning a direct reply (not
/// broadcast) when the protocol calls for one.
pub async fn handle_message(hub: &OperatorHub, message: OperatorMessage) -> Option<OperatorMessage> {
    match message {
        OperatorMessage::DirectionVector(mut v) => {
            v[6] = 0.0;
            v[7] = 0.0;
            let mut state = hub.state.write().await;
            state.thrusters.direction_vector = v;
            state.thrusters.last_direction_time = Some(Instant::now());
            None
        }
        OperatorMessage::GetConfig => {
            let state = hub.state.read().await;
            Some(OperatorMessage::Config(state.config.as_ref().clone()))
        }
        OperatorMessage::SetConfig(new_config) => {
            if let Err(e) = persistence::save_config(&new_config).await {
                warn!("failed to persist config: {e}");
                return Some(toast(ToastKind::Error, "Failed to save configuration", Some(e.to_string())));
            }
            let mut state = hub.state.write().await;
            state.config = Arc::new(new_config);
            Some(toast(ToastKind::Success, "Configuration saved", None))
        }
        OperatorMessage::FlashMicrocontrollerFirmware => {
            Some(toast(ToastKind::Info, "Firmware flashing is handled by a separate tool", None))
        }
        OperatorMessage::StartThrusterTest { thruster } => {
            let mut state = hub.state.write().await;
            if !state.normal_control_active() {
                return Some(toast(ToastKind::Warn, "Cannot start a thruster test while auto-tuning is active", None));
            }
            state.thrusters.test_thruster = Some(thruster);
            state.thrusters.test_start_time = Some(Instant::now());
            None
        }
        OperatorMessage::CancelThrusterTest => {
            let mut state = hub.state.write().await;
            state.thrusters.test_thruster = None;
            state.thrusters.test_start_time = None;
            None
        }
        OperatorMessage::StartRegulatorAutoTuning => {
            let mut state = hub.state.write().await;
            if state.thrusters.test_thruster.is_some() {
                return Some(toast(ToastKind::Warn, "Cannot start auto-tuning during a thruster test", None));
            }
            let (imu_ok, pressure_ok, pitch, roll, desired_depth) = (
                state.health.imu_ok,
                state.health.pressure_sensor_ok,
                state.regulator.pitch,
                state.regulator.roll,
                state.regulator.desired_depth,
            );
            match AutoTuner::start(imu_ok, pressure_ok, pitch, roll, desired_depth) {
                Ok(tuner) => {
                    state.auto_tuner = Some(tuner);
                    state.regulator.auto_tuning_active = true;
                    state.regulator.auto_tuning_start = Some(Instant::now());
                    None
                }
                Err(e) => Some(toast(ToastKind::Error, "Auto tuning failed", Some(e.to_string()))),
            }
        }
        OperatorMessage::CancelRegulatorAutoTuning => {
            let mut state = hub.state.write().await;
            state.auto_tuner = None;
            state.regulator.auto_tuning_active = false;
            state.regulator.auto_tuning_start = None;
            None
        }
        OperatorMessage::ToggleAutoStabilization => {
            let mut state = hub.state.write().await;
            let enabling = !state.status.pitch_stabilization;
            state.status.pitch_stabilization = enabling;
            state.status.roll_stabilization = enabling;
            if !enabling {
                state.regulator.desired_pitch = 0.0;
                state.regulator.desired_roll = 0.0;
            }
            None
        }
        OperatorMessage::ToggleDepthHold => {
            let mut state = hub.state.write().await;
            let enabling = !state.status.depth_hold;
            state.status.depth_hold = enabling;
            if enabling {
                state.regulator.desired_depth = state.pressure.depth;
            }
            None
        }
        OperatorMessage::CustomAction { name, .. } => {
            debug!("ignoring custom action '{name}' (no side-effect handler registered)");
            None
        }
        // Outbound-only message kinds are never legitimately sent by a client.
        OperatorMessage::Config(_)
        | OperatorMessage::RegulatorSuggestions(_)
        | OperatorMessage::ShowToast(_)
        | OperatorMessage::LogMessage(_)
        | OperatorMessage::StatusUpdate(_)
        | OperatorMessage::Telemetry(_)
        | OperatorMessage::FirmwareVersion { .. } => {
            debug!("ignoring outbound-only message type from client");
            None
        }
    }
}

fn toast(kind: ToastKind, message: &str, description: Option<String>) -> OperatorMessage {
    OperatorMessage::ShowToast(Toast { kind, message: message.to_string(), description, id: None })
}

pub fn thruster_test_toast(remaining_seconds: u64) -> OperatorMessage {
    OperatorMessage::ShowToast(Toast {
        kind: ToastKind::Loading,
        message: format!("Thruster test: {remaining_seconds}s remaining"),
        description: None,
        id: Some("thruster-test".to_string()),
    })
}

pub fn log_entry(level: LogLevel, message: impl Into<String>, timestamp: f64) -> OperatorMessage {
    OperatorMessage::LogMessage(LogEntry { level, message: message.into(), timestamp })
}

pub fn status_update(state: &VehicleState) -> OperatorMessage {
    OperatorMessage::StatusUpdate(StatusUpdate {
        auto_stabilization: state.status.pitch_stabilization && state.status.roll_stabilization,
        depth_hold: state.status.depth_hold,
        battery_percentage: state.status.battery_percentage,
        health: Health {
            imu_ok: state.health.imu_ok,
            pressure_sensor_ok: state.health.pressure_sensor_ok,
            microcontroller_ok: state.health.microcontroller_ok,
        },
    })
}

/// Seconds remaining in an active thruster test, for the per-second toast
/// countdown driven by the main loop.
pub fn test_countdown(state: &VehicleState) -> Option<u64> {
    allocator::test_seconds_remaining(&state.thrusters)
}
