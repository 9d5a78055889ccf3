//! main.rs — vehicle-dynamics and fake-sensor bench harness.
//!
//! Runs two things concurrently:
//!   1. A physics loop: applies the last received direction vector through
//!      the same thrust-allocation matrix the firmware uses, advances the
//!      rigid-body model, and synthesizes IMU/pressure/ESC readings.
//!   2. A control WebSocket: accepts `rov_types::protocol::OperatorMessage`
//!      the way the firmware's own operator socket would, and a small
//!      `{"cmd": ..., "args": ...}` side channel for fault-scenario presets.

mod scenarios;
mod sensor_model;
mod vehicle_dynamics;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use rov_types::config::RovConfig;
use rov_types::protocol::{OperatorMessage, Telemetry};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use sensor_model::{FaultConfig, SensorModel};
use vehicle_dynamics::VehicleDynamics;

#[derive(Parser, Debug)]
#[command(name = "rov-sim", about = "Vehicle-dynamics bench harness for rov-firmware")]
struct Args {
    #[arg(long, default_value = "0.0.0.0:9100")]
    bind: String,
    #[arg(long, default_value = "60")]
    tick_hz: u64,
}

struct SimState {
    dynamics: VehicleDynamics,
    direction_vector: [f64; 8],
    faults: FaultConfig,
    config: RovConfig,
}

type SharedState = Arc<RwLock<SimState>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "rov_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("rov-sim bench harness starting on {}", args.bind);

    let state: SharedState = Arc::new(RwLock::new(SimState {
        dynamics: VehicleDynamics::new(),
        direction_vector: [0.0; 8],
        faults: FaultConfig::default(),
        config: RovConfig::default(),
    }));

    let (telemetry_tx, _) = broadcast::channel::<OperatorMessage>(64);
    let telemetry_tx = Arc::new(telemetry_tx);

    tokio::spawn(physics_loop(state.clone(), telemetry_tx.clone(), args.tick_hz));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "rov-sim ok" }))
        .with_state((state.clone(), telemetry_tx.clone()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = tokio::net::TcpListener::bind(&args.bind).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn allocate(direction_vector: [f64; 8], config: &RovConfig) -> [f64; 8] {
    let matrix = &config.thruster_allocation.0;
    let mut raw = [0.0; 8];
    for (row, out) in matrix.iter().zip(raw.iter_mut()) {
        *out = row.iter().zip(direction_vector.iter()).map(|(m, d)| m * d).sum();
    }
    let mut reordered = [0.0; 8];
    for (pin, &src) in config.thruster_pin_identifiers.iter().enumerate() {
        reordered[pin] = raw[src];
    }
    let mut out = [0.0; 8];
    for i in 0..8 {
        out[i] = (reordered[i] * config.thruster_spin_directions[i] as f64).clamp(-1.0, 1.0);
    }
    out
}

async fn physics_loop(state: SharedState, telemetry_tx: Arc<broadcast::Sender<OperatorMessage>>, tick_hz: u64) {
    let mut ticker = interval(Duration::from_millis(1000 / tick_hz));
    let dt = 1.0 / tick_hz as f64;
    let mut sensors = SensorModel::new();

    loop {
        ticker.tick().await;
        let mut s = state.write().await;
        let thrust = allocate(s.direction_vector, &s.config);
        s.dynamics.tick(thrust, dt);

        let vehicle = s.dynamics.state;
        let faults = s.faults;
        let esc = sensors.esc_sample(thrust, &faults);
        let pressure = sensors.pressure_sample(&vehicle, &faults).map(|p| p.pressure).unwrap_or(101_325.0);
        drop(s);

        let telemetry = Telemetry {
            pitch: vehicle.pitch_deg,
            roll: vehicle.roll_deg,
            yaw: 0.0,
            depth: depth_from_pressure(pressure),
            desired_pitch: 0.0,
            desired_roll: 0.0,
            desired_yaw: 0.0,
            desired_depth: 0.0,
            water_temperature: 18.0,
            electronics_temperature: 22.0,
            thruster_rpms: esc.erpm,
            work_indicator_percentage: esc.current.iter().copied().fold(0.0, f64::max),
        };
        let _ = telemetry_tx.send(OperatorMessage::Telemetry(telemetry));
    }
}

fn depth_from_pressure(pressure_pa: f64) -> f64 {
    const SURFACE_PRESSURE_PA: f64 = 101_325.0;
    const FRESHWATER_DENSITY_KG_M3: f64 = 997.0;
    const STANDARD_GRAVITY_M_S2: f64 = 9.80665;
    ((pressure_pa - SURFACE_PRESSURE_PA) / (FRESHWATER_DENSITY_KG_M3 * STANDARD_GRAVITY_M_S2)).max(0.0)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State((state, telemetry_tx)): State<(SharedState, Arc<broadcast::Sender<OperatorMessage>>)>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, telemetry_tx))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState, telemetry_tx: Arc<broadcast::Sender<OperatorMessage>>) {
    let mut rx = telemetry_tx.subscribe();
    info!("bench client connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Ok(message) => {
                        let text = serde_json::to_string(&message).expect("OperatorMessage always serializes");
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_incoming(&state, &text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    info!("bench client disconnected");
}

/// Two kinds of inbound text frame are accepted: a real
/// `OperatorMessage::DirectionVector`, or a bare `{"cmd": "...", "args": {...}}`
/// scenario-control command, mirroring the bench harness's own raw JSON
/// dispatch convention rather than growing the operator protocol to carry
/// sim-only concerns.
async fn handle_incoming(state: &SharedState, text: &str) {
    if let Ok(OperatorMessage::DirectionVector(v)) = serde_json::from_str::<OperatorMessage>(text) {
        state.write().await.direction_vector = v;
        return;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else { return };
    let cmd = value["cmd"].as_str().unwrap_or("");
    match cmd {
        "set_scenario" => {
            let name = value["args"]["name"].as_str().unwrap_or("");
            match scenarios::preset_by_name(name) {
                Some(faults) => {
                    state.write().await.faults = faults;
                    info!("scenario '{name}' applied");
                }
                None => warn!("unknown scenario '{name}'"),
            }
        }
        "reset" => {
            let mut s = state.write().await;
            s.dynamics = VehicleDynamics::new();
            s.faults = FaultConfig::default();
            info!("bench state reset");
        }
        _ if !cmd.is_empty() => warn!("unknown control command '{cmd}'"),
        _ => {}
    }
}
