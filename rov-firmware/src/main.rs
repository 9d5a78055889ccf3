mod allocator;
mod attitude;
mod autotune;
mod error;
mod linalg;
mod operator;
mod persistence;
mod regulator;
mod sensors;
mod serial_link;
mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::{Json, Router};
use rov_types::protocol::OperatorMessage;
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use attitude::AttitudeEstimator;
use operator::{OperatorHub, SharedState};
use sensors::{FailureTracker, ImuBackend, PressureBackend, SimulatedImuBackend, SimulatedPressureBackend};
use serial_link::{SerialLink, ThrusterWriter};
use state::VehicleState;

const CONTROL_HZ: u64 = 60;
const IMU_POLL_HZ: u64 = 100;
const PRESSURE_POLL_HZ: u64 = 50;
const PRESSURE_BACKOFF: Duration = Duration::from_secs(1);
const TELEMETRY_HZ: u64 = 60;
const STATUS_HZ: u64 = 2;
const BATTERY_EMA_ALPHA: f64 = 0.1;

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "rov_firmware=info".into()),
        )
        .init();

    info!("rov-firmware v{} starting", env!("CARGO_PKG_VERSION"));

    let config = persistence::load_config().await;
    let state: SharedState = Arc::new(RwLock::new(VehicleState::new(config)));
    let hub = OperatorHub::new(state.clone());
    let shutdown = Arc::new(tokio::sync::Notify::new());

    tokio::spawn(imu_poll_loop(state.clone(), Box::new(SimulatedImuBackend)));
    tokio::spawn(pressure_poll_loop(state.clone(), Box::new(SimulatedPressureBackend)));

    let mut control_task = None;
    match serial_link::discover_port() {
        Some(path) => match SerialLink::open(&path) {
            Ok(mut link) => match link.try_clone_writer() {
                Ok(writer) => {
                    info!("serial link open on {}", path.display());
                    tokio::spawn(esc_telemetry_loop(state.clone(), link));
                    control_task =
                        Some(tokio::spawn(control_tick_loop(state.clone(), hub.clone(), writer, shutdown.clone())));
                }
                Err(e) => error!("failed to split serial link for writing: {e}; running without thruster output"),
            },
            Err(e) => error!("failed to open serial link at {}: {e}; running without thruster output", path.display()),
        },
        None => warn!("no microcontroller serial device found; running without thruster output"),
    }

    tokio::spawn(telemetry_publish_loop(state.clone(), hub.clone()));
    tokio::spawn(status_publish_loop(state.clone(), hub.clone()));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = Router::new().route("/health", get(health_check)).merge(hub.router()).layer(cors);

    let bind_addr = std::env::var("ROV_BIND_ADDR").unwrap_or_else(|_| "10.10.10.10:9000".to_string());
    info!("listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();

    let shutdown_notify = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
            info!("shutdown signal received");
            shutdown_notify.notify_waiters();
        })
        .await
        .unwrap();

    if let Some(task) = control_task {
        let _ = task.await;
    }
}

async fn imu_poll_loop(state: SharedState, mut backend: Box<dyn ImuBackend>) {
    let mut tracker = FailureTracker::default();
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / IMU_POLL_HZ));
    loop {
        interval.tick().await;
        let (result, returned) = tokio::task::spawn_blocking(move || {
            let r = backend.read();
            (r, backend)
        })
        .await
        .expect("imu poll task panicked");
        backend = returned;

        let healthy = tracker.record(result.is_ok());
        let mut s = state.write().await;
        s.health.imu_ok = healthy;
        if let Ok(sample) = result {
            s.imu = sample;
        }
    }
}

async fn pressure_poll_loop(state: SharedState, mut backend: Box<dyn PressureBackend>) {
    let mut tracker = FailureTracker::default();
    loop {
        let (result, returned) = tokio::task::spawn_blocking(move || {
            let r = backend.read();
            (r, backend)
        })
        .await
        .expect("pressure poll task panicked");
        backend = returned;

        let healthy = tracker.record(result.is_ok());
        {
            let mut s = state.write().await;
            s.health.pressure_sensor_ok = healthy;
            if let Ok(mut sample) = result {
                let fluid = s.config.fluid_type;
                sample.depth = sensors::depth_from_pressure(sample.pressure, fluid);
                s.pressure = sample;
            }
        }

        let delay = if healthy { Duration::from_millis(1000 / PRESSURE_POLL_HZ) } else { PRESSURE_BACKOFF };
        tokio::time::sleep(delay).await;
    }
}

async fn esc_telemetry_loop(state: SharedState, mut link: SerialLink) {
    let mut tracker = FailureTracker::default();
    loop {
        let (result, returned) = tokio::task::spawn_blocking(move || {
            let r = link.poll_esc_packets();
            (r, link)
        })
        .await
        .expect("esc telemetry task panicked");
        link = returned;

        match result {
            Ok(packets) => {
                tracker.record(true);
                if !packets.is_empty() {
                    let mut s = state.write().await;
                    s.health.microcontroller_ok = true;
                    for packet in packets {
                        apply_esc_packet(&mut s, packet);
                    }
                }
            }
            Err(e) => {
                let healthy = tracker.record(false);
                warn!("esc telemetry read failed: {e}");
                state.write().await.health.microcontroller_ok = healthy;
            }
        }
    }
}

fn apply_esc_packet(state: &mut VehicleState, packet: rov_types::wire::EscPacket) {
    use rov_types::wire::EscMeasurement;
    let idx = packet.motor_id as usize;
    if idx >= 8 {
        return;
    }
    let value = packet.value as f64;
    match packet.measurement {
        EscMeasurement::Erpm => state.esc.erpm[idx] = value,
        EscMeasurement::Voltage => state.esc.voltage[idx] = value / 1000.0,
        EscMeasurement::Temperature => state.esc.temperature[idx] = value / 100.0,
        EscMeasurement::Current => state.esc.current[idx] = value / 1000.0,
        EscMeasurement::Stress => state.esc.stress[idx] = value,
    }
}

async fn control_tick_loop(state: SharedState, hub: OperatorHub, mut writer: ThrusterWriter, shutdown: Arc<tokio::sync::Notify>) {
    let mut attitude = AttitudeEstimator::default();
    let mut last_tick = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / CONTROL_HZ));
    let mut bypass_was_active = false;
    let mut write_tracker = FailureTracker::default();
    let mut sends_paused = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.notified() => {
                let (result, returned) = tokio::task::spawn_blocking(move || {
                    let r = writer.write_neutral();
                    (r, writer)
                })
                .await
                .expect("thruster neutral write task panicked");
                if let Err(e) = result {
                    warn!("failed to send neutral frame on shutdown: {e}");
                }
                info!("control tick loop stopped, neutral frame sent");
                return;
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last_tick).as_secs_f64().max(1.0 / 1000.0);
        last_tick = now;

        let (frame, bypass_active) = {
            let mut s = state.write().await;
            attitude.update(s.imu, s.health.imu_ok);
            s.regulator.pitch = attitude.pitch_deg;
            s.regulator.roll = attitude.roll_deg;

            expire_thruster_test_if_needed(&mut s, &hub);

            let config = s.config.clone();
            let depth = s.pressure.depth;
            let gyro = s.imu.gyroscope;

            let (direction_vector, bypass_active) = if let Some(mut tuner) = s.auto_tuner.take() {
                let pitch_kp = config.regulator_pid.pitch.gains.kp;
                let (axis_actuation, pitch_hold, outcome) =
                    tuner.tick(s.regulator.pitch, s.regulator.roll, depth, pitch_kp);
                let channel = match tuner.axis() {
                    autotune::Axis::Pitch => 3,
                    autotune::Axis::Roll => 5,
                    autotune::Axis::Depth => 2,
                };
                let mut v = [0.0; 8];
                v[channel] = axis_actuation;
                if let Some(hold) = pitch_hold {
                    v[3] = hold;
                }
                match outcome {
                    autotune::TickOutcome::Continue | autotune::TickOutcome::AxisFinished { .. } => {
                        s.auto_tuner = Some(tuner);
                    }
                    autotune::TickOutcome::Finished(suggestions) => {
                        s.regulator.auto_tuning_active = false;
                        s.regulator.auto_tuning_start = None;
                        hub.publish(OperatorMessage::RegulatorSuggestions(suggestions));
                    }
                }
                (v, true)
            } else if let Some(test_vector) = allocator::test_thrust_vector(&s.thrusters) {
                (test_vector, true)
            } else {
                let operator_vector =
                    if s.direction_command_is_fresh() { s.thrusters.direction_vector } else { [0.0; 8] };
                let status = s.status;
                (regulator::tick(&mut s.regulator, &config, &status, operator_vector, gyro, depth, dt), false)
            };

            // A relay/test actuation must reach the frame unsmoothed: smoothing
            // a bang-bang relay signal defeats the limit-cycle measurement the
            // auto-tuner's fit depends on, and during a thruster test it would
            // let the previous regulator output bleed into other channels
            // instead of jumping straight to neutral/test values.
            let thrust = if bypass_active {
                if !bypass_was_active {
                    s.smoothed_direction = direction_vector;
                }
                allocator::allocate(direction_vector, &config)
            } else {
                allocator::smooth(&mut s.smoothed_direction, direction_vector, &config, dt);
                allocator::allocate(s.smoothed_direction, &config)
            };
            (allocator::frame_from_thrust(thrust), bypass_active)
        };
        bypass_was_active = bypass_active;

        if sends_paused {
            continue;
        }

        let (result, returned) = tokio::task::spawn_blocking(move || {
            let r = writer.write_frame(&frame);
            (r, writer)
        })
        .await
        .expect("thruster write task panicked");
        writer = returned;

        match result {
            Ok(()) => {
                write_tracker.record(true);
                state.write().await.health.microcontroller_ok = true;
            }
            Err(e) => {
                warn!("thruster frame write failed: {e}");
                let healthy = write_tracker.record(false);
                state.write().await.health.microcontroller_ok = healthy;
                if !healthy {
                    sends_paused = true;
                    warn!("thruster output paused after three consecutive write failures; reinit required");
                }
            }
        }
    }
}

fn expire_thruster_test_if_needed(state: &mut VehicleState, hub: &OperatorHub) {
    match operator::test_countdown(state) {
        Some(remaining) => {
            if state.thrusters.last_remaining != Some(remaining) {
                state.thrusters.last_remaining = Some(remaining);
                hub.publish(operator::thruster_test_toast(remaining));
            }
        }
        None if state.thrusters.test_thruster.is_some() => {
            state.thrusters.test_thruster = None;
            state.thrusters.test_start_time = None;
            state.thrusters.last_remaining = None;
        }
        None => {}
    }
}

async fn telemetry_publish_loop(state: SharedState, hub: OperatorHub) {
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / TELEMETRY_HZ));
    loop {
        interval.tick().await;
        let s = state.read().await;
        let telemetry = rov_types::protocol::Telemetry {
            pitch: s.regulator.pitch,
            roll: s.regulator.roll,
            yaw: s.regulator.yaw,
            depth: s.pressure.depth,
            desired_pitch: s.regulator.desired_pitch,
            desired_roll: s.regulator.desired_roll,
            desired_yaw: 0.0,
            desired_depth: s.regulator.desired_depth,
            water_temperature: s.pressure.water_temperature,
            electronics_temperature: s.imu.temperature,
            thruster_rpms: s.esc.erpm,
            work_indicator_percentage: s.esc.current.iter().copied().fold(0.0, f64::max),
        };
        drop(s);
        hub.publish(OperatorMessage::Telemetry(telemetry));
    }
}

async fn status_publish_loop(state: SharedState, hub: OperatorHub) {
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / STATUS_HZ));
    let mut battery_ema: Option<f64> = None;
    loop {
        interval.tick().await;
        let mut s = state.write().await;
        let config = s.config.clone();
        let nonzero_voltages: Vec<f64> = s.esc.voltage.iter().copied().filter(|v| *v > 0.0).collect();
        if !nonzero_voltages.is_empty() {
            let mean_voltage = nonzero_voltages.iter().sum::<f64>() / nonzero_voltages.len() as f64;
            let span = (config.power.battery_max_voltage - config.power.battery_min_voltage).max(1e-6);
            let raw_pct = ((mean_voltage - config.power.battery_min_voltage) / span * 100.0).clamp(0.0, 100.0);
            let smoothed = match battery_ema {
                Some(prev) => BATTERY_EMA_ALPHA * raw_pct + (1.0 - BATTERY_EMA_ALPHA) * prev,
                None => raw_pct,
            };
            battery_ema = Some(smoothed);
            s.status.battery_percentage = smoothed;
        }
        let message = operator::status_update(&s);
        drop(s);
        hub.publish(message);
    }
}
