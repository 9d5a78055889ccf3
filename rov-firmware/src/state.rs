//! Vehicle state: the single shared structure every periodic task reads
//! from and writes its own slots into. One coarse `RwLock` protects it;
//! no task ever holds that lock across an `.await` on I/O.

use std::sync::Arc;
use std::time::Instant;

use rov_types::RovConfig;

pub const INTEGRAL_CLIP_DEG: f64 = 40.0;
pub const INTEGRAL_CLIP_DEPTH_M: f64 = 3.0;
pub const THRUSTER_TIMEOUT_MS: u64 = 200;

#[derive(Debug, Clone, Copy)]
pub struct ImuSample {
    pub acceleration: [f64; 3],
    pub gyroscope: [f64; 3],
    pub temperature: f64,
    pub measured_at: Instant,
}

impl Default for ImuSample {
    fn default() -> Self {
        Self { acceleration: [0.0, 0.0, -9.81], gyroscope: [0.0; 3], temperature: 20.0, measured_at: Instant::now() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PressureSample {
    pub pressure: f64,
    pub water_temperature: f64,
    pub depth: f64,
    pub measured_at: Instant,
}

impl Default for PressureSample {
    fn default() -> Self {
        Self { pressure: 101325.0, water_temperature: 20.0, depth: 0.0, measured_at: Instant::now() }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EscReading {
    pub erpm: [f64; 8],
    pub voltage: [f64; 8],
    pub current: [f64; 8],
    pub temperature: [f64; 8],
    pub stress: [f64; 8],
}

#[derive(Debug, Clone, Copy)]
pub struct RegulatorState {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    pub desired_pitch: f64,
    pub desired_roll: f64,
    pub desired_depth: f64,
    pub integral_pitch: f64,
    pub integral_roll: f64,
    pub integral_depth: f64,
    pub previous_depth: f64,
    pub depth_deriv_ema: f64,
    pub last_update: Option<Instant>,
    pub auto_tuning_active: bool,
    pub auto_tuning_start: Option<Instant>,
}

impl Default for RegulatorState {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            desired_pitch: 0.0,
            desired_roll: 0.0,
            desired_depth: 0.0,
            integral_pitch: 0.0,
            integral_roll: 0.0,
            integral_depth: 0.0,
            previous_depth: 0.0,
            depth_deriv_ema: 0.0,
            last_update: None,
            auto_tuning_active: false,
            auto_tuning_start: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThrusterState {
    pub direction_vector: [f64; 8],
    pub last_direction_time: Option<Instant>,
    pub test_thruster: Option<u8>,
    pub test_start_time: Option<Instant>,
    pub last_remaining: Option<u64>,
}

impl Default for ThrusterState {
    fn default() -> Self {
        Self {
            direction_vector: [0.0; 8],
            last_direction_time: None,
            test_thruster: None,
            test_start_time: None,
            last_remaining: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemHealth {
    pub imu_ok: bool,
    pub pressure_sensor_ok: bool,
    pub microcontroller_ok: bool,
}

impl Default for SystemHealth {
    fn default() -> Self {
        Self { imu_ok: true, pressure_sensor_ok: true, microcontroller_ok: true }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStatus {
    pub pitch_stabilization: bool,
    pub roll_stabilization: bool,
    pub depth_hold: bool,
    pub battery_percentage: f64,
}

/// The single in-process shared structure. Fields are grouped by owning
/// task; see module docs and §5 of the design notes for the write
/// discipline each group follows.
pub struct VehicleState {
    pub config: Arc<RovConfig>,
    pub imu: ImuSample,
    pub pressure: PressureSample,
    pub esc: EscReading,
    pub regulator: RegulatorState,
    pub thrusters: ThrusterState,
    pub health: SystemHealth,
    pub status: SystemStatus,
    /// Smoothed output of the allocator's per-tick step limiter; owned by the
    /// output sender, not reset elsewhere.
    pub smoothed_direction: [f64; 8],
    /// Present only while `regulator.auto_tuning_active`; owns the relay
    /// sweep's own phase/sample state, separate from steady-state PID state.
    pub auto_tuner: Option<crate::autotune::AutoTuner>,
}

impl VehicleState {
    pub fn new(config: RovConfig) -> Self {
        Self {
            config: Arc::new(config),
            imu: ImuSample::default(),
            pressure: PressureSample::default(),
            esc: EscReading::default(),
            regulator: RegulatorState::default(),
            thrusters: ThrusterState::default(),
            health: SystemHealth::default(),
            status: SystemStatus::default(),
            smoothed_direction: [0.0; 8],
            auto_tuner: None,
        }
    }

    /// Only one of thruster-test or auto-tuning may be active (spec invariant).
    pub fn normal_control_active(&self) -> bool {
        self.thrusters.test_thruster.is_none() && !self.regulator.auto_tuning_active
    }

    pub fn direction_command_is_fresh(&self) -> bool {
        match self.thrusters.last_direction_time {
            Some(t) => t.elapsed().as_millis() < THRUSTER_TIMEOUT_MS as u128,
            None => false,
        }
    }
}
