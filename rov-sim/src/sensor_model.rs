//! sensor_model.rs — Synthesizes the raw IMU, pressure and ESC telemetry
//! readings a real microcontroller would hand back over the serial link,
//! derived from the vehicle dynamics model plus sensor noise.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::vehicle_dynamics::VehicleState;

const STANDARD_GRAVITY_M_S2: f64 = 9.80665;
const SURFACE_PRESSURE_PA: f64 = 101_325.0;
const FRESHWATER_DENSITY_KG_M3: f64 = 997.0;

const ACCEL_NOISE_STD: f64 = 0.03;
const GYRO_NOISE_STD_DEG_S: f64 = 0.2;
const PRESSURE_NOISE_STD_PA: f64 = 15.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulatedImuSample {
    pub acceleration: [f64; 3],
    pub gyroscope: [f64; 3],
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulatedPressureSample {
    pub pressure: f64,
    pub water_temperature: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulatedEscSample {
    pub erpm: [f64; 8],
    pub voltage: [f64; 8],
    pub current: [f64; 8],
    pub temperature: [f64; 8],
}

/// Injectable sensor faults, toggled from the control channel so a
/// firmware developer can exercise the health/failover paths without
/// real hardware misbehaving.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaultConfig {
    pub imu_dropout: bool,
    pub pressure_dropout: bool,
    pub thruster_stall: bool,
}

pub struct SensorModel {
    rng: StdRng,
    accel_noise: Normal<f64>,
    gyro_noise: Normal<f64>,
    pressure_noise: Normal<f64>,
}

impl SensorModel {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            accel_noise: Normal::new(0.0, ACCEL_NOISE_STD).unwrap(),
            gyro_noise: Normal::new(0.0, GYRO_NOISE_STD_DEG_S).unwrap(),
            pressure_noise: Normal::new(0.0, PRESSURE_NOISE_STD_PA).unwrap(),
        }
    }

    /// `None` models a sensor dropout (no bytes on the wire this tick).
    pub fn imu_sample(&mut self, vehicle: &VehicleState, faults: &FaultConfig) -> Option<SimulatedImuSample> {
        if faults.imu_dropout {
            return None;
        }
        let (pitch_rad, roll_rad) = (vehicle.pitch_deg.to_radians(), vehicle.roll_deg.to_radians());
        let ax = STANDARD_GRAVITY_M_S2 * pitch_rad.sin() + self.accel_noise.sample(&mut self.rng);
        let ay = STANDARD_GRAVITY_M_S2 * pitch_rad.cos() * roll_rad.sin() + self.accel_noise.sample(&mut self.rng);
        let az = -STANDARD_GRAVITY_M_S2 * pitch_rad.cos() * roll_rad.cos() + self.accel_noise.sample(&mut self.rng);

        let gx = vehicle.roll_rate_deg_s.to_radians() + self.gyro_noise.sample(&mut self.rng).to_radians();
        let gy = -vehicle.pitch_rate_deg_s.to_radians() + self.gyro_noise.sample(&mut self.rng).to_radians();

        Some(SimulatedImuSample { acceleration: [ax, ay, az], gyroscope: [gx, gy, 0.0], temperature: 22.0 })
    }

    pub fn pressure_sample(&mut self, vehicle: &VehicleState, faults: &FaultConfig) -> Option<SimulatedPressureSample> {
        if faults.pressure_dropout {
            return None;
        }
        let pressure = SURFACE_PRESSURE_PA
            + vehicle.depth_m * FRESHWATER_DENSITY_KG_M3 * STANDARD_GRAVITY_M_S2
            + self.pressure_noise.sample(&mut self.rng);
        Some(SimulatedPressureSample { pressure, water_temperature: 18.0 })
    }

    pub fn esc_sample(&mut self, thrust: [f64; 8], faults: &FaultConfig) -> SimulatedEscSample {
        let mut sample = SimulatedEscSample {
            erpm: [0.0; 8],
            voltage: [16.0; 8],
            current: [0.0; 8],
            temperature: [25.0; 8],
        };
        for i in 0..8 {
            let magnitude = if faults.thruster_stall { 0.0 } else { thrust[i].abs() };
            sample.erpm[i] = magnitude * 4000.0;
            sample.current[i] = magnitude * 8.0;
            sample.temperature[i] = 25.0 + magnitude * 15.0;
        }
        sample
    }
}

impl Default for SensorModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_vehicle_reads_near_gravity_on_z() {
        let mut model = SensorModel::new();
        let vehicle = VehicleState::default();
        let sample = model.imu_sample(&vehicle, &FaultConfig::default()).unwrap();
        assert!((sample.acceleration[2] + STANDARD_GRAVITY_M_S2).abs() < 1.0);
    }

    #[test]
    fn imu_dropout_suppresses_samples() {
        let mut model = SensorModel::new();
        let faults = FaultConfig { imu_dropout: true, ..Default::default() };
        assert!(model.imu_sample(&VehicleState::default(), &faults).is_none());
    }

    #[test]
    fn pressure_increases_with_depth() {
        let mut model = SensorModel::new();
        let shallow = model.pressure_sample(&VehicleState::default(), &FaultConfig::default()).unwrap();
        let mut deep_state = VehicleState::default();
        deep_state.depth_m = 10.0;
        let deep = model.pressure_sample(&deep_state, &FaultConfig::default()).unwrap();
        assert!(deep.pressure > shallow.pressure);
    }

    #[test]
    fn thruster_stall_zeroes_esc_readings() {
        let mut model = SensorModel::new();
        let faults = FaultConfig { thruster_stall: true, ..Default::default() };
        let sample = model.esc_sample([1.0; 8], &faults);
        assert_eq!(sample.erpm, [0.0; 8]);
    }
}
