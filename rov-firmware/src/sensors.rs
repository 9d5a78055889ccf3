//! IMU and pressure sensor adapters.
//!
//! The physical I2C/SPI drivers for these parts are an external
//! collaborator boundary: this module defines the trait each polling task
//! drives, a simulated backend for development and tests, and the
//! consecutive-failure health bookkeeping shared by both polls.

use std::time::Instant;

use anyhow::Result;
use rov_types::config::FluidType;

use crate::state::{ImuSample, PressureSample};

const STANDARD_GRAVITY_M_S2: f64 = 9.80665;
const SURFACE_PRESSURE_PA: f64 = 101_325.0;
const FRESHWATER_DENSITY_KG_M3: f64 = 997.0;
const SALTWATER_DENSITY_KG_M3: f64 = 1023.6;

pub trait ImuBackend: Send {
    fn read(&mut self) -> Result<ImuSample>;
}

pub trait PressureBackend: Send {
    fn read(&mut self) -> Result<PressureSample>;
}

/// Still-water, level-vehicle stand-in used when no real sensor backend is
/// wired up. Exercised by the default binary and by tests.
pub struct SimulatedImuBackend;

impl ImuBackend for SimulatedImuBackend {
    fn read(&mut self) -> Result<ImuSample> {
        Ok(ImuSample {
            acceleration: [0.0, 0.0, -STANDARD_GRAVITY_M_S2],
            gyroscope: [0.0, 0.0, 0.0],
            temperature: 20.0,
            measured_at: Instant::now(),
        })
    }
}

pub struct SimulatedPressureBackend;

impl PressureBackend for SimulatedPressureBackend {
    fn read(&mut self) -> Result<PressureSample> {
        Ok(PressureSample {
            pressure: SURFACE_PRESSURE_PA,
            water_temperature: 20.0,
            depth: 0.0,
            measured_at: Instant::now(),
        })
    }
}

/// Convert an absolute pressure reading to depth below the surface.
pub fn depth_from_pressure(pressure_pa: f64, fluid: FluidType) -> f64 {
    let density = match fluid {
        FluidType::Freshwater => FRESHWATER_DENSITY_KG_M3,
        FluidType::Saltwater => SALTWATER_DENSITY_KG_M3,
    };
    ((pressure_pa - SURFACE_PRESSURE_PA) / (density * STANDARD_GRAVITY_M_S2)).max(0.0)
}

/// Tracks consecutive read failures for one sensor. `record` returns the
/// resulting health flag; three consecutive failures flips it unhealthy,
/// any success clears the streak immediately.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
}

const UNHEALTHY_AFTER: u32 = 3;

impl FailureTracker {
    pub fn record(&mut self, ok: bool) -> bool {
        if ok {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        self.consecutive_failures < UNHEALTHY_AFTER
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures < UNHEALTHY_AFTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_imu_reports_level_and_still() {
        let mut imu = SimulatedImuBackend;
        let sample = imu.read().unwrap();
        assert_eq!(sample.gyroscope, [0.0; 3]);
        assert!((sample.acceleration[2] + STANDARD_GRAVITY_M_S2).abs() < 1e-9);
    }

    #[test]
    fn depth_from_pressure_is_zero_at_surface() {
        assert_eq!(depth_from_pressure(SURFACE_PRESSURE_PA, FluidType::Freshwater), 0.0);
    }

    #[test]
    fn depth_from_pressure_increases_with_depth_and_density() {
        let fresh = depth_from_pressure(SURFACE_PRESSURE_PA + 50_000.0, FluidType::Freshwater);
        let salt = depth_from_pressure(SURFACE_PRESSURE_PA + 50_000.0, FluidType::Saltwater);
        assert!(fresh > 0.0);
        assert!(salt < fresh); // denser fluid -> less depth for the same pressure delta
    }

    #[test]
    fn failure_tracker_flips_unhealthy_after_three_failures() {
        let mut tracker = FailureTracker::default();
        assert!(tracker.record(false));
        assert!(tracker.record(false));
        assert!(!tracker.record(false));
        assert!(!tracker.is_healthy());
        assert!(tracker.record(true));
        assert!(tracker.is_healthy());
    }
}
