//! vehicle_dynamics.rs — Rigid-body response of the vehicle to thruster
//! output, standing in for the real hull/water system.
//!
//! Pitch and roll are modeled as damped first-order rotational systems
//! driven by torque derived from the same thruster layout rov-firmware
//! allocates onto; depth is a damped first-order translational system
//! driven by net heave thrust. There is no restoring (buoyancy) term: a
//! trimmed ROV is neutrally buoyant, so without vertical thrust the
//! vehicle holds whatever depth it is already at.

use serde::{Deserialize, Serialize};

const PITCH_INERTIA: f64 = 1.0;
const ROLL_INERTIA: f64 = 1.0;
const HEAVE_MASS: f64 = 1.0;
const ANGULAR_DAMPING: f64 = 1.2;
const HEAVE_DAMPING: f64 = 1.5;
const TORQUE_GAIN: f64 = 45.0; // deg/s^2 per unit collective thrust
const HEAVE_GAIN: f64 = 0.6; // m/s^2 per unit collective thrust

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VehicleState {
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub depth_m: f64,
    pub pitch_rate_deg_s: f64,
    pub roll_rate_deg_s: f64,
    pub depth_rate_m_s: f64,
}

/// Advances the rigid-body model one tick given the allocated, clipped
/// per-thruster thrust vector (same `[-1, 1] x 8` channel layout the
/// firmware's allocator produces).
pub struct VehicleDynamics {
    pub state: VehicleState,
}

impl VehicleDynamics {
    pub fn new() -> Self {
        Self { state: VehicleState::default() }
    }

    pub fn tick(&mut self, thrust: [f64; 8], dt: f64) {
        // Vertical thrusters are channels 2-5 in the default allocation
        // layout (see rov_types::config::ThrustAllocationMatrix); pitch
        // couples fore/aft pairs, roll couples port/starboard pairs.
        let heave = (thrust[2] + thrust[3] + thrust[4] + thrust[5]) / 4.0;
        let pitch_torque = (thrust[2] + thrust[3] - thrust[4] - thrust[5]) / 2.0;
        let roll_torque = (thrust[2] - thrust[3] + thrust[4] - thrust[5]) / 2.0;

        let pitch_accel = (pitch_torque * TORQUE_GAIN) / PITCH_INERTIA - ANGULAR_DAMPING * self.state.pitch_rate_deg_s;
        let roll_accel = (roll_torque * TORQUE_GAIN) / ROLL_INERTIA - ANGULAR_DAMPING * self.state.roll_rate_deg_s;
        let depth_accel = (heave * HEAVE_GAIN) / HEAVE_MASS - HEAVE_DAMPING * self.state.depth_rate_m_s;

        self.state.pitch_rate_deg_s += pitch_accel * dt;
        self.state.roll_rate_deg_s += roll_accel * dt;
        self.state.depth_rate_m_s += depth_accel * dt;

        self.state.pitch_deg = (self.state.pitch_deg + self.state.pitch_rate_deg_s * dt).clamp(-90.0, 90.0);
        self.state.roll_deg = wrap_180(self.state.roll_deg + self.state.roll_rate_deg_s * dt);
        self.state.depth_m = (self.state.depth_m + self.state.depth_rate_m_s * dt).max(0.0);
    }
}

impl Default for VehicleDynamics {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap_180(angle: f64) -> f64 {
    ((angle + 180.0).rem_euclid(360.0)) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_settles_under_sustained_torque() {
        let mut dyn_model = VehicleDynamics::new();
        let thrust = [0.0, 0.0, 1.0, 1.0, -1.0, -1.0, 0.0, 0.0];
        for _ in 0..600 {
            dyn_model.tick(thrust, 1.0 / 60.0);
        }
        assert!(dyn_model.state.pitch_deg.abs() > 1.0);
        assert!(dyn_model.state.pitch_rate_deg_s.abs() < 50.0);
    }

    #[test]
    fn zero_thrust_holds_depth() {
        let mut dyn_model = VehicleDynamics::new();
        dyn_model.state.depth_m = 3.0;
        for _ in 0..120 {
            dyn_model.tick([0.0; 8], 1.0 / 60.0);
        }
        assert!((dyn_model.state.depth_m - 3.0).abs() < 1e-6);
    }

    #[test]
    fn roll_wraps_past_180_degrees() {
        let mut dyn_model = VehicleDynamics::new();
        dyn_model.state.roll_deg = 179.0;
        dyn_model.state.roll_rate_deg_s = 200.0;
        dyn_model.tick([0.0; 8], 0.1);
        assert!(dyn_model.state.roll_deg > -180.0 && dyn_model.state.roll_deg <= 180.0);
    }
}
