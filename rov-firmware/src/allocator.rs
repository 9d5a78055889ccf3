//! Thruster allocation, smoothing and pulse framing (spec §4.3), plus the
//! single-thruster test mode (spec §4.4).

use rov_types::config::RovConfig;
use rov_types::wire::ThrusterFrame;

use crate::state::ThrusterState;

/// Step limit per tick so a full-scale command ramps over `smoothing_factor`
/// seconds rather than jumping instantly.
fn step_limit(smoothing_factor: f64, dt: f64) -> f64 {
    if smoothing_factor <= 0.0 {
        return 2.0;
    }
    (dt / smoothing_factor).clamp(0.0, 2.0)
}

/// Advance `smoothed` one tick toward `target`, each channel independently
/// clamped to the per-tick step limit.
pub fn smooth(smoothed: &mut [f64; 8], target: [f64; 8], config: &RovConfig, dt: f64) {
    let limit = step_limit(config.smoothing_factor, dt);
    for i in 0..8 {
        let delta = (target[i] - smoothed[i]).clamp(-limit, limit);
        smoothed[i] += delta;
    }
}

/// Run the 8x8 allocation matrix, reorder to physical pins, apply spin
/// direction and clip to `[-1, 1]`. Input is the six-degree-of-freedom
/// direction vector (plus two reserved, always-zero channels).
pub fn allocate(direction_vector: [f64; 8], config: &RovConfig) -> [f64; 8] {
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

/// Turn an allocated `[-1, 1]` thrust vector into the outbound frame.
pub fn frame_from_thrust(thrust: [f64; 8]) -> ThrusterFrame {
    let mut pulses = [0u16; 8];
    for (p, t) in pulses.iter_mut().zip(thrust.iter()) {
        *p = ThrusterFrame::pulse_from_thrust(*t);
    }
    ThrusterFrame { pulses }
}

const TEST_FORWARD_THRUST: f64 = 0.1;
const TEST_DURATION_S: u64 = 10;

/// A single-thruster test is an isolated bypass of the allocator: one
/// channel gets a fixed forward pulse, everything else stays neutral.
/// Returns `None` once the 10-second window has elapsed.
pub fn test_thrust_vector(test: &ThrusterState) -> Option<[f64; 8]> {
    let thruster = test.test_thruster?;
    let start = test.test_start_time?;
    if start.elapsed().as_secs() >= TEST_DURATION_S {
        return None;
    }
    let mut out = [0.0; 8];
    if (thruster as usize) < 8 {
        out[thruster as usize] = TEST_FORWARD_THRUST;
    }
    Some(out)
}

/// Seconds remaining in the current thruster test, for the per-second toast
/// countdown. `None` once the test is over or not running.
pub fn test_seconds_remaining(test: &ThrusterState) -> Option<u64> {
    let start = test.test_start_time?;
    let elapsed = start.elapsed().as_secs();
    if elapsed >= TEST_DURATION_S {
        None
    } else {
        Some(TEST_DURATION_S - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rov_types::RovConfig;
    use std::time::{Duration, Instant};

    #[test]
    fn allocation_matches_single_axis_inputs() {
        let cfg = RovConfig::default();
        let mut surge = [0.0; 8];
        surge[0] = 1.0;
        let out = allocate(surge, &cfg);
        // thrusters 0,1,6,7 carry forward/back thrust; their signs come from
        // the allocation matrix and spin-direction table together.
        assert!(out[0].abs() > 0.0);
        assert!(out[2].abs() < 1e-9);
    }

    #[test]
    fn allocation_clips_to_unit_range() {
        let mut cfg = RovConfig::default();
        cfg.thruster_allocation.0[0][0] = 10.0;
        let mut surge = [0.0; 8];
        surge[0] = 1.0;
        let out = allocate(surge, &cfg);
        assert!(out[0] <= 1.0 && out[0] >= -1.0);
    }

    #[test]
    fn smoothing_limits_step_per_tick() {
        let cfg = RovConfig::default();
        let mut smoothed = [0.0; 8];
        let target = [1.0; 8];
        smooth(&mut smoothed, target, &cfg, 1.0 / 60.0);
        let limit = step_limit(cfg.smoothing_factor, 1.0 / 60.0);
        assert!(smoothed[0] <= limit + 1e-9);
        assert!(smoothed[0] > 0.0);
    }

    #[test]
    fn pulse_from_thrust_matches_wire_mapping() {
        let frame = frame_from_thrust([0.5, -0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(frame.pulses[0], 1500);
        assert_eq!(frame.pulses[1], 500);
    }

    #[test]
    fn thruster_test_expires_after_ten_seconds() {
        let mut test = ThrusterState::default();
        test.test_thruster = Some(2);
        test.test_start_time = Some(Instant::now() - Duration::from_secs(11));
        assert!(test_thrust_vector(&test).is_none());
        assert!(test_seconds_remaining(&test).is_none());
    }

    #[test]
    fn thruster_test_drives_only_selected_channel() {
        let mut test = ThrusterState::default();
        test.test_thruster = Some(3);
        test.test_start_time = Some(Instant::now());
        let out = test_thrust_vector(&test).unwrap();
        for (i, v) in out.iter().enumerate() {
            if i == 3 {
                assert_eq!(*v, TEST_FORWARD_THRUST);
            } else {
                assert_eq!(*v, 0.0);
            }
        }
    }
}
