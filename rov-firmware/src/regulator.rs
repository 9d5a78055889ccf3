//! Three independent PID loops (pitch, roll, depth) plus the world-to-body
//! mappings around them (spec §4.2).

use rov_types::config::RovConfig;
use tracing::error;

use crate::attitude::AttitudeEstimator;
use crate::error::ControlError;
use crate::linalg::Mat3;
use crate::state::{RegulatorState, SystemStatus, INTEGRAL_CLIP_DEG, INTEGRAL_CLIP_DEPTH_M};

const DEPTH_DERIV_TAU_S: f64 = 0.064;

/// Body-to-world rotation (yaw is not tracked; only pitch/roll feed this).
fn body_to_world_rotation(pitch_deg: f64, roll_deg: f64) -> Mat3 {
    let (cp, sp) = (pitch_deg.to_radians().cos(), pitch_deg.to_radians().sin());
    let (cr, sr) = (roll_deg.to_radians().cos(), roll_deg.to_radians().sin());
    Mat3([
        [cp, sp * sr, -sp * cr],
        [0.0, cr, sr],
        [sp, -cp * sr, cp * cr],
    ])
}

fn wrap_180(angle: f64) -> f64 {
    ((angle + 180.0).rem_euclid(360.0)) - 180.0
}

/// One control-tick evaluation of all three PID axes. `estimate` supplies the
/// latest fused pitch/roll (already advanced by the attitude estimator this
/// tick); `depth` is the latest pressure-derived depth reading.
pub fn tick(
    regulator: &mut RegulatorState,
    config: &RovConfig,
    status: &SystemStatus,
    operator_vector: [f64; 8],
    gyro: [f64; 3],
    depth: f64,
    dt: f64,
) -> [f64; 8] {
    let (gy_deg, gx_deg) = AttitudeEstimator::gyro_rates_deg_s(gyro);
    let pitch_rate_deg_s = -gy_deg;
    let roll_rate_deg_s = gx_deg;

    // ── Setpoint ramp ──
    if status.pitch_stabilization {
        let cmd_pitch = operator_vector[3];
        regulator.desired_pitch =
            (regulator.desired_pitch + cmd_pitch * config.regulator_pid.pitch.rate * dt).clamp(-80.0, 80.0);
    }
    if status.roll_stabilization {
        let cmd_roll = operator_vector[5];
        let mut desired = wrap_180(regulator.desired_roll + cmd_roll * config.regulator_pid.roll.rate * dt);
        let gap = desired - regulator.roll;
        if gap > 180.0 {
            desired -= 360.0;
        } else if gap < -180.0 {
            desired += 360.0;
        }
        regulator.desired_roll = desired;
    }

    // ── Pitch / roll actuation ──
    let mut u_pitch = 0.0;
    if status.pitch_stabilization {
        let r = operator_vector[3];
        let integral_scale = (1.0 - r.abs()).clamp(0.0, 1.0);
        regulator.integral_pitch =
            (regulator.integral_pitch + (regulator.desired_pitch - regulator.pitch) * dt * integral_scale)
                .clamp(-INTEGRAL_CLIP_DEG, INTEGRAL_CLIP_DEG);
        let gains = config.regulator_pid.pitch.gains;
        u_pitch = gains.kp * (regulator.desired_pitch - regulator.pitch).to_radians()
            + gains.ki * regulator.integral_pitch.to_radians()
            - gains.kd * pitch_rate_deg_s.to_radians();
        if regulator.roll.abs() >= 90.0 {
            u_pitch = -u_pitch;
        }
    }

    let mut u_roll = 0.0;
    if status.roll_stabilization {
        let r = operator_vector[5];
        let integral_scale = (1.0 - r.abs()).clamp(0.0, 1.0);
        regulator.integral_roll =
            (regulator.integral_roll + (regulator.desired_roll - regulator.roll) * dt * integral_scale)
                .clamp(-INTEGRAL_CLIP_DEG, INTEGRAL_CLIP_DEG);
        let gains = config.regulator_pid.roll.gains;
        u_roll = gains.kp * (regulator.desired_roll - regulator.roll).to_radians()
            + gains.ki * regulator.integral_roll.to_radians()
            - gains.kd * roll_rate_deg_s.to_radians();
    }

    let attitude_max = (config.power.regulator_max_power / 100.0).max(0.0);
    let attitude_peak = u_pitch.abs().max(u_roll.abs());
    if attitude_peak > attitude_max && attitude_peak > 0.0 {
        let scale = attitude_max / attitude_peak;
        u_pitch *= scale;
        u_roll *= scale;
    }

    // ── Depth actuation ──
    let mut depth_body = [0.0, 0.0, 0.0];
    if status.depth_hold {
        let error = -(regulator.desired_depth - depth);
        regulator.integral_depth =
            (regulator.integral_depth - error * dt).clamp(-INTEGRAL_CLIP_DEPTH_M, INTEGRAL_CLIP_DEPTH_M);

        if dt > 0.0 {
            let alpha = (-dt / DEPTH_DERIV_TAU_S).exp();
            let raw_deriv = (depth - regulator.previous_depth) / dt;
            regulator.depth_deriv_ema = alpha * regulator.depth_deriv_ema + (1.0 - alpha) * raw_deriv;
        }
        regulator.previous_depth = depth;

        let gains = config.regulator_pid.depth.gains;
        let u_depth_world =
            gains.kp * error + gains.ki * regulator.integral_depth + gains.kd * regulator.depth_deriv_ema;

        let dc = &config.direction_coefficients;
        let heave_n = 1.0f64;
        let surge_n = (dc.surge / dc.heave.max(1e-9)).max(0.1);
        let sway_n = (dc.sway / dc.heave.max(1e-9)).max(0.1);
        let rotation = body_to_world_rotation(regulator.pitch, regulator.roll);
        let coeff_diag = Mat3([[surge_n, 0.0, 0.0], [0.0, sway_n, 0.0], [0.0, 0.0, heave_n]]);
        let a = rotation.mul_mat(&coeff_diag);
        depth_body = a.solve([0.0, 0.0, u_depth_world]);

        let depth_max = (config.power.regulator_max_power / 100.0).max(0.0);
        let peak = depth_body.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if peak > depth_max && peak > 0.0 {
            let scale = depth_max / peak;
            for v in depth_body.iter_mut() {
                *v *= scale;
            }
        }
    }

    // ── Combine with operator command ──
    let stabilized = [
        status.depth_hold,
        status.depth_hold,
        status.depth_hold,
        status.pitch_stabilization,
        false,
        status.roll_stabilization,
        false,
        false,
    ];
    let user_scale = config.power.user_max_power / 100.0;

    let mut out = [0.0; 8];
    for i in 0..8 {
        let operator_term = if stabilized[i] { 0.0 } else { operator_vector[i] * user_scale };
        out[i] = operator_term;
    }
    out[0] += depth_body[0];
    out[1] += depth_body[1];
    out[2] += depth_body[2];
    out[3] += u_pitch;
    out[5] += u_roll;

    // ── Body-frame orientation mixing ──
    if status.pitch_stabilization || status.roll_stabilization {
        let dc = &config.direction_coefficients;
        let (ptc, ytc, rtc) = (dc.pitch, dc.yaw, dc.roll);
        let zero_axis = if ptc == 0.0 {
            Some("pitch")
        } else if ytc == 0.0 {
            Some("yaw")
        } else if rtc == 0.0 {
            Some("roll")
        } else {
            None
        };
        if let Some(axis) = zero_axis {
            error!("{}", ControlError::ZeroTurnCoefficient { axis });
        } else {
            let (pitch_g, yaw_g, roll_g) = (out[3], out[4], out[5]);
            let (cp, sp) = (regulator.pitch.to_radians().cos(), regulator.pitch.to_radians().sin());
            let (cr, sr) = (regulator.roll.to_radians().cos(), regulator.roll.to_radians().sin());
            out[3] = cr * pitch_g + sr * cp * yaw_g * (ytc / ptc);
            out[5] = roll_g - sp * yaw_g * (ytc / rtc);
            out[4] = cr * cp * yaw_g - sr * pitch_g * (ptc / ytc);
        }
    }

    regulator.last_update = Some(std::time::Instant::now());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rov_types::RovConfig;

    fn status(pitch: bool, roll: bool, depth: bool) -> SystemStatus {
        SystemStatus { pitch_stabilization: pitch, roll_stabilization: roll, depth_hold: depth, battery_percentage: 100.0 }
    }

    #[test]
    fn integrators_stay_within_clip_bounds() {
        let cfg = RovConfig::default();
        let mut reg = RegulatorState::default();
        let st = status(true, true, true);
        reg.desired_pitch = 80.0;
        reg.desired_roll = 0.0;
        for _ in 0..2000 {
            regulator_tick(&mut reg, &cfg, &st);
            assert!(reg.integral_pitch.abs() <= INTEGRAL_CLIP_DEG + 1e-9);
            assert!(reg.integral_roll.abs() <= INTEGRAL_CLIP_DEG + 1e-9);
            assert!(reg.integral_depth.abs() <= INTEGRAL_CLIP_DEPTH_M + 1e-9);
        }
    }

    fn regulator_tick(reg: &mut RegulatorState, cfg: &RovConfig, st: &SystemStatus) -> [f64; 8] {
        tick(reg, cfg, st, [0.0; 8], [0.0; 3], 0.0, 1.0 / 60.0)
    }

    #[test]
    fn scenario_s3_pitch_actuation_sign_and_magnitude() {
        let mut cfg = RovConfig::default();
        cfg.regulator_pid.pitch.gains.kp = 2.0;
        cfg.regulator_pid.pitch.gains.ki = 0.0;
        cfg.regulator_pid.pitch.gains.kd = 0.1;
        let mut reg = RegulatorState::default();
        reg.pitch = 10.0;
        reg.roll = 0.0;
        reg.desired_pitch = 0.0;
        let st = status(true, false, false);
        let out = tick(&mut reg, &cfg, &st, [0.0; 8], [0.0, 0.0, 0.0], 0.0, 1.0 / 60.0);
        assert!(out[3] < 0.0);
        assert!((out[3] - (-0.349)).abs() < 0.05);
    }

    #[test]
    fn stabilized_axis_zeroes_operator_term() {
        let cfg = RovConfig::default();
        let mut reg = RegulatorState::default();
        let st = status(true, false, false);
        let operator = [0.0, 0.0, 0.0, 0.9, 0.0, 0.0, 0.0, 0.0];
        let out = tick(&mut reg, &cfg, &st, operator, [0.0; 3], 0.0, 1.0 / 60.0);
        // Axis 3 is stabilized: the raw operator rate must not appear verbatim in the output.
        assert_ne!(out[3], 0.9);
    }

    #[test]
    fn depth_toggle_tracks_scenario_s5() {
        let cfg = RovConfig::default();
        let mut reg = RegulatorState::default();
        reg.desired_depth = 2.5;
        reg.previous_depth = 2.5;
        let st = status(false, false, true);
        let out = tick(&mut reg, &cfg, &st, [0.0; 8], [0.0; 3], 2.5, 1.0 / 60.0);
        assert!(out[0].abs() < 1.0 && out[1].abs() < 1.0 && out[2].abs() < 1.0);
        assert!(reg.integral_depth.abs() < 1e-6);
    }
}
