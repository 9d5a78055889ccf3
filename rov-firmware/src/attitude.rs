//! Complementary-filter attitude estimator (spec §4.1).

use crate::state::ImuSample;

const ALPHA: f64 = 0.98;

#[derive(Debug, Clone, Copy)]
pub struct AttitudeEstimator {
    pub pitch_deg: f64,
    pub roll_deg: f64,
    last_sample_at: Option<std::time::Instant>,
}

impl Default for AttitudeEstimator {
    fn default() -> Self {
        Self { pitch_deg: 0.0, roll_deg: 0.0, last_sample_at: None }
    }
}

impl AttitudeEstimator {
    /// Returns the filtered gyro rates in deg/s about pitch and roll, used
    /// directly as the PID derivative terms. Call after `update`.
    pub fn gyro_rates_deg_s(gyro: [f64; 3]) -> (f64, f64) {
        (gyro[1].to_degrees(), gyro[0].to_degrees())
    }

    /// Advance the filter with one IMU sample. If `imu_ok` is false the
    /// estimate is held at its last value and the next valid sample rebases
    /// `dt` (no integration over the gap).
    pub fn update(&mut self, sample: ImuSample, imu_ok: bool) {
        if !imu_ok {
            self.last_sample_at = None;
            return;
        }

        let dt = match self.last_sample_at {
            Some(prev) => sample.measured_at.duration_since(prev).as_secs_f64(),
            None => 0.0,
        };
        self.last_sample_at = Some(sample.measured_at);

        let [ax, ay, az] = sample.acceleration;
        let [gx, gy, _gz] = sample.gyroscope;
        let (gy_deg, gx_deg) = (gy.to_degrees(), gx.to_degrees());

        let accel_pitch = ax.atan2((ay * ay + az * az).sqrt()).to_degrees();
        let accel_roll = ay.atan2(az).to_degrees();

        let mut roll_prev = self.roll_deg;
        let diff = accel_roll - roll_prev;
        if diff > 180.0 {
            roll_prev += 360.0;
        } else if diff < -180.0 {
            roll_prev -= 360.0;
        }

        let inverted = roll_prev.abs() >= 90.0;
        let gyro_pitch = if inverted {
            self.pitch_deg + gy_deg * dt
        } else {
            self.pitch_deg - gy_deg * dt
        };

        let fused_pitch = ALPHA * gyro_pitch + (1.0 - ALPHA) * accel_pitch;
        let fused_roll = ALPHA * (roll_prev + gx_deg * dt) + (1.0 - ALPHA) * accel_roll;

        self.roll_deg = ((fused_roll + 180.0).rem_euclid(360.0)) - 180.0;
        self.pitch_deg = fused_pitch.clamp(-90.0, 90.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sample_at(t: Instant, accel: [f64; 3], gyro: [f64; 3]) -> ImuSample {
        ImuSample { acceleration: accel, gyroscope: gyro, temperature: 20.0, measured_at: t }
    }

    #[test]
    fn converges_toward_level_accelerometer() {
        let mut est = AttitudeEstimator::default();
        let t0 = Instant::now();
        for i in 0..200 {
            let t = t0 + Duration::from_millis(i * 10);
            est.update(sample_at(t, [0.0, 0.0, -9.81], [0.0, 0.0, 0.0]), true);
        }
        assert!(est.pitch_deg.abs() < 0.5);
        assert!(est.roll_deg.abs() < 0.5);
    }

    #[test]
    fn pitch_stays_in_bounds_and_roll_wraps() {
        let mut est = AttitudeEstimator::default();
        let t0 = Instant::now();
        for i in 0..500 {
            let t = t0 + Duration::from_millis(i * 10);
            // Strong persistent gyro rate to exercise the wrap/clamp paths.
            est.update(sample_at(t, [9.81, 0.0, 0.0], [0.0, 5.0, 0.0]), true);
            assert!(est.pitch_deg >= -90.0 && est.pitch_deg <= 90.0);
            assert!(est.roll_deg > -180.0 && est.roll_deg <= 180.0);
        }
    }

    #[test]
    fn unhealthy_imu_holds_last_estimate_and_rebases_dt() {
        let mut est = AttitudeEstimator::default();
        let t0 = Instant::now();
        est.update(sample_at(t0, [0.0, 0.0, -9.81], [0.0, 1.0, 0.0]), true);
        let held_pitch = est.pitch_deg;
        est.update(sample_at(t0 + Duration::from_secs(5), [0.0, 0.0, -9.81], [0.0, 1.0, 0.0]), false);
        assert_eq!(est.pitch_deg, held_pitch);
        assert!(est.last_sample_at.is_none());
    }
}
