//! Minimal 3x3 linear algebra shared by the depth-actuation world-to-body
//! solve and the auto-tuner's sinusoid curve fit. Small enough that a
//! hand-rolled Cramer's-rule inverse is clearer than a dependency.

#[derive(Debug, Clone, Copy)]
pub struct Mat3(pub [[f64; 3]; 3]);

impl Mat3 {
    pub fn zero() -> Self {
        Mat3([[0.0; 3]; 3])
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.0;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    pub fn transpose(&self) -> Mat3 {
        let m = &self.0;
        Mat3([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    pub fn mul_mat(&self, other: &Mat3) -> Mat3 {
        let mut out = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                out[i][j] = (0..3).map(|k| self.0[i][k] * other.0[k][j]).sum();
            }
        }
        Mat3(out)
    }

    pub fn mul_vec(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    pub fn inverse(&self) -> Option<Mat3> {
        let det = self.determinant();
        if det.abs() < 1e-9 {
            return None;
        }
        let m = &self.0;
        let inv_det = 1.0 / det;
        let c = |a: usize, b: usize, c: usize, d: usize| (m[a][b] * m[c][d] - m[a][d] * m[c][b]) * inv_det;
        Some(Mat3([
            [c(1, 1, 2, 2), -c(0, 1, 2, 2), c(0, 1, 1, 2)],
            [-c(1, 0, 2, 2), c(0, 0, 2, 2), -c(0, 0, 1, 2)],
            [c(1, 0, 2, 1), -c(0, 0, 2, 1), c(0, 0, 1, 1)],
        ]))
    }

    /// Solve `A x = b`. If `A` is singular, falls back to a ridge-regularized
    /// least-squares solve (`(AᵀA + εI)⁻¹ Aᵀb`) rather than propagating NaN.
    pub fn solve(&self, b: [f64; 3]) -> [f64; 3] {
        if let Some(inv) = self.inverse() {
            return inv.mul_vec(b);
        }
        let at = self.transpose();
        let mut ata = at.mul_mat(self);
        for i in 0..3 {
            ata.0[i][i] += 1e-6;
        }
        match ata.inverse() {
            Some(inv) => inv.mul_vec(at.mul_vec(b)),
            None => [0.0; 3],
        }
    }
}

/// Least-squares fit of `y = alpha*sin(2*pi*f*t) + beta*cos(2*pi*f*t) + c`
/// for a fixed frequency `f`, via the normal equations on the three linear
/// coefficients.
pub fn fit_linear_sinusoid(samples: &[(f64, f64)], f: f64) -> (f64, f64, f64) {
    let mut ata = Mat3::zero();
    let mut atb = [0.0; 3];
    for &(t, y) in samples {
        let w = 2.0 * std::f64::consts::PI * f * t;
        let row = [w.sin(), w.cos(), 1.0];
        for i in 0..3 {
            atb[i] += row[i] * y;
            for j in 0..3 {
                ata.0[i][j] += row[i] * row[j];
            }
        }
    }
    let x = ata.solve(atb);
    (x[0], x[1], x[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_well_conditioned_system() {
        let a = Mat3([[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 4.0]]);
        let x = a.solve([4.0, 9.0, 8.0]);
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 3.0).abs() < 1e-9);
        assert!((x[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn falls_back_on_singular_matrix() {
        let a = Mat3([[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        let x = a.solve([1.0, 1.0, 0.0]);
        assert!(x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn recovers_known_sinusoid_coefficients() {
        let f = 0.2;
        let (alpha_true, beta_true, c_true) = (1.5, -0.5, 0.2);
        let samples: Vec<(f64, f64)> = (0..200)
            .map(|i| {
                let t = i as f64 * 0.05;
                let w = 2.0 * std::f64::consts::PI * f * t;
                (t, alpha_true * w.sin() + beta_true * w.cos() + c_true)
            })
            .collect();
        let (alpha, beta, c) = fit_linear_sinusoid(&samples, f);
        assert!((alpha - alpha_true).abs() < 1e-6);
        assert!((beta - beta_true).abs() < 1e-6);
        assert!((c - c_true).abs() < 1e-6);
    }
}
