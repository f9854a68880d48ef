//! Scalar Kalman filter bank.
//!
//! Each of the six attitude signals (ψ, θ, φ, ψ̇, θ̇, φ̇) is tracked by its
//! own independent two-state (value, rate) filter. Kept as plain `f64`
//! fields with inlined 2x2 arithmetic rather than a matrix crate, matching
//! the fixed-size no-allocation kernels used elsewhere in the pipeline.

use crate::config::KalmanConfig;

/// Fixed process/measurement noise for one scalar signal.
#[derive(Debug, Clone, Copy)]
pub struct KalmanTuning {
    pub q_value: f64,
    pub q_rate: f64,
    pub r_meas: f64,
}

impl From<crate::config::KalmanTuning> for KalmanTuning {
    fn from(t: crate::config::KalmanTuning) -> Self {
        KalmanTuning {
            q_value: t.q_value,
            q_rate: t.q_rate,
            r_meas: t.r_meas,
        }
    }
}

/// Two-state scalar Kalman filter: state `(value, rate)`, covariance `P`.
///
/// `P` is kept as its three distinct entries (`p00`, `p01`=`p10`, `p11`);
/// the filter never produces an asymmetric covariance so a fourth field
/// would only be a redundant copy.
#[derive(Debug, Clone, Copy)]
pub struct ScalarKalman {
    pub value: f64,
    pub rate: f64,
    p00: f64,
    p01: f64,
    p11: f64,
    tuning: KalmanTuning,
}

impl ScalarKalman {
    /// Initialise at `value` with zero rate and an identity covariance.
    pub fn new(tuning: KalmanTuning, initial_value: f64) -> Self {
        ScalarKalman {
            value: initial_value,
            rate: 0.0,
            p00: 1.0,
            p01: 0.0,
            p11: 1.0,
            tuning,
        }
    }

    /// One predict+update tick against measurement `z` over interval `dt`.
    ///
    /// Returns `Err` (a transient fault) if the innovation variance `S`
    /// is non-positive; state is left unmodified in that case so the
    /// caller can re-publish the previous snapshot.
    pub fn tick(&mut self, z: f64, dt: f64) -> Result<(), crate::error::RecoverableFault> {
        // Predict: x <- A x, with A = [[1, dt], [0, 1]].
        let value_pred = self.value + dt * self.rate;
        let rate_pred = self.rate;

        // P <- A P A^T + Q, expanded for A = [[1, dt], [0, 1]], P symmetric.
        let p00_pred = self.p00 + 2.0 * dt * self.p01 + dt * dt * self.p11 + self.tuning.q_value;
        let p01_pred = self.p01 + dt * self.p11;
        let p11_pred = self.p11 + self.tuning.q_rate;

        // Update: C = [1, 0], S = C P C^T + R = p00 + R.
        let s = p00_pred + self.tuning.r_meas;
        if !(s > 0.0) || !s.is_finite() {
            return Err(crate::error::RecoverableFault::NonPositiveInnovationVariance);
        }

        // Kalman gain K = P C^T / S = (p00, p01) / S.
        let k0 = p00_pred / s;
        let k1 = p01_pred / s;

        let innovation = z - value_pred;
        self.value = value_pred + k0 * innovation;
        self.rate = rate_pred + k1 * innovation;

        // P <- (I - K C) P
        self.p00 = (1.0 - k0) * p00_pred;
        self.p01 = (1.0 - k0) * p01_pred;
        self.p11 = p11_pred - k1 * p01_pred;

        Ok(())
    }

    /// Diagonal of the covariance matrix, for the PSD invariant checks.
    pub fn covariance_diagonal(&self) -> (f64, f64) {
        (self.p00, self.p11)
    }
}

/// The six independent scalar filters the estimator drives each tick.
pub struct KalmanBank {
    pub psi: ScalarKalman,
    pub theta: ScalarKalman,
    pub phi: ScalarKalman,
    pub psi_dot: ScalarKalman,
    pub theta_dot: ScalarKalman,
    pub phi_dot: ScalarKalman,
}

impl KalmanBank {
    pub fn new(cfg: &KalmanConfig, psi0: f64, theta0: f64, phi0: f64) -> Self {
        KalmanBank {
            psi: ScalarKalman::new(cfg.psi.into(), psi0),
            theta: ScalarKalman::new(cfg.theta.into(), theta0),
            phi: ScalarKalman::new(cfg.phi.into(), phi0),
            psi_dot: ScalarKalman::new(cfg.psi_dot.into(), 0.0),
            theta_dot: ScalarKalman::new(cfg.theta_dot.into(), 0.0),
            phi_dot: ScalarKalman::new(cfg.phi_dot.into(), 0.0),
        }
    }
}
