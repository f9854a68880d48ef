//! Attitude estimator: calibration, DCM zeroing, unwrap, and the Kalman
//! pipeline that turns raw Euler samples into a filtered attitude snapshot.

use crate::config::Config;
use crate::error::RecoverableFault;
use crate::kalman::KalmanBank;
use crate::shared::{FaultLatch, PeriodicTimer, QuitFlag, Snapshot};
use crate::types::{AttitudeSnapshot, CalibrationFrame, RawSample};
use std::time::{Duration, Instant};

/// Row-major 3x3 matrix, used for the body-to-world DCM and the zeroing
/// rotation. A fixed array rather than a general linear-algebra crate,
/// matching the pipeline's allocation-free numerical kernels.
pub type Mat3 = [[f64; 3]; 3];

const IDENTITY3: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn mat3_mul(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

fn mat3_transpose(a: Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[j][i] = a[i][j];
        }
    }
    out
}

/// Body-to-world direction cosine matrix for Tait-Bryan ZYX
/// (yaw about Z, pitch about Y, roll about X).
pub fn dcm_zyx(psi: f64, theta: f64, phi: f64) -> Mat3 {
    let (sy, cy) = psi.sin_cos();
    let (sp, cp) = theta.sin_cos();
    let (sr, cr) = phi.sin_cos();

    let rz = [[cy, -sy, 0.0], [sy, cy, 0.0], [0.0, 0.0, 1.0]];
    let ry = [[cp, 0.0, sp], [0.0, 1.0, 0.0], [-sp, 0.0, cp]];
    let rx = [[1.0, 0.0, 0.0], [0.0, cr, -sr], [0.0, sr, cr]];

    mat3_mul(mat3_mul(rz, ry), rx)
}

/// Recover zeroed Euler angles from a zeroed DCM:
/// `theta = -asin(d[2][0])`, `psi = atan2(d[1][0], d[0][0])`,
/// `phi = atan2(d[2][1], d[2][2])`.
pub fn euler_from_dcm(d: Mat3) -> (f64, f64, f64) {
    let theta = -d[2][0].clamp(-1.0, 1.0).asin();
    let psi = d[1][0].atan2(d[0][0]);
    let phi = d[2][1].atan2(d[2][2]);
    (psi, theta, phi)
}

/// Choose the integer `k` minimising `|angle + 2*pi*k - previous|` and
/// return `angle + 2*pi*k`.
pub fn unwrap_angle(angle: f64, previous: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let k = ((previous - angle) / two_pi).round();
    angle + two_pi * k
}

/// Convert filtered Euler rates to body rates.
pub fn euler_rates_to_body_rates(
    psi_dot: f64,
    theta_dot: f64,
    phi_dot: f64,
    theta: f64,
    phi: f64,
) -> (f64, f64, f64) {
    let omega_x = phi_dot - psi_dot * theta.sin();
    let omega_y = theta_dot * phi.cos() + psi_dot * theta.cos() * phi.sin();
    let omega_z = psi_dot * theta.cos() * phi.cos() - theta_dot * phi.sin();
    (omega_x, omega_y, omega_z)
}

/// Accumulate raw Euler samples over the pad calibration window and form
/// the zeroing rotation `R0`.
pub struct Calibrator {
    sum_psi: f64,
    sum_theta: f64,
    sum_phi: f64,
    count: usize,
}

impl Calibrator {
    pub fn new() -> Self {
        Calibrator {
            sum_psi: 0.0,
            sum_theta: 0.0,
            sum_phi: 0.0,
            count: 0,
        }
    }

    pub fn accumulate(&mut self, sample: &RawSample) {
        self.sum_psi += sample.psi as f64;
        self.sum_theta += sample.theta as f64;
        self.sum_phi += sample.phi as f64;
        self.count += 1;
    }

    pub fn sample_count(&self) -> usize {
        self.count
    }

    /// Finish calibration, requiring at least `min_samples` accumulated.
    pub fn finish(&self, min_samples: usize) -> Result<CalibrationFrame, crate::error::GncError> {
        if self.count < min_samples {
            return Err(crate::error::GncError::CalibrationTooFewSamples {
                collected: self.count,
                minimum: min_samples,
            });
        }
        let n = self.count as f64;
        let (psi_mean, theta_mean, phi_mean) =
            (self.sum_psi / n, self.sum_theta / n, self.sum_phi / n);

        // R0 maps the pad-orientation DCM to the identity: R0 = D(mean)^-1 = D(mean)^T.
        let d_mean = dcm_zyx(psi_mean, theta_mean, phi_mean);
        let r0 = mat3_transpose(d_mean);

        Ok(CalibrationFrame {
            r0,
            psi_mean,
            theta_mean,
            phi_mean,
            sample_count: self.count,
        })
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Running estimator state: the Kalman bank, unwrap memory, and the
/// calibration frame it zeroes incoming samples against.
pub struct Estimator {
    calib: CalibrationFrame,
    bank: KalmanBank,
    prev_psi: f64,
    prev_theta: f64,
    prev_phi: f64,
    prev_sample_time: Option<Instant>,
    consecutive_faults: u32,
    fault_threshold: u32,
}

impl Estimator {
    pub fn new(calib: CalibrationFrame, cfg: &Config) -> Self {
        Estimator {
            calib,
            bank: KalmanBank::new(&cfg.raw.kalman, 0.0, 0.0, 0.0),
            prev_psi: 0.0,
            prev_theta: 0.0,
            prev_phi: 0.0,
            prev_sample_time: None,
            consecutive_faults: 0,
            fault_threshold: cfg.raw.estimator_fault_threshold,
        }
    }

    /// Process one raw sample into a new attitude snapshot: zero against
    /// the calibration frame, unwrap, differentiate, and run it through
    /// the Kalman bank.
    ///
    /// On a transient fault, returns `Ok(None)`: the caller should
    /// re-publish the previous snapshot. On `fault_threshold` consecutive
    /// transient faults, escalates to a fatal `GncError`.
    pub fn process(
        &mut self,
        sample: &RawSample,
    ) -> Result<Option<AttitudeSnapshot>, crate::error::GncError> {
        match self.try_process(sample) {
            Ok(snapshot) => {
                self.consecutive_faults = 0;
                Ok(Some(snapshot))
            }
            Err(_fault) => {
                self.consecutive_faults += 1;
                if self.consecutive_faults >= self.fault_threshold {
                    Err(crate::error::GncError::EstimatorDropsExceeded {
                        count: self.consecutive_faults,
                        threshold: self.fault_threshold,
                    })
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn try_process(&mut self, sample: &RawSample) -> Result<AttitudeSnapshot, RecoverableFault> {
        let d = dcm_zyx(sample.psi as f64, sample.theta as f64, sample.phi as f64);
        let d_zeroed = mat3_mul(self.calib.r0, d);

        for row in &d_zeroed {
            for v in row {
                if !v.is_finite() {
                    return Err(RecoverableFault::NonFiniteDcm);
                }
            }
        }

        let (psi_raw, theta_raw, phi_raw) = euler_from_dcm(d_zeroed);
        let psi = unwrap_angle(psi_raw, self.prev_psi);
        let theta = unwrap_angle(theta_raw, self.prev_theta);
        let phi = unwrap_angle(phi_raw, self.prev_phi);

        // `saturating_duration_since` floors at zero, so `dt` is never negative here.
        let dt = match self.prev_sample_time {
            Some(prev) => sample.host_time.saturating_duration_since(prev).as_secs_f64(),
            None => 0.0,
        };

        let (psi_dot, theta_dot, phi_dot) = if self.prev_sample_time.is_some() && dt > 0.0 {
            (
                (psi - self.prev_psi) / dt,
                (theta - self.prev_theta) / dt,
                (phi - self.prev_phi) / dt,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        self.prev_psi = psi;
        self.prev_theta = theta;
        self.prev_phi = phi;
        self.prev_sample_time = Some(sample.host_time);

        self.bank.psi.tick(psi, dt)?;
        self.bank.theta.tick(theta, dt)?;
        self.bank.phi.tick(phi, dt)?;
        self.bank.psi_dot.tick(psi_dot, dt)?;
        self.bank.theta_dot.tick(theta_dot, dt)?;
        self.bank.phi_dot.tick(phi_dot, dt)?;

        let psi_f = self.bank.psi.value;
        let theta_f = self.bank.theta.value;
        let phi_f = self.bank.phi.value;
        let psi_dot_f = self.bank.psi_dot.value;
        let theta_dot_f = self.bank.theta_dot.value;
        let phi_dot_f = self.bank.phi_dot.value;

        let (omega_x, omega_y, omega_z) =
            euler_rates_to_body_rates(psi_dot_f, theta_dot_f, phi_dot_f, theta_f, phi_f);

        Ok(AttitudeSnapshot {
            host_time: sample.host_time,
            psi_f,
            theta_f,
            phi_f,
            psi_dot_f,
            theta_dot_f,
            phi_dot_f,
            omega_x,
            omega_y,
            omega_z,
            dt,
        })
    }
}

/// Spawn the estimator thread: runs at `estimator_period_us`, reads the
/// latest raw sample, runs the Kalman pipeline, and publishes the
/// attitude snapshot. Appends one line per tick to `imu_log`.
pub fn spawn(
    cfg: &Config,
    calib: CalibrationFrame,
    raw_snapshot: std::sync::Arc<Snapshot<RawSample>>,
    attitude_snapshot: std::sync::Arc<Snapshot<AttitudeSnapshot>>,
    quit: QuitFlag,
    fault: FaultLatch,
    mut imu_log: crate::textlog::TextLog,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    let cfg = cfg.clone();
    std::thread::Builder::new()
        .name("gnc-estimator".into())
        .spawn(move || {
            let mut estimator = Estimator::new(calib, &cfg);
            let mut timer =
                PeriodicTimer::new(Duration::from_micros(cfg.raw.estimator_period_us));
            let mut last_sample_time: Option<Instant> = None;

            while !quit.is_set() {
                let sample = raw_snapshot.get();
                if last_sample_time != Some(sample.host_time) {
                    last_sample_time = Some(sample.host_time);
                    match estimator.process(&sample) {
                        Ok(Some(snap)) => {
                            let _ = imu_log.append_attitude_row(&sample, &snap);
                            attitude_snapshot.publish(snap);
                        }
                        Ok(None) => {
                            log::warn!("estimator: dropped transient-fault sample");
                        }
                        Err(e) => {
                            log::error!("estimator: fatal condition: {e}");
                            fault.raise(e);
                            break;
                        }
                    }
                }
                if !timer.tick() {
                    log::info!("estimator: loop overrun");
                }
            }
            log::info!("estimator thread exiting");
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_is_idempotent() {
        let a = unwrap_angle(3.10, 0.0);
        let b = unwrap_angle(a, a);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn unwrap_resolves_sign_flip_near_pi() {
        // [3.10, -3.18] at dt=0.02s: a near-pi sign flip should unwrap
        // to a small step rather than a near-2pi jump.
        let first = unwrap_angle(3.10, 0.0);
        let second = unwrap_angle(-3.18, first);
        assert!((second - 3.103).abs() < 0.01, "second={second}");
        let rate = (second - first) / 0.02;
        assert!(rate.abs() < 1.0, "rate={rate}");
    }

    #[test]
    fn unwrap_bounds_step_to_pi() {
        let previous = 3.10;
        for raw in [-3.0, -2.0, 0.0, 2.0, 3.0] {
            let unwrapped = unwrap_angle(raw, previous);
            assert!((unwrapped - previous).abs() <= std::f64::consts::PI + 1e-9);
        }
    }

    #[test]
    fn zeroing_constant_calibration_mean_maps_to_zero() {
        let mut cal = Calibrator::new();
        let sample = RawSample {
            host_time: Instant::now(),
            psi: 0.10,
            theta: -0.05,
            phi: 0.02,
            accel: [0.0; 3],
        };
        for _ in 0..100 {
            cal.accumulate(&sample);
        }
        let frame = cal.finish(50).unwrap();
        let d = dcm_zyx(sample.psi as f64, sample.theta as f64, sample.phi as f64);
        let zeroed = mat3_mul(frame.r0, d);
        let (psi, theta, phi) = euler_from_dcm(zeroed);
        assert!(psi.abs() < 1e-9, "psi={psi}");
        assert!(theta.abs() < 1e-9, "theta={theta}");
        assert!(phi.abs() < 1e-9, "phi={phi}");
    }

    #[test]
    fn calibration_fails_below_minimum_samples() {
        let mut cal = Calibrator::new();
        let sample = RawSample {
            host_time: Instant::now(),
            psi: 0.0,
            theta: 0.0,
            phi: 0.0,
            accel: [0.0; 3],
        };
        cal.accumulate(&sample);
        assert!(cal.finish(10).is_err());
    }

    #[test]
    fn body_rates_zero_when_level_and_still() {
        let (wx, wy, wz) = euler_rates_to_body_rates(0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!((wx, wy, wz), (0.0, 0.0, 0.0));
    }

    #[test]
    fn dcm_roundtrips_through_euler_extraction_away_from_gimbal_lock() {
        let (psi, theta, phi) = (0.2, 0.1, -0.3);
        let d = dcm_zyx(psi, theta, phi);
        let (psi2, theta2, phi2) = euler_from_dcm(d);
        assert!((psi - psi2).abs() < 1e-9);
        assert!((theta - theta2).abs() < 1e-9);
        assert!((phi - phi2).abs() < 1e-9);
    }
}
