//! Core data model.
//!
//! Every stage of the pipeline hands the next stage one of these plain,
//! `Clone`-able snapshot types through a [`crate::shared::Snapshot`] cell.

use std::time::Instant;

/// One 24-byte frame off the attitude sensor, decoded and timestamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Host-side monotonic receipt time.
    pub host_time: Instant,
    /// Raw yaw, pitch, roll, radians, in the sensor's pad-orientation frame.
    pub psi: f32,
    pub theta: f32,
    pub phi: f32,
    /// Raw linear acceleration, m/s^2.
    pub accel: [f32; 3],
}

/// Rotation matrix R0 and pad-orientation means fixed at calibration.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationFrame {
    /// Row-major body-to-zeroed rotation matrix.
    pub r0: [[f64; 3]; 3],
    pub psi_mean: f64,
    pub theta_mean: f64,
    pub phi_mean: f64,
    pub sample_count: usize,
}

/// Filtered attitude and body rates, published once per estimator tick.
#[derive(Debug, Clone, Copy)]
pub struct AttitudeSnapshot {
    pub host_time: Instant,
    pub psi_f: f64,
    pub theta_f: f64,
    pub phi_f: f64,
    pub psi_dot_f: f64,
    pub theta_dot_f: f64,
    pub phi_dot_f: f64,
    pub omega_x: f64,
    pub omega_y: f64,
    pub omega_z: f64,
    /// Sample interval used to derive this snapshot, seconds.
    pub dt: f64,
}

impl AttitudeSnapshot {
    pub fn zero(host_time: Instant) -> Self {
        AttitudeSnapshot {
            host_time,
            psi_f: 0.0,
            theta_f: 0.0,
            phi_f: 0.0,
            psi_dot_f: 0.0,
            theta_dot_f: 0.0,
            phi_dot_f: 0.0,
            omega_x: 0.0,
            omega_y: 0.0,
            omega_z: 0.0,
            dt: 0.0,
        }
    }
}

/// Demanded pitch/yaw forces and roll moment, published once per control tick.
#[derive(Debug, Clone, Copy)]
pub struct ControlDemand {
    pub host_time: Instant,
    pub f_theta: f64,
    pub f_psi: f64,
    pub m_phi: f64,
}

/// Which nozzle the allocator drove to exactly zero this cycle, if any single one did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparsityTag {
    None,
    R1,
    R2,
    R3,
    R4,
    Multiple,
}

/// Allocator output: four non-negative thrusts and their linearised PWM values.
#[derive(Debug, Clone, Copy)]
pub struct ThrustAssignment {
    pub host_time: Instant,
    pub r: [f64; 4],
    pub pwm: [u16; 4],
    pub sparsity: SparsityTag,
    /// True if the allocator had to fall back to all-zero thrust (infeasible demand).
    pub infeasible: bool,
}

impl ThrustAssignment {
    pub fn zero(host_time: Instant) -> Self {
        ThrustAssignment {
            host_time,
            r: [0.0; 4],
            pwm: [0; 4],
            sparsity: SparsityTag::Multiple,
            infeasible: false,
        }
    }
}
