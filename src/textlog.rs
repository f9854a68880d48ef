//! Append-only tab-separated flight-data logs.
//!
//! Per-domain logs (`imu_log`, `control_log`) are written only by their
//! owning thread and need no locking; the error log is shared and is
//! wrapped in a mutex instead. Both are a thin `BufWriter<File>` opened in
//! append mode, exactly the shape used for the domain logs the original
//! spec enumerates.

use crate::types::{AttitudeSnapshot, ControlDemand, RawSample, ThrustAssignment};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// A single append-only, tab-separated log file with a one-line header.
pub struct TextLog {
    writer: BufWriter<std::fs::File>,
    epoch: Instant,
}

impl TextLog {
    /// Create (or truncate-append-open) the log at `path`, writing
    /// `header` as the first line if the file is newly created.
    pub fn create(path: impl AsRef<Path>, header: &str) -> Result<Self, crate::error::GncError> {
        let path_ref = path.as_ref();
        let existed = path_ref.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path_ref)
            .map_err(|source| crate::error::GncError::LogCreate {
                path: path_ref.display().to_string(),
                source,
            })?;
        let mut writer = BufWriter::new(file);
        if !existed {
            let _ = writeln!(writer, "{header}");
        }
        Ok(TextLog {
            writer,
            epoch: Instant::now(),
        })
    }

    fn elapsed_us(&self, t: Instant) -> u128 {
        t.saturating_duration_since(self.epoch).as_micros()
    }

    /// Append one IMU-log row: raw + filtered attitude, rates, and accel.
    pub fn append_attitude_row(
        &mut self,
        raw: &RawSample,
        snap: &AttitudeSnapshot,
    ) -> std::io::Result<()> {
        writeln!(
            self.writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.elapsed_us(snap.host_time),
            raw.psi,
            raw.theta,
            raw.phi,
            raw.accel[0],
            raw.accel[1],
            raw.accel[2],
            snap.psi_f,
            snap.theta_f,
            snap.phi_f,
            snap.psi_dot_f,
            snap.theta_dot_f,
            snap.phi_dot_f,
            snap.omega_x,
            snap.omega_y,
            snap.omega_z,
        )?;
        self.writer.flush()
    }

    /// Append one control-log row: demands, thrusts, and PWM values.
    pub fn append_control_row(
        &mut self,
        demand: &ControlDemand,
        thrust: &ThrustAssignment,
    ) -> std::io::Result<()> {
        writeln!(
            self.writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.elapsed_us(demand.host_time),
            demand.f_theta,
            demand.f_psi,
            demand.m_phi,
            thrust.r[0],
            thrust.r[1],
            thrust.r[2],
            thrust.r[3],
            thrust.pwm[0],
            thrust.pwm[1],
            thrust.pwm[2],
            thrust.pwm[3],
        )?;
        self.writer.flush()
    }

    fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }
}

pub const IMU_LOG_HEADER: &str =
    "t_us\traw_psi\traw_theta\traw_phi\taccel_x\taccel_y\taccel_z\tpsi_f\ttheta_f\tphi_f\tpsi_dot_f\ttheta_dot_f\tphi_dot_f\tomega_x\tomega_y\tomega_z";
pub const CONTROL_LOG_HEADER: &str =
    "t_us\tf_theta\tf_psi\tm_phi\tr1\tr2\tr3\tr4\tpwm1\tpwm2\tpwm3\tpwm4";
pub const ERROR_LOG_HEADER: &str = "t_us\tthread\tmessage";

/// Error log, writable from any thread.
pub struct ErrorLog {
    inner: Mutex<TextLog>,
    epoch: Instant,
}

impl ErrorLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, crate::error::GncError> {
        let log = TextLog::create(path, ERROR_LOG_HEADER)?;
        Ok(ErrorLog {
            inner: Mutex::new(log),
            epoch: Instant::now(),
        })
    }

    pub fn append(&self, thread_name: &str, message: impl std::fmt::Display) {
        let t_us = self.epoch.elapsed().as_micros();
        let line = format!("{t_us}\t{thread_name}\t{message}");
        if let Ok(mut guard) = self.inner.lock() {
            if let Err(e) = guard.append_line(&line) {
                log::warn!("error_log: failed to write: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn creates_header_only_once() {
        let dir = tempfile_dir();
        let path = dir.join("imu.log");
        {
            let _ = TextLog::create(&path, IMU_LOG_HEADER).unwrap();
        }
        {
            let _ = TextLog::create(&path, IMU_LOG_HEADER).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().filter(|l| *l == IMU_LOG_HEADER).count(), 1);
    }

    #[test]
    fn appends_attitude_row() {
        let dir = tempfile_dir();
        let path = dir.join("imu2.log");
        let mut log = TextLog::create(&path, IMU_LOG_HEADER).unwrap();
        let now = Instant::now();
        let raw = RawSample {
            host_time: now,
            psi: 0.1,
            theta: 0.2,
            phi: 0.3,
            accel: [0.0, 0.0, 9.81],
        };
        let snap = AttitudeSnapshot::zero(now);
        log.append_attitude_row(&raw, &snap).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn error_log_is_shareable_across_threads() {
        let dir = tempfile_dir();
        let path = dir.join("err.log");
        let log = std::sync::Arc::new(ErrorLog::create(&path).unwrap());
        let mut handles = vec![];
        for i in 0..4 {
            let log = log.clone();
            handles.push(std::thread::spawn(move || {
                log.append("test", format!("message {i}"));
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 5); // header + 4 messages
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "apogee-rcs-test-{}-{}",
            std::process::id(),
            unique_suffix()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn unique_suffix() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}
