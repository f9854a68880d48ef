//! Error taxonomy for the GNC pipeline.
//!
//! Three severities exist in the design: fatal conditions stop the flight,
//! recoverable conditions are handled in place by the thread that hit them,
//! and informational conditions are only logged through the `log` facade. A
//! bare recoverable fault (one dropped Kalman tick) is never an `Err` — it is
//! folded into a per-thread counter by [`RecoverableFault`] and only
//! escalates to a `GncError` once a threshold is crossed. Allocator
//! infeasibility is handled separately: it is not an estimator fault, and the
//! control thread falls back to zero thrust for that cycle rather than
//! counting it toward any threshold.

use thiserror::Error;

/// Errors that can terminate a worker thread or the mission sequencer.
#[derive(Debug, Error)]
pub enum GncError {
    #[error("failed to open serial port {path}: {source}")]
    SerialOpen {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial I/O error on {path}: {source}")]
    SerialIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lost sync with attitude sensor after {attempts} attempts")]
    SyncLost { attempts: u32 },

    #[error("calibration collected only {collected} of {minimum} required samples")]
    CalibrationTooFewSamples { collected: usize, minimum: usize },

    #[error("{count} consecutive estimator faults exceeds threshold {threshold}")]
    EstimatorDropsExceeded { count: u32, threshold: u32 },

    #[error("simplex allocator reported unbounded status (programming error)")]
    SimplexUnbounded,

    #[error("failed to create log file {path}: {source}")]
    LogCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("launch-detect GPIO error: {0}")]
    Gpio(String),

    #[error("actuator dispatcher did not receive an ack for byte {index} within timeout")]
    DispatcherAckTimeout { index: usize },

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, GncError>;

/// A single-cycle recoverable fault, counted but not propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverableFault {
    NonFiniteDcm,
    NonPositiveInnovationVariance,
}

impl std::fmt::Display for RecoverableFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoverableFault::NonFiniteDcm => "non-finite value in zeroed DCM",
            RecoverableFault::NonPositiveInnovationVariance => "non-positive innovation variance",
        };
        f.write_str(s)
    }
}
