//! Startup configuration.
//!
//! All tunables the pipeline needs are collected into one YAML file and
//! deserialized with `serde`: a flat `Raw*Config` struct, a
//! `thiserror`-derived error enum with file/parse/validation variants,
//! and a `load()` entry point that deserializes then validates.

use serde::Deserialize;
use thiserror::Error;
use std::path::Path;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileError(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// One (thrust, pwm) point in the calibrated valve characteristic.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ValvePoint {
    pub thrust_n: f64,
    pub pwm: u16,
}

/// Kalman design matrices for a single scalar signal.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct KalmanTuning {
    /// Process noise on the value state.
    pub q_value: f64,
    /// Process noise on the rate state.
    pub q_rate: f64,
    /// Measurement noise.
    pub r_meas: f64,
}

/// Per-signal Kalman tunings for the six scalar filters.
#[derive(Debug, Clone, Deserialize)]
pub struct KalmanConfig {
    pub psi: KalmanTuning,
    pub theta: KalmanTuning,
    pub phi: KalmanTuning,
    pub psi_dot: KalmanTuning,
    pub theta_dot: KalmanTuning,
    pub phi_dot: KalmanTuning,
}

/// PD/P control-law gains.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ControlGains {
    pub k_theta: f64,
    pub td_theta: f64,
    pub k_psi: f64,
    pub td_psi: f64,
    pub k_phi: f64,
}

/// Durations driving the mission sequencer, all in microseconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Durations {
    pub calibration_us: u64,
    pub burn_wait_us: u64,
    pub active_window_us: u64,
    pub descent_us: u64,
}

/// Top-level configuration, as loaded from the YAML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Maximum single-valve thrust, newtons.
    pub t_max: f64,
    /// Nozzle offset from the roll axis, meters.
    pub d: f64,
    /// Control loop period, microseconds.
    pub control_period_us: u64,
    /// Estimator loop period, microseconds.
    pub estimator_period_us: u64,
    /// Minimum accepted calibration sample count.
    pub calibration_min_samples: usize,
    /// Consecutive estimator faults tolerated before declaring fatal.
    pub estimator_fault_threshold: u32,
    /// Consecutive sync-loss retries tolerated before declaring fatal.
    pub sync_retry_limit: u32,
    pub durations: Durations,
    pub gains: ControlGains,
    pub kalman: KalmanConfig,
    pub valve_table: Vec<ValvePoint>,
    pub imu_port: String,
    pub actuator_port: String,
    pub launch_detect_gpio_pin: u8,
    pub imu_log_path: String,
    pub control_log_path: String,
    pub error_log_path: String,
}

/// Validated configuration, ready to hand to the pipeline components.
#[derive(Debug, Clone)]
pub struct Config {
    pub raw: RawConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let raw: RawConfig = serde_yaml::from_str(&text)?;
        Self::from_raw(raw)
    }

    /// Validate an already-deserialized `RawConfig`.
    pub fn from_raw(raw: RawConfig) -> Result<Config, ConfigError> {
        validate(&raw)?;
        Ok(Config { raw })
    }
}

fn validate(cfg: &RawConfig) -> Result<(), ConfigError> {
    if cfg.t_max <= 0.0 || !cfg.t_max.is_finite() {
        return Err(ConfigError::ValidationError(
            "t_max must be positive and finite".into(),
        ));
    }
    if cfg.d <= 0.0 {
        return Err(ConfigError::ValidationError(
            "d (nozzle offset) must be positive".into(),
        ));
    }
    if cfg.valve_table.len() < 2 {
        return Err(ConfigError::ValidationError(
            "valve_table must have at least two points".into(),
        ));
    }
    let first = cfg.valve_table.first().unwrap();
    if first.thrust_n != 0.0 || first.pwm != 0 {
        return Err(ConfigError::ValidationError(
            "valve_table[0] must be (thrust=0, pwm=0)".into(),
        ));
    }
    let last = cfg.valve_table.last().unwrap();
    if (last.thrust_n - cfg.t_max).abs() > 1e-9 {
        return Err(ConfigError::ValidationError(
            "valve_table's final thrust entry must equal t_max".into(),
        ));
    }
    for pair in cfg.valve_table.windows(2) {
        if pair[1].thrust_n <= pair[0].thrust_n || pair[1].pwm <= pair[0].pwm {
            return Err(ConfigError::ValidationError(
                "valve_table must be strictly monotone in both thrust and pwm".into(),
            ));
        }
    }
    for (name, t) in [
        ("psi", &cfg.kalman.psi),
        ("theta", &cfg.kalman.theta),
        ("phi", &cfg.kalman.phi),
        ("psi_dot", &cfg.kalman.psi_dot),
        ("theta_dot", &cfg.kalman.theta_dot),
        ("phi_dot", &cfg.kalman.phi_dot),
    ] {
        if !(t.q_value.is_finite() && t.q_rate.is_finite() && t.r_meas.is_finite())
            || t.q_value <= 0.0
            || t.q_rate <= 0.0
            || t.r_meas <= 0.0
        {
            return Err(ConfigError::ValidationError(format!(
                "kalman tuning for '{name}' must have positive, finite Q/R"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub fn test_config() -> Config {
    let raw = RawConfig {
        t_max: 0.2,
        d: 0.005,
        control_period_us: 20_000,
        estimator_period_us: 20_000,
        calibration_min_samples: 50,
        estimator_fault_threshold: 10,
        sync_retry_limit: 5,
        durations: Durations {
            calibration_us: 5_000_000,
            burn_wait_us: 2_000_000,
            active_window_us: 10_000_000,
            descent_us: 3_000_000,
        },
        gains: ControlGains {
            k_theta: 5.0,
            td_theta: 3.0,
            k_psi: 5.0,
            td_psi: 3.0,
            k_phi: 1.0,
        },
        kalman: KalmanConfig {
            psi: KalmanTuning { q_value: 1e-5, q_rate: 1e-4, r_meas: 1e-3 },
            theta: KalmanTuning { q_value: 1e-5, q_rate: 1e-4, r_meas: 1e-3 },
            phi: KalmanTuning { q_value: 1e-5, q_rate: 1e-4, r_meas: 1e-3 },
            psi_dot: KalmanTuning { q_value: 1e-3, q_rate: 1e-2, r_meas: 5e-2 },
            theta_dot: KalmanTuning { q_value: 1e-3, q_rate: 1e-2, r_meas: 5e-2 },
            phi_dot: KalmanTuning { q_value: 1e-3, q_rate: 1e-2, r_meas: 5e-2 },
        },
        valve_table: vec![
            ValvePoint { thrust_n: 0.0, pwm: 0 },
            ValvePoint { thrust_n: 0.05, pwm: 256 },
            ValvePoint { thrust_n: 0.1, pwm: 512 },
            ValvePoint { thrust_n: 0.15, pwm: 768 },
            ValvePoint { thrust_n: 0.2, pwm: 1023 },
        ],
        imu_port: "/dev/ttyUSB0".into(),
        actuator_port: "/dev/ttyUSB1".into(),
        launch_detect_gpio_pin: 17,
        imu_log_path: "imu_log.txt".into(),
        control_log_path: "control_log.txt".into(),
        error_log_path: "error_log.txt".into(),
    };
    Config::from_raw(raw).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_config_validates() {
        let _ = test_config();
    }

    #[test]
    fn rejects_non_monotone_valve_table() {
        let mut cfg = test_config().raw;
        cfg.valve_table[2].thrust_n = cfg.valve_table[1].thrust_n;
        assert!(Config::from_raw(cfg).is_err());
    }

    #[test]
    fn rejects_wrong_final_thrust() {
        let mut cfg = test_config().raw;
        cfg.valve_table.last_mut().unwrap().thrust_n = 99.0;
        assert!(Config::from_raw(cfg).is_err());
    }

    #[test]
    fn rejects_nonpositive_kalman_tuning() {
        let mut cfg = test_config().raw;
        cfg.kalman.psi.r_meas = 0.0;
        assert!(Config::from_raw(cfg).is_err());
    }
}
