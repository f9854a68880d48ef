//! End-to-end scenario tests driving the full mission sequencer against the
//! simulated IMU/actuator/GPIO backends. These exercise the public API the
//! way `--dry-run` does, rather than unit-level pieces, which are covered
//! in each module's own `#[cfg(test)]` block.

use apogee_rcs::config::{
    Config, ControlGains, Durations, KalmanConfig, KalmanTuning, RawConfig, ValvePoint,
};
use apogee_rcs::gpio::SimLaunchDetect;
use apogee_rcs::sequencer::{self, Mission, ScriptedIo};
use apogee_rcs::sim::{SimActuatorLink, SimImuLink};
use std::time::Duration;

fn valve_table() -> Vec<ValvePoint> {
    vec![
        ValvePoint { thrust_n: 0.0, pwm: 0 },
        ValvePoint { thrust_n: 0.05, pwm: 256 },
        ValvePoint { thrust_n: 0.1, pwm: 512 },
        ValvePoint { thrust_n: 0.15, pwm: 768 },
        ValvePoint { thrust_n: 0.2, pwm: 1023 },
    ]
}

/// A mission configuration scaled down to millisecond durations so the
/// full Boot -> Shutdown sequence runs in well under a second of wall time.
fn rehearsal_config(tmp: &std::path::Path) -> Config {
    let raw = RawConfig {
        t_max: 0.2,
        d: 0.005,
        control_period_us: 20_000,
        estimator_period_us: 20_000,
        calibration_min_samples: 3,
        estimator_fault_threshold: 20,
        sync_retry_limit: 5,
        durations: Durations {
            calibration_us: 150_000,
            burn_wait_us: 60_000,
            active_window_us: 200_000,
            descent_us: 60_000,
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
        valve_table: valve_table(),
        imu_port: "sim".into(),
        actuator_port: "sim".into(),
        launch_detect_gpio_pin: 17,
        imu_log_path: tmp.join("imu_log.txt").display().to_string(),
        control_log_path: tmp.join("control_log.txt").display().to_string(),
        error_log_path: tmp.join("error_log.txt").display().to_string(),
    };
    Config::from_raw(raw).unwrap()
}

/// Standard sequence of exact-match operator prompts the sequencer waits
/// on between Boot and Active-window.
fn prompts(arm_mode: &str) -> ScriptedIo {
    ScriptedIo::new([
        "TEST",
        "Calibrate",
        "Filter",
        "Continue",
        arm_mode,
        "CONNECTED_CONNECTED_CONNECTED!",
    ])
}

/// A full passive rehearsal, constant level attitude throughout. The
/// mission should run Boot -> Shutdown cleanly and leave behind headered,
/// populated flight logs.
#[test]
fn static_attitude_passive_mission_completes_and_logs_flight_data() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = rehearsal_config(dir.path());

    let imu_link: Box<dyn apogee_rcs::transport::Transport> =
        Box::new(SimImuLink::constant(0.0, 0.0, 0.0));
    let (actuator_link, _handle) = SimActuatorLink::new();
    let launch_detect = SimLaunchDetect::new();
    let pull_handle = launch_detect.clone();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        pull_handle.pull();
    });

    let mission = Mission {
        cfg,
        imu_link,
        actuator_link: Box::new(actuator_link),
        launch_detect: Box::new(launch_detect),
    };

    let mut io = prompts("PASSIVE");
    sequencer::run(mission, &mut io).expect("passive rehearsal should complete cleanly");

    let imu_log = std::fs::read_to_string(dir.path().join("imu_log.txt")).unwrap();
    let control_log = std::fs::read_to_string(dir.path().join("control_log.txt")).unwrap();
    assert!(imu_log.lines().count() > 1, "expected imu_log rows beyond the header");
    assert!(control_log.lines().count() > 1, "expected control_log rows beyond the header");
    assert!(imu_log.lines().next().unwrap().starts_with("t_us"));
    assert!(control_log.lines().next().unwrap().starts_with("t_us"));
}

/// A steady pitch offset should drive nonzero PWM out the dispatcher
/// during Active-window when armed `ACTIVE`, and the final frame at
/// mission end must be all-zero (the end-of-window safety frame).
#[test]
fn active_mission_drives_pwm_then_zeros_at_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = rehearsal_config(dir.path());

    // A steady 20 degree pitch error.
    let imu_link: Box<dyn apogee_rcs::transport::Transport> =
        Box::new(SimImuLink::constant(0.0, 0.3491, 0.0));
    let (actuator_link, handle) = SimActuatorLink::new();
    let launch_detect = SimLaunchDetect::new();
    let pull_handle = launch_detect.clone();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        pull_handle.pull();
    });

    let mission = Mission {
        cfg,
        imu_link,
        actuator_link: Box::new(actuator_link),
        launch_detect: Box::new(launch_detect),
    };

    let watch_handle = handle.clone();
    let watcher = std::thread::spawn(move || {
        let mut saw_nonzero = false;
        let deadline = std::time::Instant::now() + Duration::from_millis(600);
        while std::time::Instant::now() < deadline {
            if watch_handle.state().pwm.iter().any(|&p| p > 0) {
                saw_nonzero = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        saw_nonzero
    });

    let mut io = prompts("ACTIVE");
    sequencer::run(mission, &mut io).expect("active rehearsal should complete cleanly");

    assert!(
        watcher.join().unwrap(),
        "expected at least one nonzero PWM channel while armed ACTIVE with pitch error"
    );
    assert_eq!(
        handle.state().pwm,
        [0, 0, 0, 0],
        "dispatcher must leave the actuator at all-zero PWM once the mission ends"
    );
}

/// Watchdog safety, exercised through the real control thread cadence
/// rather than a standalone unit: while the control loop is driving the
/// dispatcher during Active-window, the simulated actuator must never go
/// more than the 150 ms watchdog window without receiving a fresh frame.
#[test]
fn active_window_never_exceeds_the_watchdog_period_between_frames() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = rehearsal_config(dir.path());

    let imu_link: Box<dyn apogee_rcs::transport::Transport> =
        Box::new(SimImuLink::constant(0.01, 0.02, 0.0));
    let (actuator_link, handle) = SimActuatorLink::new();
    let launch_detect = SimLaunchDetect::new();
    let pull_handle = launch_detect.clone();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        pull_handle.pull();
    });

    let mission = Mission {
        cfg,
        imu_link,
        actuator_link: Box::new(actuator_link),
        launch_detect: Box::new(launch_detect),
    };

    let watch_handle = handle.clone();
    let watcher = std::thread::spawn(move || {
        let mut max_gap = Duration::ZERO;
        let deadline = std::time::Instant::now() + Duration::from_millis(500);
        while std::time::Instant::now() < deadline {
            if let Some(age) = watch_handle.state().last_frame_age {
                if age > max_gap {
                    max_gap = age;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        max_gap
    });

    let mut io = prompts("ACTIVE");
    sequencer::run(mission, &mut io).expect("active rehearsal should complete cleanly");

    let max_gap = watcher.join().unwrap();
    assert!(
        max_gap < Duration::from_millis(150),
        "dispatcher left the controller without a fresh frame for {max_gap:?}, exceeding the 150ms watchdog window"
    );
}
