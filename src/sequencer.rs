//! Mission sequencer: the top-level state machine that gates calibration,
//! filter warm-up, arming, launch-detect, the burn/active/descent timers,
//! and shutdown.
//!
//! Runs entirely on the main thread: it owns operator I/O, spawns/joins
//! the three worker threads, and is the only consumer of [`FaultLatch`] —
//! examining it once per its own tick rather than letting a worker
//! thread's error cross a thread boundary on its own.

use crate::attitude::{self, Calibrator};
use crate::config::Config;
use crate::control;
use crate::dispatcher::Dispatcher;
use crate::error::GncError;
use crate::gpio::{self, LaunchDetect};
use crate::reader;
use crate::shared::{ActiveFlag, FaultLatch, QuitFlag, Snapshot};
use crate::textlog::{ErrorLog, TextLog};
use crate::transport::Transport;
use crate::types::{AttitudeSnapshot, ControlDemand, RawSample, ThrustAssignment};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Mission states, in the order the sequencer walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Boot,
    Calibrate,
    FilterWarmup,
    ArmedPassive,
    ArmedActive,
    WaitLaunch,
    BurnWait,
    ActiveWindow,
    Descent,
    Shutdown,
}

/// Whether the operator armed for live actuation or a dry rehearsal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmMode {
    Active,
    Passive,
}

/// Source of the sequential exact-match operator prompts. `StdinIo` reads
/// real keyboard input; `ScriptedIo` replays a fixed script for
/// `--dry-run` runs and integration tests.
pub trait OperatorIo {
    fn read_line(&mut self) -> std::io::Result<String>;
}

pub struct StdinIo;

impl OperatorIo for StdinIo {
    fn read_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Replays a fixed sequence of lines, looping the last one if exhausted —
/// used by `--dry-run` and integration tests to drive the prompts
/// non-interactively.
pub struct ScriptedIo {
    lines: std::collections::VecDeque<String>,
    last: String,
}

impl ScriptedIo {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ScriptedIo {
            lines: lines.into_iter().map(Into::into).collect(),
            last: String::new(),
        }
    }
}

impl OperatorIo for ScriptedIo {
    fn read_line(&mut self) -> std::io::Result<String> {
        match self.lines.pop_front() {
            Some(line) => {
                self.last = line.clone();
                Ok(line)
            }
            None => Ok(self.last.clone()),
        }
    }
}

/// Block until `io` produces a line matching `expected` exactly.
fn wait_for_exact(io: &mut dyn OperatorIo, expected: &str) -> std::io::Result<()> {
    loop {
        let line = io.read_line()?;
        if line == expected {
            return Ok(());
        }
        log::info!("sequencer: ignoring unmatched operator input {line:?}, expected {expected:?}");
    }
}

/// Block until `io` produces `"ACTIVE"` or `"PASSIVE"` exactly.
fn wait_for_arm_mode(io: &mut dyn OperatorIo) -> std::io::Result<ArmMode> {
    loop {
        match io.read_line()?.as_str() {
            "ACTIVE" => return Ok(ArmMode::Active),
            "PASSIVE" => return Ok(ArmMode::Passive),
            other => log::info!("sequencer: ignoring unmatched arm-mode input {other:?}"),
        }
    }
}

/// Everything the sequencer needs to run one mission, already opened by
/// the binary entry point.
pub struct Mission {
    pub cfg: Config,
    pub imu_link: Box<dyn Transport>,
    pub actuator_link: Box<dyn Transport>,
    pub launch_detect: Box<dyn LaunchDetect>,
}

/// Run the full mission sequence to completion (or to a fatal fault),
/// returning the fault's reason if one was raised.
pub fn run(mission: Mission, io: &mut dyn OperatorIo) -> Result<(), GncError> {
    let Mission {
        cfg,
        mut imu_link,
        actuator_link,
        mut launch_detect,
    } = mission;

    let error_log = Arc::new(ErrorLog::create(&cfg.raw.error_log_path)?);
    let quit = QuitFlag::new();
    let fault = FaultLatch::new();
    let active = ActiveFlag::new();

    let mut state = State::Boot;
    log::info!("sequencer: state -> {state:?}");

    // Boot: serial handshakes happen here on the main thread, then
    // ownership of each descriptor transfers to its worker thread.
    reader::synchronize(imu_link.as_mut(), cfg.raw.sync_retry_limit)?;
    let mut dispatcher = Dispatcher::new(actuator_link);
    dispatcher.arm()?;

    let raw_snapshot = Arc::new(Snapshot::new(RawSample {
        host_time: Instant::now(),
        psi: 0.0,
        theta: 0.0,
        phi: 0.0,
        accel: [0.0; 3],
    }));
    let reader_handle = reader::spawn(
        imu_link,
        raw_snapshot.clone(),
        quit.clone(),
        fault.clone(),
        cfg.raw.sync_retry_limit,
    )
    .map_err(|e| GncError::SerialIo {
        path: cfg.raw.imu_port.clone(),
        source: e,
    })?;

    wait_for_exact(io, "TEST").ok();

    state = State::Calibrate;
    log::info!("sequencer: state -> {state:?}");
    wait_for_exact(io, "Calibrate").ok();
    let calib = run_calibration(&cfg, &raw_snapshot, &quit, &fault)?;

    let attitude_snapshot = Arc::new(Snapshot::new(AttitudeSnapshot::zero(Instant::now())));
    let imu_log = TextLog::create(&cfg.raw.imu_log_path, crate::textlog::IMU_LOG_HEADER)?;
    let estimator_handle = attitude::spawn(
        &cfg,
        calib,
        raw_snapshot.clone(),
        attitude_snapshot.clone(),
        quit.clone(),
        fault.clone(),
        imu_log,
    )
    .map_err(|e| GncError::SerialIo {
        path: "estimator".into(),
        source: e,
    })?;

    let control_demand = Arc::new(Snapshot::new(ControlDemand {
        host_time: Instant::now(),
        f_theta: 0.0,
        f_psi: 0.0,
        m_phi: 0.0,
    }));
    let thrust_assignment = Arc::new(Snapshot::new(ThrustAssignment::zero(Instant::now())));
    let control_log = TextLog::create(&cfg.raw.control_log_path, crate::textlog::CONTROL_LOG_HEADER)?;
    let control_handle = control::spawn(
        &cfg,
        attitude_snapshot,
        control_demand,
        thrust_assignment,
        dispatcher,
        active.clone(),
        quit.clone(),
        fault.clone(),
        control_log,
    )
    .map_err(|e| GncError::SerialIo {
        path: cfg.raw.actuator_port.clone(),
        source: e,
    })?;

    state = State::FilterWarmup;
    log::info!("sequencer: state -> {state:?}");
    wait_for_exact(io, "Filter").ok();
    std::thread::sleep(Duration::from_micros(cfg.raw.durations.calibration_us.min(2_000_000)));
    wait_for_exact(io, "Continue").ok();

    let mode = wait_for_arm_mode(io).unwrap_or(ArmMode::Passive);
    state = match mode {
        ArmMode::Active => State::ArmedActive,
        ArmMode::Passive => State::ArmedPassive,
    };
    log::info!("sequencer: state -> {state:?}");
    wait_for_exact(io, "CONNECTED_CONNECTED_CONNECTED!").ok();

    state = State::WaitLaunch;
    log::info!("sequencer: state -> {state:?}");
    if check_fault(&fault, &error_log)? {
        return request_shutdown(quit, reader_handle, estimator_handle, control_handle);
    }
    gpio::wait_for_launch_edge(launch_detect.as_mut(), Duration::from_millis(20), &quit)?;

    state = State::BurnWait;
    log::info!("sequencer: state -> {state:?}");
    sleep_while_watching_fault(
        Duration::from_micros(cfg.raw.durations.burn_wait_us),
        &fault,
    );
    if check_fault(&fault, &error_log)? {
        return request_shutdown(quit, reader_handle, estimator_handle, control_handle);
    }

    state = State::ActiveWindow;
    log::info!("sequencer: state -> {state:?}");
    if mode == ArmMode::Active {
        active.set(true);
    }
    sleep_while_watching_fault(
        Duration::from_micros(cfg.raw.durations.active_window_us),
        &fault,
    );
    active.set(false);

    state = State::Descent;
    log::info!("sequencer: state -> {state:?}");
    sleep_while_watching_fault(Duration::from_micros(cfg.raw.durations.descent_us), &fault);

    state = State::Shutdown;
    log::info!("sequencer: state -> {state:?}");
    let result = request_shutdown(quit, reader_handle, estimator_handle, control_handle);
    check_fault(&fault, &error_log)?;
    result
}

fn sleep_while_watching_fault(total: Duration, fault: &FaultLatch) {
    const STEP: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if fault.is_raised() {
            return;
        }
        std::thread::sleep(STEP.min(deadline.saturating_duration_since(Instant::now())));
    }
}

fn check_fault(fault: &FaultLatch, error_log: &ErrorLog) -> Result<bool, GncError> {
    if fault.is_raised() {
        let reason = fault.reason().unwrap_or_else(|| "unknown fault".into());
        error_log.append("sequencer", &reason);
        log::error!("sequencer: fatal fault observed: {reason}");
        return Ok(true);
    }
    Ok(false)
}

fn request_shutdown(
    quit: QuitFlag,
    reader_handle: std::thread::JoinHandle<()>,
    estimator_handle: std::thread::JoinHandle<()>,
    control_handle: std::thread::JoinHandle<()>,
) -> Result<(), GncError> {
    quit.signal();
    let _ = reader_handle.join();
    let _ = estimator_handle.join();
    let _ = control_handle.join();
    Ok(())
}

/// Drain the raw-sample snapshot for `cfg.durations.calibration_us`,
/// accumulating into a [`Calibrator`].
fn run_calibration(
    cfg: &Config,
    raw_snapshot: &Snapshot<RawSample>,
    quit: &QuitFlag,
    fault: &FaultLatch,
) -> Result<crate::types::CalibrationFrame, GncError> {
    let mut calibrator = Calibrator::new();
    let deadline = Instant::now() + Duration::from_micros(cfg.raw.durations.calibration_us);
    let mut last_seen: Option<Instant> = None;

    while Instant::now() < deadline {
        if quit.is_set() || fault.is_raised() {
            break;
        }
        let sample = raw_snapshot.get();
        if last_seen != Some(sample.host_time) {
            last_seen = Some(sample.host_time);
            calibrator.accumulate(&sample);
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    calibrator.finish(cfg.raw.calibration_min_samples)
}
