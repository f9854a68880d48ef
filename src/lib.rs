//! # apogee-rcs — cold-gas RCS guidance, navigation and control
//!
//! Onboard GNC software for a sounding rocket's four-nozzle cold-gas
//! Reaction Control System. The library is the concurrent
//! estimation-and-control pipeline: a serial IMU reader, a six-filter Kalman
//! attitude estimator, a PD/P control law, a simplex-based thrust allocator,
//! PWM linearisation, and a rate-limited actuator dispatcher, tied together
//! by a mission sequencer state machine.
//!
//! ## Quick start (dry run, no hardware)
//! ```no_run
//! use apogee_rcs::config::Config;
//! use apogee_rcs::gpio::SimLaunchDetect;
//! use apogee_rcs::sequencer::{self, Mission, ScriptedIo};
//! use apogee_rcs::sim::{SimActuatorLink, SimImuLink};
//!
//! let cfg = Config::load("apogee-rcs.yaml").unwrap();
//! let imu_link = Box::new(SimImuLink::constant(0.0, 0.0, 0.0));
//! let (actuator_link, _handle) = SimActuatorLink::new();
//! let mission = Mission {
//!     cfg,
//!     imu_link,
//!     actuator_link: Box::new(actuator_link),
//!     launch_detect: Box::new(SimLaunchDetect::new()),
//! };
//! let mut io = ScriptedIo::new(["TEST", "Calibrate", "Filter", "Continue", "PASSIVE"]);
//! sequencer::run(mission, &mut io).unwrap();
//! ```

pub mod allocator;
pub mod attitude;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod gpio;
pub mod kalman;
pub mod protocol;
pub mod pwm;
pub mod reader;
pub mod sequencer;
pub mod shared;
pub mod sim;
pub mod textlog;
pub mod transport;
pub mod types;

pub use error::GncError;

/// Result type alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, GncError>;
