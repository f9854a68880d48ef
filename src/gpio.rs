//! Umbilical launch-detect input.
//!
//! The umbilical line reads HIGH while connected and LOW once it is pulled
//! at liftoff; the mission sequencer polls for the HIGH-to-LOW edge after
//! the "armed" operator prompt. The real backend is the `rppal` crate's
//! GPIO input, feature-gated as `gpio`; a simulated backend stands in for
//! `--dry-run` runs and tests.

use crate::error::GncError;
use crate::shared::QuitFlag;
use std::time::Duration;

/// Polls a single digital input line for the umbilical signal.
pub trait LaunchDetect: Send {
    /// `true` while the umbilical is connected (line HIGH).
    fn is_connected(&mut self) -> Result<bool, GncError>;
}

/// Block (polling at `poll_period`) until a HIGH-to-LOW transition is seen
/// on `detect`, or until `quit` is signalled. Returns `Ok(true)` on the
/// launch edge, `Ok(false)` if cancelled first.
///
/// If the line already reads LOW on entry, the umbilical has already been
/// pulled before this call started polling; that counts as the launch edge
/// immediately rather than waiting for a transition that already happened.
pub fn wait_for_launch_edge(
    detect: &mut dyn LaunchDetect,
    poll_period: Duration,
    quit: &QuitFlag,
) -> Result<bool, GncError> {
    let mut previous = detect.is_connected()?;
    if !previous {
        return Ok(true);
    }
    while !quit.is_set() {
        let current = detect.is_connected()?;
        if previous && !current {
            return Ok(true);
        }
        previous = current;
        std::thread::sleep(poll_period);
    }
    Ok(false)
}

/// Simulated umbilical line for `--dry-run` runs and integration tests:
/// starts connected (HIGH), and [`SimLaunchDetect::pull`] flips it LOW to
/// simulate the launch edge.
#[derive(Clone)]
pub struct SimLaunchDetect {
    connected: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl SimLaunchDetect {
    pub fn new() -> Self {
        SimLaunchDetect {
            connected: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        }
    }

    /// Simulate the umbilical being pulled at liftoff.
    pub fn pull(&self) {
        self.connected
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Default for SimLaunchDetect {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchDetect for SimLaunchDetect {
    fn is_connected(&mut self) -> Result<bool, GncError> {
        Ok(self.connected.load(std::sync::atomic::Ordering::Relaxed))
    }
}

#[cfg(feature = "gpio")]
mod real {
    use super::{GncError, LaunchDetect};
    use rppal::gpio::{Gpio, InputPin};

    /// Real umbilical input via `rppal`, configured input-with-pull.
    pub struct RppalLaunchDetect {
        pin: InputPin,
    }

    impl RppalLaunchDetect {
        pub fn open(bcm_pin: u8) -> Result<Self, GncError> {
            let gpio = Gpio::new().map_err(|e| GncError::Gpio(e.to_string()))?;
            let pin = gpio
                .get(bcm_pin)
                .map_err(|e| GncError::Gpio(e.to_string()))?
                .into_input_pullup();
            Ok(RppalLaunchDetect { pin })
        }
    }

    impl LaunchDetect for RppalLaunchDetect {
        fn is_connected(&mut self) -> Result<bool, GncError> {
            Ok(self.pin.is_high())
        }
    }
}

#[cfg(feature = "gpio")]
pub use real::RppalLaunchDetect;
