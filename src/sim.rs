//! Simulated serial backends for `--dry-run` and the integration tests
//! under `tests/`.
//!
//! These stand in for the attitude sensor and actuator controller without
//! any real hardware attached: [`SimImuLink`] answers the `#s` sync
//! handshake and streams synthetic 24-byte frames; [`SimActuatorLink`]
//! acks every byte written and records the last decoded PWM frame so
//! tests can assert on dispatcher behaviour.

use crate::protocol::{self, PWM_FRAME_LEN};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A simulated attitude sensor: replies `#S` to a sync request, then
/// streams frames produced by a caller-supplied generator function.
pub struct SimImuLink {
    pending: VecDeque<u8>,
    sample_fn: Box<dyn FnMut() -> [f32; 6] + Send>,
}

impl SimImuLink {
    pub fn new(sample_fn: impl FnMut() -> [f32; 6] + Send + 'static) -> Self {
        SimImuLink {
            pending: VecDeque::new(),
            sample_fn: Box::new(sample_fn),
        }
    }

    /// Stream a fixed (yaw, pitch, roll) forever, zero acceleration in x/y
    /// and 1 g in z — useful for calibration and steady-state scenarios.
    pub fn constant(psi: f32, theta: f32, phi: f32) -> Self {
        Self::new(move || [psi, theta, phi, 0.0, 0.0, 9.81])
    }
}

impl Read for SimImuLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.pending.is_empty() {
            let mut n = 0;
            while n < buf.len() {
                match self.pending.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            return Ok(n);
        }

        let values = (self.sample_fn)();
        let mut frame = [0u8; protocol::IMU_FRAME_LEN];
        for (i, v) in values.iter().enumerate() {
            frame[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        let n = buf.len().min(protocol::IMU_FRAME_LEN);
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }
}

impl Write for SimImuLink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if data.windows(protocol::imu_cmd::SYNC.len()).any(|w| w == protocol::imu_cmd::SYNC) {
            self.pending.extend(protocol::IMU_SYNC_REPLY);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The record of the most recent frame an actuator dispatcher has sent,
/// observable from a test thread without tearing down the link.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActuatorState {
    pub pwm: [u16; 4],
    pub last_frame_age: Option<std::time::Duration>,
}

struct ActuatorInner {
    last_pwm: [u16; 4],
    last_frame_at: Option<Instant>,
    armed: bool,
}

/// A simulated actuator controller: acks every byte with `!` and decodes
/// complete 6-byte PWM frames, exposing the latest decoded state through
/// a cheap handle so tests can assert on the dispatcher's output.
pub struct SimActuatorLink {
    pending_acks: VecDeque<u8>,
    frame_buf: Vec<u8>,
    handshake_buf: Vec<u8>,
    inner: Arc<Mutex<ActuatorInner>>,
}

/// A clonable, thread-safe read handle onto a [`SimActuatorLink`]'s state.
#[derive(Clone)]
pub struct ActuatorHandle(Arc<Mutex<ActuatorInner>>);

impl ActuatorHandle {
    pub fn state(&self) -> ActuatorState {
        let guard = self.0.lock().expect("actuator sim mutex poisoned");
        ActuatorState {
            pwm: guard.last_pwm,
            last_frame_age: guard.last_frame_at.map(|t| t.elapsed()),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.0.lock().expect("actuator sim mutex poisoned").armed
    }
}

impl SimActuatorLink {
    pub fn new() -> (Self, ActuatorHandle) {
        let inner = Arc::new(Mutex::new(ActuatorInner {
            last_pwm: [0; 4],
            last_frame_at: None,
            armed: false,
        }));
        let handle = ActuatorHandle(inner.clone());
        (
            SimActuatorLink {
                pending_acks: VecDeque::new(),
                frame_buf: Vec::with_capacity(PWM_FRAME_LEN),
                handshake_buf: Vec::with_capacity(3),
                inner,
            },
            handle,
        )
    }
}

impl Read for SimActuatorLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() || self.pending_acks.is_empty() {
            return Ok(0);
        }
        buf[0] = self.pending_acks.pop_front().unwrap();
        Ok(1)
    }
}

impl Write for SimActuatorLink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        for &byte in data {
            self.pending_acks.push_back(protocol::actuator_cmd::ACK);

            if self.frame_buf.is_empty() && byte != protocol::actuator_cmd::FRAME_MARKER {
                // Handshake/reset bytes ('@', 's', 'e', '!') are acked but not framed;
                // track the last three to recognise '@s!'/'@e!' for the armed state.
                self.handshake_buf.push(byte);
                if self.handshake_buf.len() > 3 {
                    self.handshake_buf.remove(0);
                }
                if self.handshake_buf == protocol::actuator_cmd::ARM {
                    self.inner.lock().expect("actuator sim mutex poisoned").armed = true;
                    self.handshake_buf.clear();
                } else if self.handshake_buf == protocol::actuator_cmd::RESET {
                    self.inner.lock().expect("actuator sim mutex poisoned").armed = false;
                    self.handshake_buf.clear();
                }
                continue;
            }
            self.frame_buf.push(byte);
            if self.frame_buf.len() == PWM_FRAME_LEN {
                let frame: [u8; PWM_FRAME_LEN] = self.frame_buf.clone().try_into().unwrap();
                self.frame_buf.clear();
                if let Some(pwm) = protocol::unpack_pwm_frame(&frame) {
                    let mut guard = self.inner.lock().expect("actuator sim mutex poisoned");
                    guard.last_pwm = pwm;
                    guard.last_frame_at = Some(Instant::now());
                }
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
