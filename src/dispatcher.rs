//! Actuator dispatcher: 6-byte PWM framing with per-byte acknowledgement
//! over the actuator UART.
//!
//! Runs inline inside the control thread rather than as its own thread —
//! `T_control` both computes the allocation and drives the dispatcher each
//! tick, so simply calling [`Dispatcher::send`] (or
//! [`Dispatcher::send_zero`]) once per control period, every period,
//! already satisfies the 150 ms watchdog contract.

use crate::error::GncError;
use crate::protocol::{self, PWM_FRAME_LEN};
use crate::transport::Transport;
use std::io::{Read, Write};

fn io_err(e: std::io::Error) -> GncError {
    GncError::SerialIo {
        path: "actuator".into(),
        source: e,
    }
}

/// Owns the actuator serial link and speaks its per-byte-acked protocol.
pub struct Dispatcher {
    link: Box<dyn Transport>,
    armed: bool,
}

impl Dispatcher {
    pub fn new(link: Box<dyn Transport>) -> Self {
        Dispatcher {
            link,
            armed: false,
        }
    }

    /// Send the startup handshake `@s!`, acking each byte.
    pub fn arm(&mut self) -> Result<(), GncError> {
        self.write_acked(protocol::actuator_cmd::ARM)?;
        self.armed = true;
        Ok(())
    }

    /// Send the reset sequence `@e!`, acking each byte. The controller may
    /// be re-armed afterward (scenario 6: handshake replay).
    pub fn reset(&mut self) -> Result<(), GncError> {
        self.write_acked(protocol::actuator_cmd::RESET)?;
        self.armed = false;
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Frame and send one PWM command.
    pub fn send(&mut self, pwm: [u16; 4]) -> Result<(), GncError> {
        let frame = protocol::pack_pwm_frame(pwm);
        self.write_acked(&frame)
    }

    /// Convenience for the all-zeros frame emitted at active-window end
    /// and whenever the sequencer is outside the active-control window.
    pub fn send_zero(&mut self) -> Result<(), GncError> {
        self.send([0; 4])
    }

    /// Write `bytes` one at a time, blocking for a single-byte ack after
    /// each write. A missing or timed-out ack is `DispatcherAckTimeout`.
    fn write_acked(&mut self, bytes: &[u8]) -> Result<(), GncError> {
        for (index, &byte) in bytes.iter().enumerate() {
            self.link.write_all(&[byte]).map_err(io_err)?;
            let mut ack = [0u8; 1];
            self.link
                .read_exact(&mut ack)
                .map_err(|_| GncError::DispatcherAckTimeout { index })?;
            if ack[0] != protocol::actuator_cmd::ACK {
                return Err(GncError::DispatcherAckTimeout { index });
            }
        }
        Ok(())
    }
}

const _: () = assert!(PWM_FRAME_LEN == 6);
