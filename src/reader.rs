//! Serial IMU reader.
//!
//! Owns the attitude-sensor serial link, establishes the `#S` sync
//! handshake, then runs a dedicated thread that reads framed 24-byte
//! samples and publishes them to the shared raw-sample snapshot.

use crate::protocol::{self, IMU_FRAME_LEN};
use crate::shared::{FaultLatch, QuitFlag, Snapshot};
use crate::transport::Transport;
use crate::types::RawSample;
use std::io::{Read, Write};
use std::time::Instant;

/// Number of sync attempts before declaring loss of sync fatal.
const DEFAULT_SYNC_RETRIES: u32 = 5;
/// Short-read retry budget for a single 24-byte frame read.
const SHORT_READ_RETRIES: u32 = 3;

/// Establish binary-continuous streaming and wait for the `#S` sync reply.
///
/// Sends the configure commands, then up to `retries` sync requests,
/// scanning each reply for the two-byte token. Returns `Err` (fatal) if
/// no attempt succeeds.
pub fn synchronize(
    link: &mut dyn Transport,
    retries: u32,
) -> Result<(), crate::error::GncError> {
    link.write_all(protocol::imu_cmd::BINARY_OUTPUT)
        .map_err(io_err)?;
    link.write_all(protocol::imu_cmd::CONTINUOUS)
        .map_err(io_err)?;
    link.write_all(protocol::imu_cmd::SILENCE_ERRORS)
        .map_err(io_err)?;

    for attempt in 1..=retries {
        link.write_all(protocol::imu_cmd::SYNC).map_err(io_err)?;

        let mut window = [0u8; 2];
        if link.read_exact(&mut window).is_ok() && window == protocol::IMU_SYNC_REPLY {
            log::info!("imu reader: synchronized on attempt {attempt}");
            return Ok(());
        }
        log::warn!("imu reader: sync attempt {attempt}/{retries} failed");
    }

    Err(crate::error::GncError::SyncLost { attempts: retries })
}

fn io_err(e: std::io::Error) -> crate::error::GncError {
    crate::error::GncError::SerialIo {
        path: "imu".into(),
        source: e,
    }
}

/// Read one 24-byte frame, retrying transient short reads in place up to
/// [`SHORT_READ_RETRIES`] times before treating the loss as a sync failure.
fn read_frame(link: &mut dyn Transport) -> Result<[u8; IMU_FRAME_LEN], crate::error::GncError> {
    let mut frame = [0u8; IMU_FRAME_LEN];
    let mut filled = 0usize;
    let mut retries = 0u32;

    while filled < IMU_FRAME_LEN {
        match link.read(&mut frame[filled..]) {
            Ok(0) => {
                retries += 1;
                if retries > SHORT_READ_RETRIES {
                    return Err(crate::error::GncError::SyncLost {
                        attempts: retries,
                    });
                }
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                retries += 1;
                if retries > SHORT_READ_RETRIES {
                    return Err(crate::error::GncError::SyncLost { attempts: retries });
                }
            }
            Err(e) => return Err(io_err(e)),
        }
    }
    Ok(frame)
}

/// Spawn the IMU reader thread. `link` must already be synchronized via
/// [`synchronize`]. The thread loops reading frames and publishing
/// [`RawSample`]s until `quit` is signalled, retrying loss of sync up to
/// `sync_retry_limit` times before raising a fatal fault.
pub fn spawn(
    mut link: Box<dyn Transport>,
    raw_snapshot: std::sync::Arc<Snapshot<RawSample>>,
    quit: QuitFlag,
    fault: FaultLatch,
    sync_retry_limit: u32,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("gnc-imu-reader".into())
        .spawn(move || {
            while !quit.is_set() {
                match read_frame(link.as_mut()) {
                    Ok(frame) => {
                        if let Some(values) = protocol::decode_imu_frame(&frame) {
                            let sample = RawSample {
                                host_time: Instant::now(),
                                psi: values[0],
                                theta: values[1],
                                phi: values[2],
                                accel: [values[3], values[4], values[5]],
                            };
                            raw_snapshot.publish(sample);
                        }
                    }
                    Err(e) => {
                        log::warn!("imu reader: frame read failed: {e}, resyncing");
                        if synchronize(link.as_mut(), sync_retry_limit).is_err() {
                            log::error!("imu reader: persistent sync loss, declaring fatal");
                            fault.raise("imu reader: persistent loss of sync");
                            break;
                        }
                    }
                }
            }
            let _ = link.flush();
            log::info!("imu reader thread exiting");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimImuLink;

    #[test]
    fn synchronize_succeeds_against_sim_link() {
        let mut link = SimImuLink::constant(0.0, 0.0, 0.0);
        assert!(synchronize(&mut link, DEFAULT_SYNC_RETRIES).is_ok());
    }

    #[test]
    fn read_frame_decodes_streamed_sample() {
        let mut link = SimImuLink::constant(0.1, -0.2, 0.3);
        synchronize(&mut link, DEFAULT_SYNC_RETRIES).unwrap();
        let frame = read_frame(&mut link).unwrap();
        let decoded = protocol::decode_imu_frame(&frame).unwrap();
        assert!((decoded[0] - 0.1).abs() < 1e-6);
        assert!((decoded[1] + 0.2).abs() < 1e-6);
        assert!((decoded[2] - 0.3).abs() < 1e-6);
    }
}
