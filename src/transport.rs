//! Serial transport abstraction.
//!
//! Both worker threads that own a serial descriptor (`T_reader`,
//! `T_control`'s dispatcher) operate against this minimal `Transport`
//! trait instead of `serialport::SerialPort` directly, so the `--dry-run`
//! backend in [`crate::sim`] can stand in for real hardware without
//! implementing the full serial-port configuration surface.

use std::io::{Read, Write};

/// Anything a reader/writer worker thread needs from a serial link.
pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send + ?Sized> Transport for T {}

/// Adapts a `serialport::SerialPort` trait object to [`Transport`].
pub struct RealLink(pub Box<dyn serialport::SerialPort>);

impl Read for RealLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for RealLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Open a real serial port at `path`/`baud` and adapt it to [`Transport`].
pub fn open_real(path: &str, baud: u32) -> Result<Box<dyn Transport>, crate::error::GncError> {
    let port = serialport::new(path, baud)
        .timeout(std::time::Duration::from_millis(200))
        .open()
        .map_err(|source| crate::error::GncError::SerialOpen {
            path: path.to_string(),
            source,
        })?;
    Ok(Box::new(RealLink(port)))
}
