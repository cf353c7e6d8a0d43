//! Real link backed by a USB CDC serial port.

use super::{Link, ReadOutcome};
use serial2::SerialPort as RawPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default baud rate for the device's USB CDC interface.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Header reads use a short timeout so the frame reader can observe a
/// shutdown request without blocking indefinitely on an idle link.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// A [`Link`] backed by a real serial port, opened 8-N-1 at 115200 baud.
pub struct SerialLink {
    port: RawPort,
    open: AtomicBool,
}

impl SerialLink {
    pub fn open(path: &str, baud: u32) -> io::Result<Self> {
        let port = RawPort::open(path, baud)?;
        port.set_read_timeout(DEFAULT_READ_TIMEOUT)?;
        Ok(Self {
            port,
            open: AtomicBool::new(true),
        })
    }

    /// Opens at the device's default baud rate (115200, 8-N-1).
    pub fn open_default(path: &str) -> io::Result<Self> {
        Self::open(path, DEFAULT_BAUD)
    }
}

impl Link for SerialLink {
    fn read(&self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        if !self.is_open() {
            return Ok(ReadOutcome::Eof);
        }
        match (&self.port).read(buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => Ok(ReadOutcome::Read(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(ReadOutcome::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        (&self.port).write_all(buf)?;
        (&self.port).flush()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> io::Result<()> {
        self.open.store(false, Ordering::Release);
        let _ = self.port.discard_input_buffer();
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.port.set_read_timeout(timeout)
    }

    fn read_timeout(&self) -> Duration {
        self.port.get_read_timeout()
    }
}
