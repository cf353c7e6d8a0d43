//! Abstraction for the byte-level duplex channel the core reads from and writes to.
//!
//! Kept intentionally thin: the concurrency core only ever needs to read,
//! write, check liveness, close, and tighten its read timeout for bulk
//! transfers. A real serial port and an in-memory mock both implement it
//! identically.

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod serial;

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockLink;
pub use serial::SerialLink;

use std::io;
use std::time::Duration;

/// Outcome of a single bounded read attempt, distinguishing "no bytes yet,
/// keep polling the alive flag" from a hard end-of-stream.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer (`n` may be less than requested).
    Read(usize),
    /// The read timed out with no bytes available; the caller should retry.
    TimedOut,
    /// The link reported end-of-stream (0 bytes, no more coming).
    Eof,
}

/// The duplex byte channel abstraction consumed by the frame reader and sender.
///
/// Implementors must allow concurrent `read` (by the reader thread) and
/// `write` (by the sender worker) from different threads; the core never
/// reads and writes from the same call site.
pub trait Link: Send + Sync {
    /// Attempts to fill `buf` from the link, respecting the current read
    /// timeout. Returns `ReadOutcome::TimedOut` rather than blocking forever
    /// so the frame reader can observe a shutdown request.
    fn read(&self, buf: &mut [u8]) -> io::Result<ReadOutcome>;

    /// Writes the entirety of `buf`, blocking until done or erroring.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    fn is_open(&self) -> bool;

    /// Closes the link. This must unblock a reader thread blocked in `read`.
    fn close(&self) -> io::Result<()>;

    /// Best-effort cancellation of an in-flight blocking read. Optional:
    /// links that only support bounded-timeout reads can leave this a no-op
    /// and rely on the reader polling `alive` between timeouts.
    fn cancel_read(&self) -> io::Result<()> {
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()>;

    fn read_timeout(&self) -> Duration;
}

/// Reads exactly `buf.len()` bytes, looping through `ReadOutcome::TimedOut`
/// so callers can interleave a liveness check. Returns `Ok(false)` on EOF
/// (a partial header read counts as EOF), `Ok(true)` on success.
pub fn read_exact_polling(
    link: &dyn Link,
    buf: &mut [u8],
    mut still_alive: impl FnMut() -> bool,
) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        if !still_alive() {
            return Ok(false);
        }
        match link.read(&mut buf[filled..])? {
            ReadOutcome::Read(0) => return Ok(false),
            ReadOutcome::Read(n) => filled += n,
            ReadOutcome::TimedOut => continue,
            ReadOutcome::Eof => return Ok(false),
        }
    }
    Ok(true)
}
