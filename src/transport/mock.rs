//! In-memory [`Link`] for tests: lets a test thread feed device->host bytes
//! and inspect host->device writes without a real serial port.
//!
//! Modeled on the reference implementation's `DummySerial` test double: a
//! condvar-guarded byte queue for inbound data, blocking reads that wait for
//! more bytes to arrive (or the configured timeout to elapse).

use super::{Link, ReadOutcome};
use std::collections::VecDeque;
use std::io;
use std::sync::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub struct MockLink {
    inbound: Mutex<VecDeque<u8>>,
    inbound_ready: Condvar,
    outbound: Mutex<Vec<u8>>,
    open: AtomicBool,
    read_timeout: Mutex<Duration>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            inbound_ready: Condvar::new(),
            outbound: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            read_timeout: Mutex::new(Duration::from_millis(200)),
        }
    }

    /// Appends bytes as if the device had just sent them.
    pub fn push_inbound(&self, data: &[u8]) {
        let mut guard = self.inbound.lock().unwrap();
        guard.extend(data.iter().copied());
        self.inbound_ready.notify_all();
    }

    /// Returns everything written so far without clearing it.
    pub fn written(&self) -> Vec<u8> {
        self.outbound.lock().unwrap().clone()
    }

    /// Returns and clears everything written so far.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.outbound.lock().unwrap())
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Link for MockLink {
    fn read(&self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        let timeout = *self.read_timeout.lock().unwrap();
        let mut guard = self.inbound.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if !guard.is_empty() {
                let n = buf.len().min(guard.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = guard.pop_front().expect("checked non-empty above");
                }
                return Ok(ReadOutcome::Read(n));
            }
            if !self.open.load(Ordering::Acquire) {
                return Ok(ReadOutcome::Eof);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(ReadOutcome::TimedOut);
            }
            let (next_guard, result) = self
                .inbound_ready
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = next_guard;
            if result.timed_out() && guard.is_empty() {
                return Ok(ReadOutcome::TimedOut);
            }
        }
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        self.outbound.lock().unwrap().extend_from_slice(buf);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> io::Result<()> {
        self.open.store(false, Ordering::Release);
        self.inbound_ready.notify_all();
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        *self.read_timeout.lock().unwrap() = timeout;
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        *self.read_timeout.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_timed_out_with_no_data() {
        let link = MockLink::new();
        link.set_read_timeout(Duration::from_millis(20)).unwrap();
        let mut buf = [0u8; 3];
        match link.read(&mut buf).unwrap() {
            ReadOutcome::TimedOut => {}
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn read_returns_pushed_bytes() {
        let link = MockLink::new();
        link.push_inbound(&[1, 2, 3]);
        let mut buf = [0u8; 3];
        match link.read(&mut buf).unwrap() {
            ReadOutcome::Read(3) => assert_eq!(buf, [1, 2, 3]),
            other => panic!("expected 3 bytes, got {other:?}"),
        }
    }

    #[test]
    fn close_unblocks_a_waiting_read_as_eof() {
        let link = std::sync::Arc::new(MockLink::new());
        link.set_read_timeout(Duration::from_secs(30)).unwrap();
        let reader = {
            let link = link.clone();
            std::thread::spawn(move || {
                let mut buf = [0u8; 1];
                link.read(&mut buf).unwrap()
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        link.close().unwrap();
        match reader.join().unwrap() {
            ReadOutcome::Eof => {}
            other => panic!("expected eof, got {other:?}"),
        }
    }

    #[test]
    fn write_after_close_errors() {
        let link = MockLink::new();
        link.close().unwrap();
        assert!(link.write_all(&[1]).is_err());
    }
}
