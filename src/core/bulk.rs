//! Bulk file-transfer streaming: consumes a byte-exact payload plus a
//! trailing CRC with no protocol framing, verifies it, and materializes it to
//! a temporary artifact.

use crate::codec::crc16_ccitt;
use crate::config::{BULK_CHUNK, BULK_PROGRESS_EVERY_N_CHUNKS};
use crate::core::pools::{Progress, SubscriberPools};
use crate::transport::{Link, ReadOutcome};
use crate::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Parameters for an active bulk transfer, installed when the reader enters
/// [`crate::core::frame_reader::ReaderMode::Bulk`].
#[derive(Debug, Clone)]
pub struct FileSession {
    pub size: u64,
    pub timeout: Duration,
    pub delay: Option<Duration>,
}

/// One-shot completion signal a caller blocks on while a bulk transfer runs
/// on the reader thread. Mirrors [`crate::core::response_slot::ResponseSlot`]'s
/// clear/set/wait shape but carries a terminal `Result` instead of a `Message`.
pub struct FileCompletion {
    outcome: Mutex<Option<Result<(PathBuf, f64), Error>>>,
    ready: Condvar,
}

impl FileCompletion {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    pub fn set(&self, outcome: Result<(PathBuf, f64), Error>) {
        *self.outcome.lock().unwrap() = Some(outcome);
        self.ready.notify_all();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<(PathBuf, f64), Error> {
        let mut guard = self.outcome.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(outcome) = guard.take() {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            let (next_guard, result) = self.ready.wait_timeout(guard, deadline - now).unwrap();
            guard = next_guard;
            if result.timed_out() && guard.is_none() {
                return Err(Error::Timeout);
            }
        }
    }
}

impl Default for FileCompletion {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs on the reader thread once it has flipped to bulk mode. `prefix` is
/// the 3 header bytes the framing loop had already read before the mode
/// switch was observed; for small files they may contain part or all of the
/// trailing CRC.
pub fn stream_file(
    link: &dyn Link,
    prefix: [u8; 3],
    session: &FileSession,
    pools: &SubscriberPools,
) -> Result<(PathBuf, f64), Error> {
    let started = Instant::now();
    let prefix_len = (session.size as usize).min(3);
    let prefix_data = &prefix[..prefix_len];
    let crc_prefix = &prefix[prefix_len..];

    let mut buffer = Vec::with_capacity(session.size as usize);
    buffer.extend_from_slice(prefix_data);

    let mut remaining = session.size - prefix_len as u64;
    let mut chunks_since_progress = 0usize;

    while remaining > 0 {
        check_deadline(&started, session.timeout)?;
        let want = remaining.min(BULK_CHUNK as u64) as usize;
        let mut chunk = vec![0u8; want];
        let n = read_some(link, &mut chunk, &started, session.timeout)?;
        if n == 0 {
            return Err(Error::MissingResponse);
        }
        buffer.extend_from_slice(&chunk[..n]);
        remaining -= n as u64;

        chunks_since_progress += 1;
        if chunks_since_progress >= BULK_PROGRESS_EVERY_N_CHUNKS || remaining == 0 {
            chunks_since_progress = 0;
            let received = session.size - remaining;
            pools.notify_progress(Progress {
                bytes_received: received,
                total_bytes: session.size,
                kbps: kbps(received, started.elapsed()),
            });
        }

        if let Some(delay) = session.delay {
            std::thread::sleep(delay);
        }
    }

    let mut crc_bytes = [0u8; 2];
    crc_bytes[..crc_prefix.len()].copy_from_slice(crc_prefix);
    let need = 2 - crc_prefix.len();
    if need > 0 {
        read_exact_timed(
            link,
            &mut crc_bytes[crc_prefix.len()..],
            &started,
            session.timeout,
        )?;
    }
    let received_crc = u16::from_be_bytes(crc_bytes);
    let computed_crc = crc16_ccitt(&buffer);
    if received_crc != computed_crc {
        return Err(Error::CrcError {
            expected: received_crc,
            computed: computed_crc,
        });
    }

    let path = materialize(&buffer)?;
    let kbps = kbps(session.size, started.elapsed());
    pools.notify_complete(path.clone(), kbps);
    Ok((path, kbps))
}

fn check_deadline(started: &Instant, timeout: Duration) -> Result<(), Error> {
    if started.elapsed() > timeout {
        Err(Error::Timeout)
    } else {
        Ok(())
    }
}

fn read_some(
    link: &dyn Link,
    buf: &mut [u8],
    started: &Instant,
    timeout: Duration,
) -> Result<usize, Error> {
    loop {
        check_deadline(started, timeout)?;
        match link.read(buf)? {
            ReadOutcome::Read(n) => return Ok(n),
            ReadOutcome::TimedOut => continue,
            ReadOutcome::Eof => return Ok(0),
        }
    }
}

fn read_exact_timed(
    link: &dyn Link,
    buf: &mut [u8],
    started: &Instant,
    timeout: Duration,
) -> Result<(), Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = read_some(link, &mut buf[filled..], started, timeout)?;
        if n == 0 {
            return Err(Error::MissingResponse);
        }
        filled += n;
    }
    Ok(())
}

fn kbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(1e-6);
    (bytes as f64 / 1024.0) / secs
}

/// The size-0 short-circuit: an empty artifact with no
/// reader or device involvement at all.
pub fn empty_artifact() -> Result<PathBuf, Error> {
    materialize(&[])
}

fn materialize(data: &[u8]) -> Result<PathBuf, Error> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(data)?;
    file.into_temp_path()
        .keep()
        .map_err(|e| Error::Io(e.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockLink;

    fn frame_with_crc(payload: &[u8]) -> Vec<u8> {
        let crc = crc16_ccitt(payload);
        let mut out = payload.to_vec();
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    fn run_download(size: usize) -> Result<(PathBuf, f64), Error> {
        let payload: Vec<u8> = (0..size as u32).map(|i| (i % 256) as u8).collect();
        let wire = frame_with_crc(&payload);
        let link = MockLink::new();
        link.push_inbound(&wire);

        let header_len = wire.len().min(3);
        let mut prefix = [0u8; 3];
        prefix[..header_len].copy_from_slice(&wire[..header_len]);

        // The rest of `wire` beyond the 3-byte prefix is what remains on the
        // link for stream_file to read, exactly as the real reader would see it.
        link.push_inbound(&wire[header_len..]);

        let session = FileSession {
            size: size as u64,
            timeout: Duration::from_secs(2),
            delay: None,
        };
        let pools = SubscriberPools::new();
        stream_file(&link, prefix, &session, &pools)
    }

    #[test]
    fn downloads_a_one_byte_file() {
        let (path, _kbps) = run_download(1).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8]);
    }

    #[test]
    fn downloads_a_two_byte_file() {
        let (path, _) = run_download(2).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 2);
    }

    #[test]
    fn downloads_a_three_byte_file() {
        let (path, _) = run_download(3).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 3);
    }

    #[test]
    fn downloads_sixty_bytes() {
        let (path, _) = run_download(60).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 60);
    }

    #[test]
    fn downloads_across_a_chunk_boundary() {
        let (path, _) = run_download(BULK_CHUNK + 1).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), BULK_CHUNK + 1);
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let payload = vec![7u8; 10];
        let mut wire = frame_with_crc(&payload);
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        let link = MockLink::new();
        let mut prefix = [0u8; 3];
        prefix.copy_from_slice(&wire[..3]);
        link.push_inbound(&wire[3..]);
        let session = FileSession {
            size: 10,
            timeout: Duration::from_secs(2),
            delay: None,
        };
        let pools = SubscriberPools::new();
        match stream_file(&link, prefix, &session, &pools) {
            Err(Error::CrcError { .. }) => {}
            other => panic!("expected CrcError, got {other:?}"),
        }
    }

    #[test]
    fn eof_before_payload_complete_is_missing_response() {
        let link = MockLink::new();
        link.set_read_timeout(Duration::from_millis(20)).unwrap();
        link.push_inbound(&[1, 2]);
        link.close().unwrap();
        let session = FileSession {
            size: 10,
            timeout: Duration::from_secs(1),
            delay: None,
        };
        let pools = SubscriberPools::new();
        match stream_file(&link, [0, 0, 0], &session, &pools) {
            Err(Error::MissingResponse) => {}
            other => panic!("expected MissingResponse, got {other:?}"),
        }
    }
}
