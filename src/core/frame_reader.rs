//! The dedicated reader thread: pulls bytes, frames protocol messages
//! or streams a bulk file transfer, and hands decoded messages to the dispatcher.

use crate::codec::Codec;
use crate::config::{BULK_READ_TIMEOUT, FRAMING_READ_TIMEOUT, FRAME_BODY_CHUNK};
use crate::core::bulk::{self, FileCompletion, FileSession};
use crate::core::dispatcher::Dispatcher;
use crate::core::pools::SubscriberPools;
use crate::transport::{read_exact_polling, Link, ReadOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Which of the two things the reader thread is currently doing with the
/// bytes coming off the link.
pub enum ReaderMode {
    Framing,
    Bulk(FileSession),
}

/// Shared handle used by callers (via [`crate::core::link_core::LinkCore`])
/// to request entry into bulk mode and learn when it completes.
pub struct ReaderHandle {
    mode: Mutex<ReaderMode>,
    pub completion: FileCompletion,
}

impl ReaderHandle {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(ReaderMode::Framing),
            completion: FileCompletion::new(),
        }
    }

    /// Installs a bulk session. Returns `false` (and installs nothing) if one
    /// is already active — at most one file transfer runs at a time.
    pub fn try_enter_bulk(&self, session: FileSession) -> bool {
        let mut mode = self.mode.lock().unwrap();
        if matches!(*mode, ReaderMode::Bulk(_)) {
            return false;
        }
        *mode = ReaderMode::Bulk(session);
        true
    }
}

impl Default for ReaderHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FrameReader {
    thread: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
}

impl FrameReader {
    pub fn spawn(
        link: Arc<dyn Link>,
        codec: Arc<dyn Codec>,
        dispatcher: Arc<Dispatcher>,
        pools: Arc<SubscriberPools>,
        reader_handle: Arc<ReaderHandle>,
        on_disconnect: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_thread = alive.clone();
        let thread = thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || {
                let _ = link.set_read_timeout(FRAMING_READ_TIMEOUT);
                run(
                    &*link,
                    &*codec,
                    &dispatcher,
                    &pools,
                    &reader_handle,
                    &alive_for_thread,
                );
                pools.notify_connected(false);
                on_disconnect();
            })
            .expect("failed to spawn frame reader thread");
        Self {
            thread: Some(thread),
            alive,
        }
    }

    /// Signals the reader to stop at its next poll. Does not itself unblock
    /// a pending read; callers close the link for that.
    pub fn request_stop(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn join(&mut self, timeout: std::time::Duration) {
        if let Some(handle) = self.thread.take() {
            let deadline = std::time::Instant::now() + timeout;
            while !handle.is_finished() && std::time::Instant::now() < deadline {
                thread::sleep(std::time::Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
            // else: leave it detached, the closed link will make it exit shortly.
        }
    }
}

fn run(
    link: &dyn Link,
    codec: &dyn Codec,
    dispatcher: &Dispatcher,
    pools: &SubscriberPools,
    reader_handle: &ReaderHandle,
    alive: &AtomicBool,
) {
    while alive.load(Ordering::Acquire) && link.is_open() {
        let mut header = [0u8; 3];
        match read_exact_polling(link, &mut header, || alive.load(Ordering::Acquire)) {
            Ok(true) => {}
            Ok(false) | Err(_) => return,
        };

        if let Some(session) = take_bulk_session(reader_handle) {
            let prior_timeout = link.read_timeout();
            let _ = link.set_read_timeout(BULK_READ_TIMEOUT);
            let outcome = bulk::stream_file(link, header, &session, pools);
            let _ = link.set_read_timeout(prior_timeout);
            if let Err(ref err) = outcome {
                tracing::warn!(?err, "bulk transfer failed");
                pools.notify_failed(clone_err(err));
            }
            reader_handle.completion.set(outcome);
            continue;
        }

        let length = u16::from_be_bytes([header[1], header[2]]) as usize;
        if length < 3 {
            tracing::warn!(length, "frame header declares length below minimum");
            continue;
        }
        let mut frame = Vec::with_capacity(length);
        frame.extend_from_slice(&header);
        let mut remaining = length - 3;
        let mut ok = true;
        while remaining > 0 {
            let take = remaining.min(FRAME_BODY_CHUNK);
            let mut chunk = vec![0u8; take];
            match read_exact_polling(link, &mut chunk, || alive.load(Ordering::Acquire)) {
                Ok(true) => {
                    frame.extend_from_slice(&chunk);
                    remaining -= take;
                }
                Ok(false) | Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            return;
        }

        match codec.decode(&frame) {
            Ok(msg) => dispatcher.dispatch(msg),
            Err(err) => tracing::warn!(?err, "failed to decode frame, skipping"),
        }
    }
}

fn take_bulk_session(handle: &ReaderHandle) -> Option<FileSession> {
    let mode = &mut *handle.mode.lock().unwrap();
    match std::mem::replace(mode, ReaderMode::Framing) {
        ReaderMode::Bulk(session) => Some(session),
        ReaderMode::Framing => None,
    }
}

fn clone_err(err: &crate::Error) -> crate::Error {
    match err {
        crate::Error::Timeout => crate::Error::Timeout,
        crate::Error::MissingResponse => crate::Error::MissingResponse,
        crate::Error::CrcError { expected, computed } => crate::Error::CrcError {
            expected: *expected,
            computed: *computed,
        },
        other => crate::Error::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DeviceCodec, Message};
    use crate::core::response_slot::ResponseSlot;
    use crate::transport::MockLink;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn decodes_a_framed_message_end_to_end() {
        let link = Arc::new(MockLink::new());
        let codec = Arc::new(DeviceCodec);
        let slot = Arc::new(ResponseSlot::new());
        let pools = Arc::new(SubscriberPools::new());
        let dispatcher = Arc::new(Dispatcher::new(slot.clone(), pools.clone()));
        let handle = Arc::new(ReaderHandle::new());
        let disconnected = Arc::new(AtomicUsize::new(0));
        let disconnected2 = disconnected.clone();

        link.push_inbound(&codec.encode(&Message::HeartbeatResponse));

        let mut reader = FrameReader::spawn(
            link.clone(),
            codec,
            dispatcher,
            pools,
            handle,
            Arc::new(move || {
                disconnected2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let got = slot.wait_timeout(Duration::from_millis(500));
        assert_eq!(got, Some(Message::HeartbeatResponse));

        reader.request_stop();
        link.close().unwrap();
        reader.join(Duration::from_secs(1));
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
    }
}
