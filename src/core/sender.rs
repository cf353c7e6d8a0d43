//! Single-writer send path: one worker, one write in flight, and the
//! clear→write→wait discipline that pairs a caller with its response.

use crate::codec::{Codec, Message};
use crate::config::COMPLETION_GRACE;
use crate::core::response_slot::ResponseSlot;
use crate::transport::Link;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Sender {
    link: Arc<dyn Link>,
    codec: Arc<dyn Codec>,
    response_slot: Arc<ResponseSlot>,
    tx: Option<mpsc::Sender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Sender {
    pub fn new(link: Arc<dyn Link>, codec: Arc<dyn Codec>, response_slot: Arc<ResponseSlot>) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("sender-worker".to_string())
            .spawn(move || {
                for job in rx {
                    job();
                }
            })
            .expect("failed to spawn sender worker thread");
        Self {
            link,
            codec,
            response_slot,
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Enqueues `msg` for writing and returns immediately.
    pub fn send_async(&self, msg: Message) {
        let Some(tx) = &self.tx else { return };
        let link = self.link.clone();
        let codec = self.codec.clone();
        let _ = tx.send(Box::new(move || {
            if !link.is_open() {
                return;
            }
            let frame = codec.encode(&msg);
            if let Err(err) = link.write_all(&frame) {
                tracing::warn!(?err, "send_async write failed");
            }
        }));
    }

    /// Writes `msg` and waits up to `timeout` for the next response. Returns
    /// `None` on disconnect, write failure, timeout, or a shut-down sender —
    /// the caller cannot distinguish these by design.
    pub fn send_and_wait(&self, msg: Message, timeout: Duration) -> Option<Message> {
        let Some(tx) = &self.tx else { return None };
        let link = self.link.clone();
        let codec = self.codec.clone();
        let response_slot = self.response_slot.clone();
        let (result_tx, result_rx) = mpsc::channel();

        let submitted = tx.send(Box::new(move || {
            let outcome = Self::clear_write_wait(&link, &codec, &response_slot, msg, timeout);
            let _ = result_tx.send(outcome);
        }));
        if submitted.is_err() {
            return None;
        }

        result_rx.recv_timeout(timeout + COMPLETION_GRACE).ok().flatten()
    }

    fn clear_write_wait(
        link: &Arc<dyn Link>,
        codec: &Arc<dyn Codec>,
        response_slot: &Arc<ResponseSlot>,
        msg: Message,
        timeout: Duration,
    ) -> Option<Message> {
        if !link.is_open() {
            return None;
        }
        response_slot.clear();
        let frame = codec.encode(&msg);
        if let Err(err) = link.write_all(&frame) {
            tracing::warn!(?err, "send_and_wait write failed");
            return None;
        }
        response_slot.wait_timeout(timeout)
    }

    /// Drops the queue sender so the worker observes a closed channel,
    /// drains what's already queued, and exits on its own; does not wait
    /// for already-queued sends to complete.
    pub fn shutdown(&mut self) {
        self.tx.take();
        self.worker.take();
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.worker.take() {
            drop(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeviceCodec;
    use crate::transport::MockLink;
    use std::time::Duration;

    fn sender_over_mock() -> (Sender, Arc<MockLink>, Arc<ResponseSlot>) {
        let link = Arc::new(MockLink::new());
        let slot = Arc::new(ResponseSlot::new());
        let sender = Sender::new(link.clone(), Arc::new(DeviceCodec), slot.clone());
        (sender, link, slot)
    }

    #[test]
    fn send_and_wait_times_out_with_no_response() {
        let (sender, _link, _slot) = sender_over_mock();
        let got = sender.send_and_wait(Message::Heartbeat, Duration::from_millis(30));
        assert_eq!(got, None);
    }

    #[test]
    fn send_and_wait_returns_the_response_set_concurrently() {
        let (sender, link, slot) = sender_over_mock();
        let slot2 = slot.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            slot2.set(Message::HeartbeatResponse);
        });
        let got = sender.send_and_wait(Message::Heartbeat, Duration::from_secs(1));
        assert_eq!(got, Some(Message::HeartbeatResponse));
        assert!(!link.written().is_empty());
    }

    #[test]
    fn send_async_writes_without_blocking() {
        let (sender, link, _slot) = sender_over_mock();
        sender.send_async(Message::Heartbeat);
        std::thread::sleep(Duration::from_millis(50));
        assert!(!link.written().is_empty());
    }

    #[test]
    fn send_and_wait_on_closed_link_returns_none() {
        let (sender, link, _slot) = sender_over_mock();
        link.close().unwrap();
        let got = sender.send_and_wait(Message::Heartbeat, Duration::from_millis(50));
        assert_eq!(got, None);
    }

    #[test]
    fn shutdown_closes_the_queue_so_later_sends_are_no_ops() {
        let (mut sender, link, _slot) = sender_over_mock();
        sender.shutdown();
        sender.send_async(Message::Heartbeat);
        let got = sender.send_and_wait(Message::Heartbeat, Duration::from_millis(50));
        assert_eq!(got, None);
        assert!(link.written().is_empty());
    }
}
