//! Wires the reader, dispatcher, sender, and subscriber pools into a single
//! running link, and owns idempotent startup/shutdown.

use crate::codec::{Codec, DeviceCodec, Message};
use crate::config::{DownloadOptions, DEFAULT_SEND_TIMEOUT};
use crate::core::bulk::FileSession;
use crate::core::dispatcher::Dispatcher;
use crate::core::frame_reader::{FrameReader, ReaderHandle};
use crate::core::pools::{
    BulkProgressListener, ConnectionListener, MessageListener, ResponseListener, SubscriberPools,
};
use crate::core::response_slot::ResponseSlot;
use crate::core::sender::Sender;
use crate::transport::Link;
use crate::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A running link to the device: one link-layer connection, its reader
/// thread, sender worker, and subscriber pools.
pub struct LinkCore {
    link: Arc<dyn Link>,
    sender: Mutex<Sender>,
    pools: Arc<SubscriberPools>,
    reader_handle: Arc<ReaderHandle>,
    reader: Mutex<Option<FrameReader>>,
    shutdown_latch: AtomicBool,
    connected: AtomicBool,
}

impl LinkCore {
    /// Starts a link over an already-open [`Link`], using the device's
    /// concrete wire codec. Spawns the reader thread immediately.
    pub fn start(link: Arc<dyn Link>) -> Arc<Self> {
        Self::start_with_codec(link, Arc::new(DeviceCodec))
    }

    pub fn start_with_codec(link: Arc<dyn Link>, codec: Arc<dyn Codec>) -> Arc<Self> {
        let response_slot = Arc::new(ResponseSlot::new());
        let pools = Arc::new(SubscriberPools::new());
        let dispatcher = Arc::new(Dispatcher::new(response_slot.clone(), pools.clone()));
        let sender = Sender::new(link.clone(), codec.clone(), response_slot);
        let reader_handle = Arc::new(ReaderHandle::new());

        let core = Arc::new(Self {
            link: link.clone(),
            sender: Mutex::new(sender),
            pools: pools.clone(),
            reader_handle: reader_handle.clone(),
            reader: Mutex::new(None),
            shutdown_latch: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        });

        let core_for_disconnect = core.clone();
        let reader = FrameReader::spawn(
            link,
            codec,
            dispatcher,
            pools,
            reader_handle,
            Arc::new(move || core_for_disconnect.on_reader_exit()),
        );
        *core.reader.lock().unwrap() = Some(reader);
        core
    }

    fn on_reader_exit(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && self.link.is_open()
    }

    pub fn send_async(&self, msg: Message) {
        self.sender.lock().unwrap().send_async(msg);
    }

    pub fn send(&self, msg: Message, timeout: Duration) -> Option<Message> {
        self.sender.lock().unwrap().send_and_wait(msg, timeout)
    }

    /// Sends `msg` using [`crate::config::DEFAULT_SEND_TIMEOUT`].
    pub fn send_default(&self, msg: Message) -> Option<Message> {
        self.send(msg, DEFAULT_SEND_TIMEOUT)
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.pools.add_message_listener(listener);
    }

    pub fn add_response_listener(&self, listener: Arc<dyn ResponseListener>) {
        self.pools.add_response_listener(listener);
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.pools.add_connection_listener(listener);
    }

    pub fn set_bulk_progress_listener(&self, listener: Arc<dyn BulkProgressListener>) {
        self.pools.set_bulk_progress_listener(listener);
    }

    /// Downloads a file of `size` bytes announced by a prior `GetFileUart`
    /// request. `size = 0` short-circuits without touching the link or the
    /// reader.
    pub fn download_file(
        &self,
        name: &str,
        size: u64,
        opts: DownloadOptions,
    ) -> Result<(PathBuf, f64), Error> {
        if size == 0 {
            let path = crate::core::bulk::empty_artifact()?;
            return Ok((path, 0.0));
        }
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let session = FileSession {
            size,
            timeout: opts.timeout,
            delay: opts.inter_chunk_delay,
        };
        if !self.reader_handle.try_enter_bulk(session) {
            return Err(Error::FileSessionBusy);
        }

        self.send_async(Message::GetFileUart {
            name: name.to_string(),
        });

        self.reader_handle
            .completion
            .wait_timeout(opts.timeout + crate::config::COMPLETION_GRACE)
    }

    /// Idempotent shutdown: closes the link (unblocking the reader), stops
    /// the reader, and tears down the sender and pools without waiting for
    /// queued work.
    pub fn shutdown(&self) {
        if self.shutdown_latch.swap(true, Ordering::AcqRel) {
            return;
        }
        self.connected.store(false, Ordering::Release);
        if let Some(reader) = self.reader.lock().unwrap().as_ref() {
            reader.request_stop();
        }
        let _ = self.link.cancel_read();
        let _ = self.link.close();
        if let Some(mut reader) = self.reader.lock().unwrap().take() {
            reader.join(Duration::from_secs(2));
        }
        self.sender.lock().unwrap().shutdown();
        self.pools.shutdown();
    }
}

impl Drop for LinkCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeviceCodec;
    use crate::transport::MockLink;

    #[test]
    fn send_and_wait_round_trips_over_a_mock_link() {
        let link = Arc::new(MockLink::new());
        let codec: Arc<dyn Codec> = Arc::new(DeviceCodec);
        link.push_inbound(&codec.encode(&Message::HeartbeatResponse));
        let core = LinkCore::start(link);

        let response = core.send(Message::Heartbeat, Duration::from_secs(1));
        assert_eq!(response, Some(Message::HeartbeatResponse));
        core.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let link = Arc::new(MockLink::new());
        let core = LinkCore::start(link);
        core.shutdown();
        core.shutdown();
        assert!(!core.is_connected());
    }

    #[test]
    fn disconnect_is_observed_after_link_closes() {
        let link = Arc::new(MockLink::new());
        link.set_read_timeout(Duration::from_millis(20)).unwrap();
        let core = LinkCore::start(link.clone());
        link.close().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(!core.is_connected());
    }

    #[test]
    fn shutdown_tears_down_the_subscriber_pools() {
        use crate::core::pools::MessageListener;
        use std::sync::atomic::AtomicUsize;

        struct CountingListener(Arc<AtomicUsize>);
        impl MessageListener for CountingListener {
            fn message_received(&self, _msg: &Message) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let link = Arc::new(MockLink::new());
        let core = LinkCore::start(link);
        let count = Arc::new(AtomicUsize::new(0));
        core.add_message_listener(Arc::new(CountingListener(count.clone())));
        core.shutdown();
        std::thread::sleep(Duration::from_millis(20));

        core.pools.notify_message(Message::Heartbeat);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn second_concurrent_download_is_rejected_as_busy() {
        let link = Arc::new(MockLink::new());
        let core = LinkCore::start(link);
        let session = FileSession {
            size: 100,
            timeout: Duration::from_secs(5),
            delay: None,
        };
        assert!(core.reader_handle.try_enter_bulk(session.clone()));
        let err = core.download_file("f.bin", 10, DownloadOptions::default());
        assert!(matches!(err, Err(Error::FileSessionBusy)));
        core.shutdown();
    }
}
