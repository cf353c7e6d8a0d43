//! Subscriber capabilities and the single-worker lane that delivers to them.
//!
//! Three independent lanes (notification, response, bulk-progress),
//! each a single background worker so callbacks within one lane run strictly
//! in submission order, while the lanes themselves run in parallel. A lane
//! is a minimal, special-purpose single-worker executor, queue plus one
//! dedicated thread.

use crate::codec::Message;
use crate::Error;
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::thread::{self, JoinHandle};

/// Notified of unsolicited, device-initiated messages (`type < 0x80`).
pub trait MessageListener: Send + Sync {
    fn message_received(&self, msg: &Message);
}

/// Notified of every response message (`type >= 0x80`), independent of
/// whether a caller is currently waiting on it via `send_and_wait`.
pub trait ResponseListener: Send + Sync {
    fn response_received(&self, msg: &Message);
}

/// Notified when the link's connected state changes.
pub trait ConnectionListener: Send + Sync {
    fn on_connected(&self, connected: bool);
}

/// Progress reporting for an in-flight bulk file download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub bytes_received: u64,
    pub total_bytes: u64,
    pub kbps: f64,
}

pub trait BulkProgressListener: Send + Sync {
    fn on_progress(&self, _progress: Progress) {}
    fn on_complete(&self, _path: &std::path::Path, _kbps: f64) {}
    fn on_failed(&self, _err: &Error) {}
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single-worker FIFO execution lane. Submitting a job never blocks;
/// the worker thread drains the queue and runs jobs strictly in order.
pub struct Lane {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Lane {
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in rx {
                    // Subscriber callbacks must never be able to kill the
                    // lane; catch panics the same way a misbehaving
                    // listener's exception would be swallowed elsewhere.
                    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                    {
                        tracing::warn!(lane = name, ?panic, "listener callback panicked");
                    }
                }
            })
            .expect("failed to spawn lane worker thread");
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn submit(&self, job: Job) {
        // A send error (or an already-shut-down lane) means the job is
        // simply dropped, matching `ThreadPoolExecutor.shutdown(wait=False)`.
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(job);
        }
    }

    /// Drops the sending half so the worker's queue drains and it exits on
    /// its own; does not wait for already-queued jobs to run.
    pub fn shutdown(&self) {
        self.tx.lock().unwrap().take();
        drop(self.worker.lock().unwrap().take());
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        self.tx.get_mut().unwrap().take();
        // Detach rather than join: shutdown must not block on queued work.
        if let Some(handle) = self.worker.get_mut().unwrap().take() {
            drop(handle);
        }
    }
}

/// Owns the three subscriber lanes plus their append-only listener lists.
pub struct SubscriberPools {
    notification_lane: Lane,
    response_lane: Lane,
    bulk_progress_lane: Lane,
    message_listeners: std::sync::Mutex<Vec<std::sync::Arc<dyn MessageListener>>>,
    response_listeners: std::sync::Mutex<Vec<std::sync::Arc<dyn ResponseListener>>>,
    connection_listeners: std::sync::Mutex<Vec<std::sync::Arc<dyn ConnectionListener>>>,
    bulk_progress_listener: std::sync::Mutex<Option<std::sync::Arc<dyn BulkProgressListener>>>,
}

impl SubscriberPools {
    pub fn new() -> Self {
        Self {
            notification_lane: Lane::new("notification-pool"),
            response_lane: Lane::new("response-pool"),
            bulk_progress_lane: Lane::new("bulk-progress-pool"),
            message_listeners: std::sync::Mutex::new(Vec::new()),
            response_listeners: std::sync::Mutex::new(Vec::new()),
            connection_listeners: std::sync::Mutex::new(Vec::new()),
            bulk_progress_listener: std::sync::Mutex::new(None),
        }
    }

    pub fn add_message_listener(&self, listener: std::sync::Arc<dyn MessageListener>) {
        self.message_listeners.lock().unwrap().push(listener);
    }

    pub fn add_response_listener(&self, listener: std::sync::Arc<dyn ResponseListener>) {
        self.response_listeners.lock().unwrap().push(listener);
    }

    pub fn add_connection_listener(&self, listener: std::sync::Arc<dyn ConnectionListener>) {
        self.connection_listeners.lock().unwrap().push(listener);
    }

    pub fn set_bulk_progress_listener(&self, listener: std::sync::Arc<dyn BulkProgressListener>) {
        *self.bulk_progress_listener.lock().unwrap() = Some(listener);
    }

    pub fn notify_message(&self, msg: Message) {
        let listeners = self.message_listeners.lock().unwrap().clone();
        let msg = std::sync::Arc::new(msg);
        for listener in listeners {
            let msg = msg.clone();
            self.notification_lane
                .submit(Box::new(move || listener.message_received(&msg)));
        }
    }

    pub fn notify_response(&self, msg: Message) {
        let listeners = self.response_listeners.lock().unwrap().clone();
        let msg = std::sync::Arc::new(msg);
        for listener in listeners {
            let msg = msg.clone();
            self.response_lane
                .submit(Box::new(move || listener.response_received(&msg)));
        }
    }

    pub fn notify_connected(&self, connected: bool) {
        let listeners = self.connection_listeners.lock().unwrap().clone();
        for listener in listeners {
            self.notification_lane
                .submit(Box::new(move || listener.on_connected(connected)));
        }
    }

    pub fn notify_progress(&self, progress: Progress) {
        if let Some(listener) = self.bulk_progress_listener.lock().unwrap().clone() {
            self.bulk_progress_lane
                .submit(Box::new(move || listener.on_progress(progress)));
        }
    }

    pub fn notify_complete(&self, path: PathBuf, kbps: f64) {
        if let Some(listener) = self.bulk_progress_listener.lock().unwrap().clone() {
            self.bulk_progress_lane
                .submit(Box::new(move || listener.on_complete(&path, kbps)));
        }
    }

    pub fn notify_failed(&self, err: Error) {
        if let Some(listener) = self.bulk_progress_listener.lock().unwrap().clone() {
            self.bulk_progress_lane
                .submit(Box::new(move || listener.on_failed(&err)));
        }
    }

    /// Stops all three lanes without waiting for already-queued jobs to run.
    pub fn shutdown(&self) {
        self.notification_lane.shutdown();
        self.response_lane.shutdown();
        self.bulk_progress_lane.shutdown();
    }
}

impl Default for SubscriberPools {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingListener(Arc<AtomicUsize>, Duration);
    impl MessageListener for CountingListener {
        fn message_received(&self, _msg: &Message) {
            std::thread::sleep(self.1);
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn lane_delivers_serially_in_submission_order() {
        let pools = SubscriberPools::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..5u32 {
            let order = order.clone();
            pools.add_message_listener(Arc::new(OrderRecorder(order, i)));
        }
        pools.notify_message(Message::Heartbeat);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    struct OrderRecorder(Arc<std::sync::Mutex<Vec<u32>>>, u32);
    impl MessageListener for OrderRecorder {
        fn message_received(&self, _msg: &Message) {
            self.0.lock().unwrap().push(self.1);
        }
    }

    #[test]
    fn slow_notification_listener_does_not_block_response_lane() {
        let pools = Arc::new(SubscriberPools::new());
        let notif_count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            pools.add_message_listener(Arc::new(CountingListener(
                notif_count.clone(),
                Duration::from_millis(50),
            )));
        }
        pools.notify_message(Message::Heartbeat);

        let resp_count = Arc::new(AtomicUsize::new(0));
        pools.add_response_listener(Arc::new(RespCounter(resp_count.clone())));
        let start = std::time::Instant::now();
        pools.notify_response(Message::HeartbeatResponse);
        // Give the response lane a moment to run; it should not be
        // serialized behind the slow notification lane.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(resp_count.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    struct RespCounter(Arc<AtomicUsize>);
    impl ResponseListener for RespCounter {
        fn response_received(&self, _msg: &Message) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingListener;
    impl MessageListener for PanickingListener {
        fn message_received(&self, _msg: &Message) {
            panic!("boom");
        }
    }

    #[test]
    fn panicking_listener_does_not_kill_the_lane() {
        let pools = SubscriberPools::new();
        pools.add_message_listener(Arc::new(PanickingListener));
        let count = Arc::new(AtomicUsize::new(0));
        pools.add_message_listener(Arc::new(CountingListener(count.clone(), Duration::ZERO)));
        pools.notify_message(Message::Heartbeat);
        pools.notify_message(Message::Heartbeat);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_stops_notifications_from_being_delivered() {
        let pools = SubscriberPools::new();
        let count = Arc::new(AtomicUsize::new(0));
        pools.add_message_listener(Arc::new(CountingListener(count.clone(), Duration::ZERO)));
        pools.shutdown();
        std::thread::sleep(Duration::from_millis(20));
        pools.notify_message(Message::Heartbeat);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
