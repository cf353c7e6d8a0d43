//! The single-response rendezvous between the sender and the dispatcher.
//!
//! Not a queue: only the sender clears it (immediately before writing), only
//! the dispatcher sets it (on the first response the reader decodes), and
//! only the sender reads it (once, after its wait returns). A response that
//! arrives with no armed waiter is still fanned out to response subscribers
//! by the dispatcher, but is never picked up here.

use crate::codec::Message;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct ResponseSlot {
    slot: Mutex<Option<Message>>,
    ready: Condvar,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Clears any stale value. Called by the sender immediately before it
    /// writes, so a late response from a prior, abandoned wait can never be
    /// mistaken for the next one.
    pub fn clear(&self) {
        *self.slot.lock().unwrap() = None;
    }

    /// Called by the dispatcher when a response-typed message is decoded.
    pub fn set(&self, msg: Message) {
        *self.slot.lock().unwrap() = Some(msg);
        self.ready.notify_all();
    }

    /// Waits up to `timeout` for a response to arrive, returning it if one
    /// did. Guards against spurious wakeups by re-checking the slot itself
    /// rather than trusting the wait's return value.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Message> {
        let mut guard = self.slot.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = guard.take() {
                return Some(msg);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next_guard, result) = self.ready.wait_timeout(guard, deadline - now).unwrap();
            guard = next_guard;
            if result.timed_out() && guard.is_none() {
                return None;
            }
        }
    }
}

impl Default for ResponseSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_times_out_with_nothing_set() {
        let slot = ResponseSlot::new();
        assert_eq!(slot.wait_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn set_before_wait_is_observed_immediately() {
        let slot = ResponseSlot::new();
        slot.set(Message::HeartbeatResponse);
        assert_eq!(
            slot.wait_timeout(Duration::from_millis(20)),
            Some(Message::HeartbeatResponse)
        );
    }

    #[test]
    fn set_from_another_thread_wakes_the_waiter() {
        let slot = Arc::new(ResponseSlot::new());
        let setter = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.set(Message::HeartbeatResponse);
            })
        };
        let got = slot.wait_timeout(Duration::from_secs(2));
        setter.join().unwrap();
        assert_eq!(got, Some(Message::HeartbeatResponse));
    }

    #[test]
    fn clear_discards_a_stale_value() {
        let slot = ResponseSlot::new();
        slot.set(Message::HeartbeatResponse);
        slot.clear();
        assert_eq!(slot.wait_timeout(Duration::from_millis(20)), None);
    }
}
