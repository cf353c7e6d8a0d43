//! Routes a decoded [`Message`] to the response slot or the notification pool.

use crate::codec::Message;
use crate::core::pools::SubscriberPools;
use crate::core::response_slot::ResponseSlot;
use std::sync::Arc;

pub struct Dispatcher {
    response_slot: Arc<ResponseSlot>,
    pools: Arc<SubscriberPools>,
}

impl Dispatcher {
    pub fn new(response_slot: Arc<ResponseSlot>, pools: Arc<SubscriberPools>) -> Self {
        Self {
            response_slot,
            pools,
        }
    }

    /// Called by the frame reader for every message it decodes.
    pub fn dispatch(&self, msg: Message) {
        if msg.is_response() {
            // Synchronous: arm the waiter before fanning out to subscribers,
            // so lane queue depth never adds latency to a blocked sender.
            self.response_slot.set(msg.clone());
            self.pools.notify_response(msg);
        } else {
            self.pools.notify_message(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pools::{Progress, ResponseListener};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counter(Arc<AtomicUsize>);
    impl ResponseListener for Counter {
        fn response_received(&self, _msg: &Message) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn response_arms_slot_and_notifies_response_pool() {
        let slot = Arc::new(ResponseSlot::new());
        let pools = Arc::new(SubscriberPools::new());
        let count = Arc::new(AtomicUsize::new(0));
        pools.add_response_listener(Arc::new(Counter(count.clone())));
        let dispatcher = Dispatcher::new(slot.clone(), pools);

        dispatcher.dispatch(Message::HeartbeatResponse);

        assert_eq!(
            slot.wait_timeout(Duration::from_millis(20)),
            Some(Message::HeartbeatResponse)
        );
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notification_does_not_touch_response_slot() {
        let slot = Arc::new(ResponseSlot::new());
        let pools = Arc::new(SubscriberPools::new());
        let dispatcher = Dispatcher::new(slot.clone(), pools);

        dispatcher.dispatch(Message::SendFile {
            name: "a".into(),
            size: 1,
        });

        assert_eq!(slot.wait_timeout(Duration::from_millis(20)), None);
    }

    #[allow(dead_code)]
    fn _progress_type_is_usable(_p: Progress) {}
}
