// file: src/subscribers.rs
// description: observer list for channel messages with snapshot-before-invoke delivery

use crate::message::ChannelMessage;
use parking_lot::Mutex;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

pub type MessageHandler = Arc<dyn Fn(&ChannelMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriberId, MessageHandler)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: MessageHandler) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, handler));
        id
    }

    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Handlers registered right now. Delivery iterates this copy so handlers may
    /// subscribe or unsubscribe while being invoked.
    pub fn snapshot(&self) -> Vec<MessageHandler> {
        self.handlers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registration handle returned by [`LiveChannel::subscribe`](crate::channel::LiveChannel::subscribe).
///
/// The handler stays registered until [`Subscription::unsubscribe`] is called or the
/// handle is dropped.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, registry: &Arc<SubscriberRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
