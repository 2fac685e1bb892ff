//! Session events and the bus that delivers them.
//!
//! Listeners are registered explicitly on the session's [`EventBus`] and
//! removed with the [`SubscriptionId`] handed back at registration. Delivery
//! is synchronous and in registration order.

use crate::authority::TargetId;
use crate::content::ContentHandle;

/// Something observable happened in a session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Content was created under the first detected target.
    ContentInstantiated {
        /// Registry handle of the new instance.
        content: ContentHandle,
        /// Target it was created under.
        parent: TargetId,
    },
    /// A different target became authoritative.
    AuthorityChanged {
        /// New authority.
        target: TargetId,
        /// Reference image name of the new authority.
        reference_name: String,
    },
    /// Content settled and was re-parented onto the session origin.
    ContentDetached {
        /// Registry handle of the detached instance.
        content: ContentHandle,
    },
}

/// Token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&SessionEvent)>;

/// Synchronous, single-threaded event fan-out.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&SessionEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver `event` to every listener. No listeners is fine.
    pub fn publish(&mut self, event: &SessionEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }
}
