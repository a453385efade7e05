// ABOUTME: Registry of inbound message handlers
// ABOUTME: Ordered, identity-keyed, and snapshotted per dispatch pass

use crate::protocol::messages::Envelope;
use std::sync::Arc;

/// Inbound message handler
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Opaque identity of a registered handler
///
/// Ids are never reused, so removing a stale id is a harmless no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Handlers in registration order
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: u64,
    entries: Vec<(HandlerId, Handler)>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, handler: Handler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.entries.push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Handlers to invoke for one message
    ///
    /// Changes made while the snapshot is being dispatched take effect from
    /// the next message on.
    pub(crate) fn snapshot(&self) -> Vec<Handler> {
        self.entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
