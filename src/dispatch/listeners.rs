//! Event listener registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::{Event, EventType};

/// A registered event callback
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners grouped by event type, in registration order
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    by_type: HashMap<EventType, Vec<(ListenerId, Listener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener under the normalized form of `event_type`
    pub fn register(&mut self, event_type: EventType, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_type
            .entry(event_type.normalized())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener; false if it was not registered
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let mut emptied = None;
        let mut found = false;

        for (event_type, listeners) in self.by_type.iter_mut() {
            if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(pos);
                found = true;
                if listeners.is_empty() {
                    emptied = Some(event_type.clone());
                }
                break;
            }
        }

        if let Some(event_type) = emptied {
            self.by_type.remove(&event_type);
        }
        found
    }

    /// Listeners for `event_type` as of now
    pub fn snapshot(&self, event_type: &EventType) -> Vec<Listener> {
        self.by_type
            .get(event_type)
            .map(|listeners| listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    /// Total number of registered listeners
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
