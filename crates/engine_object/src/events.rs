//! Add/remove notifications emitted by the scheduler.

use std::fmt;

use parking_lot::Mutex;

use crate::game_object::GameObject;

/// A transition of an object into or out of the active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    /// The object was activated and inserted into the active set.
    Added(GameObject),
    /// The object was destroyed and removed from the active set.
    Removed(GameObject),
}

impl ObjectEvent {
    /// The object the event refers to.
    #[must_use]
    pub fn object(&self) -> &GameObject {
        match self {
            ObjectEvent::Added(object) | ObjectEvent::Removed(object) => object,
        }
    }

    /// Returns `true` for [`ObjectEvent::Added`].
    #[must_use]
    pub fn is_added(&self) -> bool {
        matches!(self, ObjectEvent::Added(_))
    }
}

impl fmt::Display for ObjectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectEvent::Added(object) => write!(f, "added {object}"),
            ObjectEvent::Removed(object) => write!(f, "removed {object}"),
        }
    }
}

/// Receives [`ObjectEvent`]s, once per transition, on the simulation thread.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &ObjectEvent);
}

impl<F> EventSink for F
where
    F: Fn(&ObjectEvent) + Send + Sync,
{
    fn notify(&self, event: &ObjectEvent) {
        self(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn notify(&self, _event: &ObjectEvent) {}
}

/// Records events in arrival order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<ObjectEvent>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<ObjectEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Number of recorded `Added` and `Removed` events.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let events = self.events.lock();
        let added = events.iter().filter(|event| event.is_added()).count();
        (added, events.len() - added)
    }
}

impl EventSink for EventLog {
    fn notify(&self, event: &ObjectEvent) {
        self.events.lock().push(event.clone());
    }
}
