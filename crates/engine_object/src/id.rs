//! GameObject identity.
//!
//! A [`GameObjectId`] is a process-unique `u64`. Ids are handed out in
//! increasing order, so containers keyed by id iterate in creation order.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A unique game object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameObjectId(pub u64);

impl GameObjectId {
    /// The null / invalid id sentinel.
    pub const INVALID: GameObjectId = GameObjectId(0);

    /// Create an id from a raw `u64`.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for GameObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocates monotonically increasing ids. Lock-free; safe to share.
#[derive(Debug)]
pub struct IdAllocator {
    next_id: AtomicU64,
}

impl IdAllocator {
    /// Creates a new allocator. Ids start at 1 (0 is [`GameObjectId::INVALID`]).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh id.
    pub fn allocate(&self) -> GameObjectId {
        GameObjectId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the number of ids allocated so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

static OBJECT_IDS: IdAllocator = IdAllocator::new();

pub(crate) fn next_object_id() -> GameObjectId {
    OBJECT_IDS.allocate()
}
