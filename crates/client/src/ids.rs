//! Query id allocation.

use std::sync::atomic::{AtomicU32, Ordering};

use protocol::QueryId;

/// Hands out query ids, starting at 1 and increasing by one per query.
///
/// Owned by a single [`crate::Client`]; two outstanding queries from the same
/// client never share an id.
#[derive(Debug)]
pub struct QueryIdAllocator {
    next: AtomicU32,
}

impl Default for QueryIdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }
}

impl QueryIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> QueryId {
        QueryId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
