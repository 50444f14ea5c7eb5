//! Local monotonic id allocation.
//!
//! Durable identity (frame/segment primary keys) comes from SQLite's
//! `INTEGER PRIMARY KEY AUTOINCREMENT`, via `screensearch-db::Catalog`.
//! `IdAllocator` is for identifiers that need to exist before a row does -
//! pixel-cache keys, tile fingerprints handed between `ScreenSource` and
//! `TextExtractor` within a single process lifetime.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI64::new(1),
        })
    }

    pub fn starting_at(first: i64) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI64::new(first),
        })
    }

    pub fn allocate(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_strictly_increasing() {
        let alloc = IdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let c = alloc.allocate();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn starting_at_respects_the_given_floor() {
        let alloc = IdAllocator::starting_at(100);
        assert_eq!(alloc.allocate(), 100);
        assert_eq!(alloc.allocate(), 101);
    }
}
