//! Identifier generation
//!
//! Node, entity and component identifiers come from per-scene generators.
//! Generators are atomic so that objects may be created on worker threads
//! (for example while an asynchronous load completes) and handed back to the
//! main thread later.

use std::sync::atomic::{AtomicU64, Ordering};

/// Reserved value that is never handed out by a generator
const INVALID_ID: u64 = 0;

/// Thread-safe monotonically increasing 64-bit id source
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator whose first id is 1
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(INVALID_ID + 1),
        }
    }

    /// Hand out the next id
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
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
    fn test_ids_are_unique_and_valid() {
        let generator = IdGenerator::new();
        let a = generator.next_id();
        let b = generator.next_id();
        assert_ne!(a, INVALID_ID);
        assert_ne!(a, b);
    }

    #[test]
    fn test_concurrent_generation() {
        let generator = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || (0..250).map(|_| generator.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
