//! Injected monotonic sequence numbers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of unique, monotonically increasing sequence numbers.
pub trait SequenceSource: Send + Sync + fmt::Debug {
    /// Next unused sequence number.
    fn next(&self) -> u64;
}

/// Lock-free counter shared by a directory and every resource it creates.
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    /// Start counting at `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Peek at the value the next call will return.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl SequenceSource for SequenceGenerator {
    fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}
