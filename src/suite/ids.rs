//! Run-scoped identifier allocation

use std::sync::atomic::{AtomicU64, Ordering};

use crate::flow::FlowId;
use crate::request::RequestId;

/// Monotonic flow and request ids for one suite run.
///
/// Ids start at 1. Each engine owns its own generator, so independent runs
/// in the same process do not share a sequence.
#[derive(Debug)]
pub struct IdGenerator {
    next_flow: AtomicU64,
    next_request: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator whose first ids are 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_flow: AtomicU64::new(1),
            next_request: AtomicU64::new(1),
        }
    }

    /// Allocates the next flow id.
    pub fn next_flow(&self) -> FlowId {
        self.next_flow.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocates the next request id.
    pub fn next_request(&self) -> RequestId {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of flow ids handed out so far.
    #[must_use]
    pub fn flows_allocated(&self) -> u64 {
        self.next_flow.load(Ordering::Relaxed) - 1
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

    #[test]
    fn test_ids_are_monotonic_and_independent() {
        let a = IdGenerator::new();
        let b = IdGenerator::new();

        assert_eq!(a.next_flow(), 1);
        assert_eq!(a.next_flow(), 2);
        assert_eq!(a.next_request(), 1);
        assert_eq!(b.next_flow(), 1);
        assert_eq!(a.flows_allocated(), 2);
    }
}
