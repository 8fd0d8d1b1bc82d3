//! Request identifiers for host-initiated relay calls.
//!
//! # Why request ids? (for beginners)
//!
//! The host may have more than one call in flight towards the browser peer.
//! When a reply comes back, the relay must know *which* caller it belongs to.
//! Stamping every outgoing request with a unique, increasing number lets a
//! peer that echoes the number back route its reply to exactly one waiter,
//! and lets the relay fall back to "oldest outstanding call first" when the
//! peer does not echo anything.
//!
//! # Thread safety
//!
//! The counter is a single `AtomicU64`.  `fetch_add` reads and bumps the value
//! in one indivisible step, so concurrent callers never receive the same id.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free, monotonically increasing source of request ids.
///
/// Ids start at 1 so that `0` never appears on the wire; a peer written in a
/// language with loose truthiness rules cannot mistake a real id for "absent".
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::RequestIdCounter;
///
/// let ids = RequestIdCounter::new();
/// assert_eq!(ids.next_id(), 1);
/// assert_eq!(ids.next_id(), 2);
/// ```
#[derive(Debug)]
pub struct RequestIdCounter {
    inner: AtomicU64,
}

impl RequestIdCounter {
    /// Creates a counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id and advances the counter.
    ///
    /// Wraps from `u64::MAX` back to 1 without panicking, skipping 0; at one
    /// call per nanosecond that takes several centuries.
    pub fn next_id(&self) -> u64 {
        // `Relaxed` is enough: ids only need to be unique, they do not order
        // any other memory accesses.
        loop {
            let id = self.inner.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for RequestIdCounter {
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
    fn test_first_request_id_is_one() {
        // Arrange
        let ids = RequestIdCounter::new();

        // Act
        let first = ids.next_id();

        // Assert
        assert_eq!(first, 1);
    }

    #[test]
    fn test_request_ids_are_strictly_increasing() {
        let ids = RequestIdCounter::new();
        let values: Vec<u64> = (0..50).map(|_| ids.next_id()).collect();
        assert!(values.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_request_id_wraps_past_zero_without_panicking() {
        // Arrange – one step before overflow
        let ids = RequestIdCounter {
            inner: AtomicU64::new(u64::MAX),
        };

        // Act
        let last = ids.next_id();
        let wrapped = ids.next_id();

        // Assert
        assert_eq!(last, u64::MAX);
        assert_eq!(wrapped, 1);
    }

    #[test]
    fn test_request_ids_are_unique_across_threads() {
        // Arrange
        let ids = Arc::new(RequestIdCounter::new());

        // Act – four threads draw ids concurrently
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert – no duplicates
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }
}
