//! Request id counter.
//!
//! # What is a correlation id? (for beginners)
//!
//! Many requests can be in flight on the same socket at once, and the server
//! may answer them in any order.  Each request therefore carries an id that
//! the server echoes back, and the client uses it to find which caller is
//! waiting for that particular answer.
//!
//! Ids only have to be unique among requests that are *still waiting*.  The
//! counter increases by one per request and, in the practically unreachable
//! case that it runs past [`RequestId::MAX`], wraps back to `1` and skips any
//! id that is still pending.
//!
//! # Ownership
//!
//! The counter is owned by the single task that also owns the pending request
//! table, so it is a plain integer rather than an atomic.

use crate::protocol::envelope::RequestId;

/// Monotonically increasing request id counter.
///
/// # Examples
///
/// ```rust
/// use rproxy_core::protocol::SequenceCounter;
///
/// let mut counter = SequenceCounter::new();
/// assert_eq!(counter.next().get(), 1);
/// assert_eq!(counter.next().get(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SequenceCounter {
    /// The last id handed out, or `0` before the first call.
    last: u64,
}

impl SequenceCounter {
    /// Creates a new counter whose first id is `1`.
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Returns the next id, wrapping from [`RequestId::MAX`] to `1`.
    pub fn next(&mut self) -> RequestId {
        let next = match RequestId::new(self.last) {
            Some(last) => last.successor(),
            None => RequestId::FIRST,
        };
        self.last = next.get();
        next
    }

    /// Returns the next id for which `in_use` is `false`.
    ///
    /// `in_use` is asked about each candidate in order; only ids that are
    /// still awaiting a response should report `true`.
    pub fn next_unused(&mut self, mut in_use: impl FnMut(RequestId) -> bool) -> RequestId {
        loop {
            let candidate = self.next();
            if !in_use(candidate) {
                return candidate;
            }
        }
    }
}
