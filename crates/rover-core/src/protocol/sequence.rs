//! Request identifiers for control-channel correlation.
//!
//! Every command a client sends carries a numeric `id`.  A server that echoes
//! the id lets the client match an answer to its request even when several
//! requests are in flight; a server that does not echo it is still served by
//! the FIFO fallback in the handshake session.
//!
//! Ids start at 1 so that `0` never appears on the wire and can be read as
//! "unset" by lenient servers.

use std::num::NonZeroU64;

/// A monotonically increasing source of request ids, one per session.
#[derive(Debug)]
pub struct RequestIdCounter {
    next: NonZeroU64,
}

impl RequestIdCounter {
    /// Creates a counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: NonZeroU64::MIN,
        }
    }

    /// Returns the next id and advances the counter.
    ///
    /// Wraps from `u64::MAX` back to 1, skipping 0.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next.get();
        self.next = NonZeroU64::new(id.wrapping_add(1)).unwrap_or(NonZeroU64::MIN);
        id
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
