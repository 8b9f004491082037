//! In-memory link for tests and scripted servers.
//!
//! # Why a memory link?
//!
//! The session and the stream binder take ownership of their link as a
//! `Box<dyn WireLink>`.  A test still needs to see what was sent after the
//! link has been moved away, so `MemoryLink` keeps its state behind an
//! `Arc<Mutex<..>>` and every clone is a handle onto the same link.
//!
//! # Usage in tests
//!
//! ```ignore
//! let link = MemoryLink::opened();
//! session.start(Box::new(link.clone()))?;
//!
//! assert_eq!(link.sent_commands(), vec!["hello"]);
//! ```
//!
//! # `should_fail` flag
//!
//! Call [`MemoryLink::set_should_fail`] to make every `send` return
//! [`LinkError::Closed`] without recording anything.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::application::wire_link::{LinkError, WireLink};

#[derive(Debug, Default)]
struct MemoryState {
    open: bool,
    closed: bool,
    should_fail: bool,
    sent: Vec<Vec<u8>>,
}

/// A link that records sent frames instead of transmitting them.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink {
    /// A link that has not opened yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that is already open.
    pub fn opened() -> Self {
        let link = Self::new();
        link.set_open(true);
        link
    }

    pub fn set_open(&self, open: bool) {
        self.lock().open = open;
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.lock().should_fail = should_fail;
    }

    /// Every frame sent so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Sent frames parsed as JSON; frames that are not JSON are skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.lock()
            .sent
            .iter()
            .filter_map(|frame| serde_json::from_slice(frame).ok())
            .collect()
    }

    /// The `cmd` of every sent JSON frame.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|v| v.get("cmd").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// `true` once `close` was called.
    pub fn was_closed(&self) -> bool {
        self.lock().closed
    }

    /// Forgets recorded frames.
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the recorded frames.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WireLink for MemoryLink {
    fn is_open(&self) -> bool {
        let state = self.lock();
        state.open && !state.closed
    }

    fn send(&mut self, bytes: Vec<u8>) -> Result<(), LinkError> {
        let mut state = self.lock();
        if state.closed || state.should_fail {
            return Err(LinkError::Closed);
        }
        if !state.open {
            return Err(LinkError::NotOpen);
        }
        state.sent.push(bytes);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.open = false;
        state.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_open_is_not_open() {
        let mut link = MemoryLink::new();
        assert_eq!(link.send(b"{}".to_vec()), Err(LinkError::NotOpen));
        assert!(link.sent().is_empty());
    }

    #[test]
    fn test_clones_share_recorded_frames() {
        // Arrange
        let handle = MemoryLink::opened();
        let mut boxed: Box<dyn WireLink> = Box::new(handle.clone());

        // Act
        boxed.send(br#"{"id":1,"cmd":"hello"}"#.to_vec()).unwrap();
        boxed.send(b"not json".to_vec()).unwrap();

        // Assert
        assert_eq!(handle.sent().len(), 2);
        assert_eq!(handle.sent_commands(), vec!["hello"]);
    }

    #[test]
    fn test_close_is_terminal() {
        let handle = MemoryLink::opened();
        let mut link = handle.clone();
        link.close();
        link.close();
        assert!(handle.was_closed());
        assert!(!link.is_open());
        handle.set_open(true);
        assert_eq!(link.send(b"{}".to_vec()), Err(LinkError::Closed));
    }

    #[test]
    fn test_should_fail_rejects_sends() {
        let handle = MemoryLink::opened();
        handle.set_should_fail(true);
        let mut link = handle.clone();
        assert_eq!(link.send(b"{}".to_vec()), Err(LinkError::Closed));
        assert!(handle.sent().is_empty());
    }
}
