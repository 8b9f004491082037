//! The duplex message channel abstraction both links are built on.
//!
//! A `WireLink` only *sends*.  Inbound traffic arrives as [`LinkEvent`]s that
//! the link adapter delivers to whoever owns the session (in the binary, an
//! mpsc channel drained by the main loop).  Keeping the two directions apart
//! lets the state machines stay synchronous and I/O free.

use thiserror::Error;

/// Something that happened on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The underlying connection is established; sends will now be accepted.
    Opened,
    /// One complete inbound message.
    Message(Vec<u8>),
    /// The peer closed the connection.
    Closed,
    /// The connection failed.
    Error(String),
}

/// Error type for link operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The link has not finished opening.
    #[error("link is not open")]
    NotOpen,

    /// The link was closed by either side.
    #[error("link is closed")]
    Closed,

    /// The connection could not be established.
    #[error("failed to connect: {0}")]
    Connect(String),
}

/// Send half of a message channel to one endpoint.
///
/// `send` must not block: adapters queue the bytes and return immediately.
pub trait WireLink: Send {
    /// `true` once the link is open and until it is closed.
    fn is_open(&self) -> bool;

    /// Queues one complete message.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotOpen`] before the link opened and
    /// [`LinkError::Closed`] after it closed.
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), LinkError>;

    /// Closes the link.  Closing twice is a no-op.
    fn close(&mut self);
}
