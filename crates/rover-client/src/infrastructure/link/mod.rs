//! Link adapters: concrete [`WireLink`] implementations.
//!
//! - **`websocket`** – the production adapter, one WebSocket connection per
//!   link, driven by a reader task and a writer task.
//! - **`memory`** – an in-process link that records what was sent.  Used by
//!   tests and by anything that wants to script a server.

pub mod memory;
pub mod websocket;

pub use crate::application::wire_link::{LinkError, LinkEvent, WireLink};
pub use memory::MemoryLink;
pub use websocket::{connect, WebSocketLink};
