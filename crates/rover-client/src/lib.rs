//! rover-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does rover-client do? (for beginners)
//!
//! The client drives one rover at a time from a terminal.  It:
//!
//! 1. Opens the *control link* to the rover server and walks the
//!    hello → list → connect handshake until the session is bound to a rover.
//! 2. Opens the *stream link*, performs the short connect/start exchange, and
//!    hands the live video bytes to a sink (a file recorder or a counter).
//! 3. Merges held keys into a single legal movement command and re-sends it
//!    while the keys stay down, sending a stop command when they are released.
//!
//! The protocol state machines live in `application` and never touch a socket;
//! `infrastructure` provides the WebSocket links, sinks, config file, and
//! console parser that the binary wires together.

/// Application layer: handshake, stream binding, and motion intent use cases.
pub mod application;

/// Infrastructure layer: WebSocket links, video sinks, config storage, console.
pub mod infrastructure;
