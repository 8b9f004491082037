//! Application layer use cases for the rover client.
//!
//! # What use cases does the client have?
//!
//! - **`handshake`** – Drives the control link from "socket open" to "bound to
//!   a rover" and correlates every later command with its answer.
//!
//! - **`stream_binder`** – Performs the stream-link connect/start exchange and
//!   hands the link to a [`stream_binder::VideoSink`].
//!
//! - **`motion_intent`** – Merges begin/end events into the current direction
//!   and camera masks and emits one command per change.
//!
//! - **`held_inputs`** / **`bindings`** – Caller-side helpers that map keys to
//!   motion inputs and make sure one input source never releases a flag held
//!   by another.
//!
//! - **`controller`** – The façade the UI talks to; owns one session and one
//!   motion engine.
//!
//! None of these modules perform I/O.  Links are injected through the
//! [`wire_link::WireLink`] trait.

pub mod bindings;
pub mod controller;
pub mod handshake;
pub mod held_inputs;
pub mod motion_intent;
pub mod stream_binder;
pub mod wire_link;
