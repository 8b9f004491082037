//! # rover-core
//!
//! Shared library for RoverLink containing the control-channel wire protocol,
//! the stateless command encoder, and the motion mask algebra.
//!
//! This crate is used by the client application and by tests that play the
//! server role. It has zero dependencies on sockets, async runtimes, or UI
//! frameworks.
//!
//! # Architecture overview (for beginners)
//!
//! RoverLink drives a networked rover through two independent channels: a
//! *control link* that carries JSON commands and answers, and a *stream link*
//! that carries live video once a rover has been bound.
//!
//! This crate (`rover-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How commands travel over the control link.  Commands are
//!   rendered to line-delimited JSON objects (`{"id":..,"cmd":..,"params":..}`)
//!   and server answers are decoded back into typed Rust structs.
//!
//! - **`domain`** – Pure business rules with no I/O.  The most important
//!   piece is the motion mask: a bitfield of simultaneously held directions
//!   that can only ever hold combinations the rover can physically execute.

// Rust will look for each module in a subdirectory with the same name
// (e.g., src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `rover_core::DirectionMask` instead of `rover_core::domain::direction::DirectionMask`.
pub use domain::direction::{
    CameraFlag, CameraMask, DirectionMask, DriveFlag, Mask, MaskError, MaskFlag,
};
pub use domain::rover::{Mobility, RoverDescriptor, SessionIdentity};
pub use protocol::answer::{AnswerKind, FailureReason, ServerAnswer};
pub use protocol::codec::{decode_answer, frame_command, frame_stream_command, ProtocolError};
pub use protocol::messages::{CommandKind, ControlCommand, StreamCommand};
