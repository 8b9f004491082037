//! Domain entities for RoverLink.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the system holds the rules that make it what it is.
//! Here that means two things:
//!
//! - **Motion masks** – the set of directions a user is holding at the same
//!   time, restricted to the combinations a rover can physically execute.
//! - **Rover identity** – the descriptors a server advertises and the opaque
//!   identifier a client presents for the lifetime of its session.
//!
//! Code in outer layers (application, infrastructure) depends on the domain,
//! but the domain never depends on them.

/// Direction and camera mask algebra.
///
/// See [`direction::Mask`] for the main type.
pub mod direction;

/// Rover descriptors and per-session client identity.
pub mod rover;

pub use direction::{CameraFlag, CameraMask, DirectionMask, DriveFlag, Mask, MaskError, MaskFlag};
pub use rover::{Mobility, RoverDescriptor, SessionIdentity};
