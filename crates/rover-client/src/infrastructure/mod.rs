//! Infrastructure layer for the rover client.
//!
//! Contains the adapters the application layer is written against: WebSocket
//! links, video sinks, stream launching, config file storage, and the console
//! command parser used by the binary.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `rover_core`, but MUST NOT be imported by the `application` layer.

pub mod console;
pub mod link;
pub mod storage;
pub mod stream;
pub mod video_sink;
