//! Control- and stream-channel protocol: message types, answers, and codec.

pub mod answer;
pub mod codec;
pub mod messages;
pub mod sequence;

pub use answer::{AnswerKind, FailureReason, ServerAnswer};
pub use codec::{decode_answer, frame_command, frame_stream_command, ProtocolError};
pub use messages::*;
pub use sequence::RequestIdCounter;
