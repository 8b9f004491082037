//! Stateless command encoder and line framing for the control link.
//!
//! # Framing
//!
//! Every message on the control link, in either direction, is one JSON
//! object followed by a single `\n`.  The encoder functions in this module
//! only build typed [`ControlCommand`] values; [`frame_command`] turns a
//! command plus its request id into the bytes written to the link, and
//! [`decode_answer`] parses one received line into a [`ServerAnswer`].
//!
//! ```text
//!  encode_move(&[Forward, Left])
//!        │
//!        ▼
//!  ControlCommand::Move { direction: [forward, left] }
//!        │  frame_command(7, ..)
//!        ▼
//!  {"id":7,"cmd":"move","params":{"direction":["forward","left"]}}\n
//! ```

use thiserror::Error;

use super::answer::ServerAnswer;
use super::messages::{
    AccessoryAction, AccessoryKind, AccessoryParams, CameraToken, ControlCommand, ControlEnvelope,
    DirectionToken, Motor, StreamCommand,
};

/// Errors that can occur while framing or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON, or JSON of the wrong shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field required by the answer's shape was absent.
    #[error("answer is missing field '{0}'")]
    MissingField(&'static str),

    /// The answer parsed but matches none of the known answer shapes.
    #[error("unexpected answer shape: {0}")]
    UnexpectedShape(String),

    /// The received line was empty after trimming whitespace.
    #[error("empty message")]
    Empty,
}

// ── Encoders ──────────────────────────────────────────────────────────────────

/// `{cmd:"move", params:{direction:[..]}}`
pub fn encode_move(tokens: &[DirectionToken]) -> ControlCommand {
    ControlCommand::Move {
        direction: tokens.to_vec(),
    }
}

/// `{cmd:"move_stop", params:{motors:[..]}}`
pub fn encode_move_stop(motors: &[Motor]) -> ControlCommand {
    ControlCommand::MoveStop {
        motors: motors.to_vec(),
    }
}

/// `{cmd:"move_cam", params:{direction:[..]}}`
pub fn encode_move_cam(tokens: &[CameraToken]) -> ControlCommand {
    ControlCommand::MoveCam {
        direction: tokens.to_vec(),
    }
}

/// `{cmd:"set_speed", params:{speed:"0.500"}}`
///
/// The value is clamped to `[0, 1]` and rendered with exactly three decimal
/// places.  NaN encodes as `"0.000"`.
pub fn encode_set_speed(value: f64) -> ControlCommand {
    ControlCommand::SetSpeed {
        speed: format_speed(value),
    }
}

/// Renders a speed scalar the way `set_speed` carries it.
pub fn format_speed(value: f64) -> String {
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    let rendered = format!("{clamped:.3}");
    // -0.0 formats as "-0.000"
    if rendered.starts_with('-') {
        "0.000".to_string()
    } else {
        rendered
    }
}

/// `{cmd:"set_cam", params:{angles:[0,0]}}`, the camera CLEAR pulse.
pub fn encode_camera_reset() -> ControlCommand {
    ControlCommand::SetCam { angles: [0, 0] }
}

/// `{cmd:"laser_ctrl"|"light_ctrl", params:{action, intensity?}}`
///
/// `intensity` is a percentage and is capped at 100.
pub fn encode_accessory(
    kind: AccessoryKind,
    action: AccessoryAction,
    intensity: Option<u8>,
) -> ControlCommand {
    let params = AccessoryParams {
        action,
        intensity: intensity.map(|i| i.min(100)),
    };
    match kind {
        AccessoryKind::Laser => ControlCommand::LaserCtrl(params),
        AccessoryKind::Light => ControlCommand::LightCtrl(params),
    }
}

/// `{cmd:"hello", params:{client_id}}`
pub fn encode_hello(client_id: &str) -> ControlCommand {
    ControlCommand::Hello {
        client_id: client_id.to_string(),
    }
}

/// `{cmd:"list", params:{client_id}}`
pub fn encode_list(client_id: &str) -> ControlCommand {
    ControlCommand::List {
        client_id: client_id.to_string(),
    }
}

/// `{cmd:"connect", params:{client_id, rover_id}}`
pub fn encode_connect(client_id: &str, rover_id: &str) -> ControlCommand {
    ControlCommand::Connect {
        client_id: client_id.to_string(),
        rover_id: rover_id.to_string(),
    }
}

/// Stream-link `connect`, the first message after the stream link opens.
pub fn encode_stream_connect(client_id: &str, rover_id: &str) -> StreamCommand {
    StreamCommand::Connect {
        client_id: client_id.to_string(),
        rover_id: rover_id.to_string(),
    }
}

/// Stream-link `start`, sent once the server acknowledged the stream bind.
pub fn encode_stream_start(client_id: &str, rover_id: &str) -> StreamCommand {
    StreamCommand::Start {
        client_id: client_id.to_string(),
        rover_id: rover_id.to_string(),
    }
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Serializes `command` with its request `id` and appends the line terminator.
///
/// # Errors
///
/// Returns [`ProtocolError::Json`] if serialization fails.
pub fn frame_command(id: u64, command: &ControlCommand) -> Result<Vec<u8>, ProtocolError> {
    let envelope = ControlEnvelope { id, command };
    let mut bytes = serde_json::to_vec(&envelope)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Serializes a stream-link command and appends the line terminator.
///
/// Stream commands are not correlated and carry no `id`.
///
/// # Errors
///
/// Returns [`ProtocolError::Json`] if serialization fails.
pub fn frame_stream_command(command: &StreamCommand) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(command)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes one received line into a [`ServerAnswer`].
///
/// Leading and trailing whitespace (including the `\n` terminator) is ignored.
///
/// # Errors
///
/// - [`ProtocolError::Empty`] if nothing but whitespace was received.
/// - [`ProtocolError::Json`] if the line is not a JSON object.
pub fn decode_answer(bytes: &[u8]) -> Result<ServerAnswer, ProtocolError> {
    let trimmed = trim_ascii(bytes);
    if trimmed.is_empty() {
        return Err(ProtocolError::Empty);
    }
    tracing::trace!(len = trimmed.len(), "decoding answer");
    Ok(serde_json::from_slice(trimmed)?)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
