//! All RoverLink wire message types.
//!
//! Control-channel commands are JSON objects of the shape
//!
//! ```json
//! {"id":7,"cmd":"move","params":{"direction":["forward","left"]}}
//! ```
//!
//! terminated by a newline.  Serde's adjacently-tagged representation
//! (`tag = "cmd", content = "params"`) produces the `cmd`/`params` pair; the
//! request `id` is added by [`ControlEnvelope`].

use serde::{Deserialize, Serialize};

// ── Tokens ────────────────────────────────────────────────────────────────────

/// Wheel direction token carried in `move.params.direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionToken {
    Forward,
    Back,
    Left,
    Right,
    Cw,
    Ccw,
}

/// Camera direction token carried in `move_cam.params.direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraToken {
    Up,
    Down,
    Cw,
    Ccw,
}

/// Motor group named in `move_stop.params.motors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motor {
    Wheels,
    Camera,
}

/// Accessory addressed by `laser_ctrl` / `light_ctrl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryKind {
    Laser,
    Light,
}

/// Requested accessory state.
///
/// `Blink` is understood by laser firmware only; lights ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryAction {
    On,
    Off,
    Dim,
    Blink,
}

/// Parameters of an accessory command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryParams {
    pub action: AccessoryAction,
    /// Brightness percentage (0–100); omitted from the wire when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
}

// ── Control channel ───────────────────────────────────────────────────────────

/// Every command a client can send on the control link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Session identification; first message after the link opens.
    Hello { client_id: String },
    /// Request the rover inventory.
    List { client_id: String },
    /// Bind this session to one rover.
    Connect { client_id: String, rover_id: String },
    /// Start or continue wheel movement.
    Move { direction: Vec<DirectionToken> },
    /// Halt the named motor groups.
    MoveStop { motors: Vec<Motor> },
    /// Start or continue camera gimbal movement.
    MoveCam { direction: Vec<CameraToken> },
    /// Absolute camera position `[azimuth, elevation]`.
    SetCam { angles: [i32; 2] },
    /// Wheel speed scalar, rendered with exactly three decimals.
    SetSpeed { speed: String },
    LaserCtrl(AccessoryParams),
    LightCtrl(AccessoryParams),
}

/// Discriminant of a [`ControlCommand`], used for answer correlation and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Hello,
    List,
    Connect,
    Move,
    MoveStop,
    MoveCam,
    SetCam,
    SetSpeed,
    LaserCtrl,
    LightCtrl,
}

impl CommandKind {
    /// The wire `cmd` string.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Hello => "hello",
            CommandKind::List => "list",
            CommandKind::Connect => "connect",
            CommandKind::Move => "move",
            CommandKind::MoveStop => "move_stop",
            CommandKind::MoveCam => "move_cam",
            CommandKind::SetCam => "set_cam",
            CommandKind::SetSpeed => "set_speed",
            CommandKind::LaserCtrl => "laser_ctrl",
            CommandKind::LightCtrl => "light_ctrl",
        }
    }

    /// `true` for the three request/reply commands of the handshake.
    pub fn is_handshake(self) -> bool {
        matches!(self, CommandKind::Hello | CommandKind::List | CommandKind::Connect)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ControlCommand {
    /// Returns the discriminant of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            ControlCommand::Hello { .. } => CommandKind::Hello,
            ControlCommand::List { .. } => CommandKind::List,
            ControlCommand::Connect { .. } => CommandKind::Connect,
            ControlCommand::Move { .. } => CommandKind::Move,
            ControlCommand::MoveStop { .. } => CommandKind::MoveStop,
            ControlCommand::MoveCam { .. } => CommandKind::MoveCam,
            ControlCommand::SetCam { .. } => CommandKind::SetCam,
            ControlCommand::SetSpeed { .. } => CommandKind::SetSpeed,
            ControlCommand::LaserCtrl(_) => CommandKind::LaserCtrl,
            ControlCommand::LightCtrl(_) => CommandKind::LightCtrl,
        }
    }
}

/// A control command tagged with its request id, as written to the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlEnvelope<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub command: &'a ControlCommand,
}

// ── Stream channel ────────────────────────────────────────────────────────────

/// The two commands sent on the stream link before it turns into raw video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum StreamCommand {
    Connect { client_id: String, rover_id: String },
    Start { client_id: String, rover_id: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
