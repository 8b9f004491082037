//! Motion mask algebra: the bitfields behind every movement command.
//!
//! A user can hold several directional inputs at once ("forward" and "left"
//! for a curve, "camera up" and "camera cw" for a diagonal pan).  The client
//! merges them into a single bitfield and translates that bitfield into one
//! wire command.
//!
//! # Allowed sets
//!
//! Not every bit combination is something a rover can do: FORWARD|BACK is
//! physically meaningless, and rotating in place cannot be combined with
//! driving.  Each flag family therefore carries a fixed table of legal masks,
//! and a [`Mask`] value can only be constructed from a member of that table.
//!
//! ```text
//! Drive  (STOP=0 FORWARD=1 BACK=2 LEFT=4 RIGHT=8 CW=16 CCW=32)
//!   STOP, F, B, L, R, F|L, F|R, B|L, B|R, CW, CCW
//!
//! Camera (STOP=0 UP=1 DOWN=2 CW=4 CCW=8)
//!   STOP, UP, DOWN, CW, CCW, UP|CW, UP|CCW, DOWN|CW, DOWN|CCW
//! ```
//!
//! Both tables are closed under single-bit removal: clearing any set bit of a
//! legal mask yields another legal mask.  Releasing one of several held inputs
//! can therefore never strand the client in an illegal state.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use thiserror::Error;

use crate::protocol::codec::{encode_move, encode_move_cam};
use crate::protocol::messages::{CameraToken, ControlCommand, DirectionToken, Motor};

/// Error returned when a mask mutation would leave the allowed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MaskError {
    /// The drive bits do not form a combination the rover can execute.
    #[error("illegal direction combination: 0b{0:06b}")]
    IllegalDirectionCombination(u8),

    /// The camera bits do not form a combination the gimbal can execute.
    #[error("illegal camera combination: 0b{0:04b}")]
    IllegalCameraCombination(u8),
}

/// A family of composable motion flags (drive or camera).
///
/// Implementors describe their bit layout, the closed set of legal masks,
/// and how a non-empty mask is rendered on the wire.
pub trait MaskFlag: Copy + Eq + Hash + fmt::Debug + 'static {
    /// Every flag of this family, in ascending bit order.
    const ALL: &'static [Self];

    /// Every legal mask value, including STOP (`0`).
    const ALLOWED: &'static [u8];

    /// Motor group named in the stop command when the mask returns to STOP.
    const MOTOR: Motor;

    /// The single bit this flag occupies.
    fn bit(self) -> u8;

    /// Short lowercase name used in logs and `Display` output.
    fn name(self) -> &'static str;

    /// Builds the error describing an illegal combination of this family.
    fn illegal(bits: u8) -> MaskError;

    /// Renders a non-empty, ascending list of flags as the movement command.
    fn move_command(flags: &[Self]) -> ControlCommand;
}

// ── Drive flags ───────────────────────────────────────────────────────────────

/// Wheel movement flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DriveFlag {
    Forward = 1,
    Back = 2,
    Left = 4,
    Right = 8,
    Cw = 16,
    Ccw = 32,
}

impl DriveFlag {
    /// Wire token for this flag (`"forward"`, `"back"`, ...).
    pub fn token(self) -> DirectionToken {
        match self {
            DriveFlag::Forward => DirectionToken::Forward,
            DriveFlag::Back => DirectionToken::Back,
            DriveFlag::Left => DirectionToken::Left,
            DriveFlag::Right => DirectionToken::Right,
            DriveFlag::Cw => DirectionToken::Cw,
            DriveFlag::Ccw => DirectionToken::Ccw,
        }
    }
}

const F: u8 = DriveFlag::Forward as u8;
const B: u8 = DriveFlag::Back as u8;
const L: u8 = DriveFlag::Left as u8;
const R: u8 = DriveFlag::Right as u8;

impl MaskFlag for DriveFlag {
    const ALL: &'static [Self] = &[
        DriveFlag::Forward,
        DriveFlag::Back,
        DriveFlag::Left,
        DriveFlag::Right,
        DriveFlag::Cw,
        DriveFlag::Ccw,
    ];

    const ALLOWED: &'static [u8] = &[
        0,
        F,
        B,
        L,
        R,
        F | L,
        F | R,
        B | L,
        B | R,
        DriveFlag::Cw as u8,
        DriveFlag::Ccw as u8,
    ];

    const MOTOR: Motor = Motor::Wheels;

    fn bit(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            DriveFlag::Forward => "forward",
            DriveFlag::Back => "back",
            DriveFlag::Left => "left",
            DriveFlag::Right => "right",
            DriveFlag::Cw => "cw",
            DriveFlag::Ccw => "ccw",
        }
    }

    fn illegal(bits: u8) -> MaskError {
        MaskError::IllegalDirectionCombination(bits)
    }

    fn move_command(flags: &[Self]) -> ControlCommand {
        let tokens: Vec<DirectionToken> = flags.iter().map(|f| f.token()).collect();
        encode_move(&tokens)
    }
}

// ── Camera flags ──────────────────────────────────────────────────────────────

/// Camera gimbal movement flags.
///
/// The camera also supports an out-of-band "clear" pulse that resets both
/// angles to zero; it is not a mask bit and is handled by the motion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CameraFlag {
    Up = 1,
    Down = 2,
    Cw = 4,
    Ccw = 8,
}

impl CameraFlag {
    /// Wire token for this flag (`"up"`, `"down"`, ...).
    pub fn token(self) -> CameraToken {
        match self {
            CameraFlag::Up => CameraToken::Up,
            CameraFlag::Down => CameraToken::Down,
            CameraFlag::Cw => CameraToken::Cw,
            CameraFlag::Ccw => CameraToken::Ccw,
        }
    }
}

const UP: u8 = CameraFlag::Up as u8;
const DOWN: u8 = CameraFlag::Down as u8;
const PAN_CW: u8 = CameraFlag::Cw as u8;
const PAN_CCW: u8 = CameraFlag::Ccw as u8;

impl MaskFlag for CameraFlag {
    const ALL: &'static [Self] = &[CameraFlag::Up, CameraFlag::Down, CameraFlag::Cw, CameraFlag::Ccw];

    const ALLOWED: &'static [u8] = &[
        0,
        UP,
        DOWN,
        PAN_CW,
        PAN_CCW,
        UP | PAN_CW,
        UP | PAN_CCW,
        DOWN | PAN_CW,
        DOWN | PAN_CCW,
    ];

    const MOTOR: Motor = Motor::Camera;

    fn bit(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            CameraFlag::Up => "up",
            CameraFlag::Down => "down",
            CameraFlag::Cw => "cw",
            CameraFlag::Ccw => "ccw",
        }
    }

    fn illegal(bits: u8) -> MaskError {
        MaskError::IllegalCameraCombination(bits)
    }

    fn move_command(flags: &[Self]) -> ControlCommand {
        let tokens: Vec<CameraToken> = flags.iter().map(|f| f.token()).collect();
        encode_move_cam(&tokens)
    }
}

// ── Mask ──────────────────────────────────────────────────────────────────────

/// A legal combination of simultaneously held flags of one family.
///
/// The bit value is private: every constructor and mutator checks the result
/// against [`MaskFlag::ALLOWED`], so a `Mask` holding an illegal combination
/// cannot exist.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mask<Flag: MaskFlag> {
    bits: u8,
    _flag: PhantomData<Flag>,
}

/// Wheel movement mask.
pub type DirectionMask = Mask<DriveFlag>;

/// Camera gimbal movement mask.
pub type CameraMask = Mask<CameraFlag>;

impl<Flag: MaskFlag> Mask<Flag> {
    /// The empty mask: nothing held, motors stopped.
    pub const STOP: Self = Self {
        bits: 0,
        _flag: PhantomData,
    };

    /// Returns `true` if `bits` is a member of the family's allowed set.
    pub fn is_allowed(bits: u8) -> bool {
        Flag::ALLOWED.contains(&bits)
    }

    /// Builds a mask from raw bits.
    ///
    /// # Errors
    ///
    /// Returns the family's illegal-combination error if `bits` is not in the
    /// allowed set.
    pub fn from_bits(bits: u8) -> Result<Self, MaskError> {
        if Self::is_allowed(bits) {
            Ok(Self {
                bits,
                _flag: PhantomData,
            })
        } else {
            Err(Flag::illegal(bits))
        }
    }

    /// Raw bit value.
    pub fn bits(self) -> u8 {
        self.bits
    }

    /// `true` when no flag is held.
    pub fn is_stop(self) -> bool {
        self.bits == 0
    }

    /// `true` when `flag` is part of this mask.
    pub fn contains(self, flag: Flag) -> bool {
        self.bits & flag.bit() != 0
    }

    /// Returns `self | flag` if the union is legal.
    ///
    /// OR is idempotent: adding a flag that is already set returns an equal mask.
    ///
    /// # Errors
    ///
    /// Returns the family's illegal-combination error when the union leaves
    /// the allowed set (e.g. FORWARD while BACK is held).
    pub fn with(self, flag: Flag) -> Result<Self, MaskError> {
        Self::from_bits(self.bits | flag.bit())
    }

    /// Returns `self ^ flag` if the result is legal.
    ///
    /// Callers are expected to toggle only flags that are currently set; on an
    /// unset flag this *sets* the bit.
    ///
    /// # Errors
    ///
    /// Returns the family's illegal-combination error when the result leaves
    /// the allowed set.
    pub fn toggled(self, flag: Flag) -> Result<Self, MaskError> {
        Self::from_bits(self.bits ^ flag.bit())
    }

    /// The held flags in ascending bit order.
    pub fn flags(self) -> Vec<Flag> {
        Flag::ALL
            .iter()
            .copied()
            .filter(|f| self.contains(*f))
            .collect()
    }

    /// Every legal mask of this family, STOP first.
    pub fn allowed() -> impl Iterator<Item = Self> {
        Flag::ALLOWED.iter().map(|&bits| Self {
            bits,
            _flag: PhantomData,
        })
    }

    /// Renders this mask as the command the rover should execute.
    ///
    /// STOP becomes `move_stop` for the family's motor group, never a
    /// movement command with an empty token list.
    pub fn to_command(self) -> ControlCommand {
        if self.is_stop() {
            crate::protocol::codec::encode_move_stop(&[Flag::MOTOR])
        } else {
            Flag::move_command(&self.flags())
        }
    }
}

impl<Flag: MaskFlag> Default for Mask<Flag> {
    fn default() -> Self {
        Self::STOP
    }
}

impl<Flag: MaskFlag> fmt::Debug for Mask<Flag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mask({self} = 0b{:06b})", self.bits)
    }
}

impl<Flag: MaskFlag> fmt::Display for Mask<Flag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_stop() {
            return f.write_str("stop");
        }
        let names: Vec<&str> = self.flags().into_iter().map(|flag| flag.name()).collect();
        f.write_str(&names.join("+"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
