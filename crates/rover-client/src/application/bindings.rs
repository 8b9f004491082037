//! Keyboard bindings from keys to motion inputs.

use std::collections::HashMap;
use std::str::FromStr;

use rover_core::{CameraFlag, DriveFlag};
use thiserror::Error;

use super::held_inputs::HeldFlag;

/// Error type for key binding tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("unknown motion input '{0}'")]
    UnknownInput(String),

    #[error("binding key '{0}' must be a single character")]
    InvalidKey(String),
}

/// What a bound key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionInput {
    Drive(DriveFlag),
    Camera(CameraFlag),
    /// Pulse: reset the camera to zero angles.
    CameraClear,
    /// Pulse: toggle the laser.
    Laser,
    /// Pulse: toggle the light.
    Light,
}

impl MotionInput {
    /// The mask flag this input holds while pressed, or `None` for pulses.
    pub fn held_flag(self) -> Option<HeldFlag> {
        match self {
            MotionInput::Drive(flag) => Some(HeldFlag::Drive(flag)),
            MotionInput::Camera(flag) => Some(HeldFlag::Camera(flag)),
            MotionInput::CameraClear | MotionInput::Laser | MotionInput::Light => None,
        }
    }
}

impl FromStr for MotionInput {
    type Err = BindingError;

    /// Parses the names used in config files, e.g. `forward`, `camera_up`,
    /// `camera_clear`, `laser`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = match s.trim().to_ascii_lowercase().as_str() {
            "forward" => MotionInput::Drive(DriveFlag::Forward),
            "back" => MotionInput::Drive(DriveFlag::Back),
            "left" => MotionInput::Drive(DriveFlag::Left),
            "right" => MotionInput::Drive(DriveFlag::Right),
            "cw" => MotionInput::Drive(DriveFlag::Cw),
            "ccw" => MotionInput::Drive(DriveFlag::Ccw),
            "camera_up" => MotionInput::Camera(CameraFlag::Up),
            "camera_down" => MotionInput::Camera(CameraFlag::Down),
            "camera_cw" => MotionInput::Camera(CameraFlag::Cw),
            "camera_ccw" => MotionInput::Camera(CameraFlag::Ccw),
            "camera_clear" => MotionInput::CameraClear,
            "laser" => MotionInput::Laser,
            "light" => MotionInput::Light,
            _ => return Err(BindingError::UnknownInput(s.to_string())),
        };
        Ok(input)
    }
}

/// Key → input table.  Keys are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    keys: HashMap<char, MotionInput>,
}

impl Default for KeyBindings {
    /// `w/s/a/d` drive, `e/q` rotate, `r/f/z/x` camera, `c` camera clear,
    /// `l` laser, `k` light.
    fn default() -> Self {
        let keys = [
            ('w', MotionInput::Drive(DriveFlag::Forward)),
            ('s', MotionInput::Drive(DriveFlag::Back)),
            ('a', MotionInput::Drive(DriveFlag::Left)),
            ('d', MotionInput::Drive(DriveFlag::Right)),
            ('e', MotionInput::Drive(DriveFlag::Cw)),
            ('q', MotionInput::Drive(DriveFlag::Ccw)),
            ('r', MotionInput::Camera(CameraFlag::Up)),
            ('f', MotionInput::Camera(CameraFlag::Down)),
            ('z', MotionInput::Camera(CameraFlag::Ccw)),
            ('x', MotionInput::Camera(CameraFlag::Cw)),
            ('c', MotionInput::CameraClear),
            ('l', MotionInput::Laser),
            ('k', MotionInput::Light),
        ];
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl KeyBindings {
    /// The default table with `overrides` applied on top, as read from the
    /// `[motion.keys]` config table (`"i" = "forward"`).
    ///
    /// # Errors
    ///
    /// Returns a [`BindingError`] for a multi-character key or an unknown
    /// input name; nothing is applied in that case.
    pub fn with_overrides<'a>(
        overrides: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, BindingError> {
        let mut bindings = Self::default();
        for (key, name) in overrides {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                return Err(BindingError::InvalidKey(key.to_string()));
            };
            bindings.bind(ch, name.parse()?);
        }
        Ok(bindings)
    }

    pub fn resolve(&self, key: char) -> Option<MotionInput> {
        self.keys.get(&key.to_ascii_lowercase()).copied()
    }

    /// Binds `key`, returning the input it replaced.
    pub fn bind(&mut self, key: char, input: MotionInput) -> Option<MotionInput> {
        self.keys.insert(key.to_ascii_lowercase(), input)
    }
}
