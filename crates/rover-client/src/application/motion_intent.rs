//! MotionIntentEngine: turns begin/end events into legal movement commands.
//!
//! The engine owns the current [`DirectionMask`] and [`CameraMask`].  Each
//! accepted change emits exactly one command through the injected
//! [`CommandSink`]: the movement command for the new mask, or the family's
//! stop command once the mask is empty.
//!
//! # Caller contract
//!
//! The engine does not know which input source set a flag.  Callers that mix
//! sources (keyboard and touch, say) must only `end` flags they previously
//! `begin`-ed; see [`super::held_inputs::HeldInputs`].

use rover_core::protocol::codec::encode_camera_reset;
use rover_core::{CameraFlag, CameraMask, ControlCommand, DirectionMask, DriveFlag, Mask, MaskError, MaskFlag};
use thiserror::Error;
use tracing::debug;

use super::handshake::{CommandSink, SessionError};

/// Error type for motion intents.
#[derive(Debug, Error)]
pub enum MotionError {
    /// The change would leave the allowed set; nothing was sent.
    #[error(transparent)]
    IllegalCombination(#[from] MaskError),

    /// `end` was called for a flag that is not held; nothing was sent.
    #[error("'{0}' is not held")]
    NotHeld(&'static str),

    /// The session refused the command.
    ///
    /// For send failures the mask change is already committed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Owner of the direction and camera masks.
#[derive(Debug, Default)]
pub struct MotionIntentEngine {
    direction: DirectionMask,
    camera: CameraMask,
}

impl MotionIntentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(&self) -> DirectionMask {
        self.direction
    }

    pub fn camera(&self) -> CameraMask {
        self.camera
    }

    /// Adds a drive flag and emits the merged command.
    ///
    /// Beginning a flag that is already held leaves the mask unchanged and
    /// re-emits the same command.
    ///
    /// # Errors
    ///
    /// [`MotionError::IllegalCombination`] if the union is not allowed (the
    /// mask is unchanged), or [`MotionError::Session`] if sending failed.
    pub fn begin(&mut self, flag: DriveFlag, sink: &mut dyn CommandSink) -> Result<ControlCommand, MotionError> {
        merge(&mut self.direction, flag, sink)
    }

    /// Clears a held drive flag and emits the resulting command.
    ///
    /// # Errors
    ///
    /// [`MotionError::NotHeld`] if `flag` is not set, or
    /// [`MotionError::Session`] if sending failed.
    pub fn end(&mut self, flag: DriveFlag, sink: &mut dyn CommandSink) -> Result<ControlCommand, MotionError> {
        release(&mut self.direction, flag, sink)
    }

    /// Camera counterpart of [`Self::begin`].
    ///
    /// # Errors
    ///
    /// As for [`Self::begin`].
    pub fn begin_camera(
        &mut self,
        flag: CameraFlag,
        sink: &mut dyn CommandSink,
    ) -> Result<ControlCommand, MotionError> {
        merge(&mut self.camera, flag, sink)
    }

    /// Camera counterpart of [`Self::end`].
    ///
    /// # Errors
    ///
    /// As for [`Self::end`].
    pub fn end_camera(
        &mut self,
        flag: CameraFlag,
        sink: &mut dyn CommandSink,
    ) -> Result<ControlCommand, MotionError> {
        release(&mut self.camera, flag, sink)
    }

    /// Resets the camera mask and sends the zero-angle camera command.
    ///
    /// # Errors
    ///
    /// [`MotionError::Session`] if sending failed; the mask is reset anyway.
    pub fn clear_camera(&mut self, sink: &mut dyn CommandSink) -> Result<ControlCommand, MotionError> {
        self.camera = CameraMask::STOP;
        debug!("camera cleared");
        emit(encode_camera_reset(), sink)
    }

    /// Re-emits the command of every non-empty mask.
    ///
    /// Held movement expires on the rover unless it is repeated; the runtime
    /// calls this on a fixed interval.  Empty masks emit nothing.
    ///
    /// # Errors
    ///
    /// [`MotionError::Session`] on the first failed send.
    pub fn refresh(&self, sink: &mut dyn CommandSink) -> Result<Vec<ControlCommand>, MotionError> {
        let mut sent = Vec::new();
        if !self.direction.is_stop() {
            sent.push(emit(self.direction.to_command(), sink)?);
        }
        if !self.camera.is_stop() {
            sent.push(emit(self.camera.to_command(), sink)?);
        }
        Ok(sent)
    }

    /// Drops all held state without sending anything.
    pub fn reset(&mut self) {
        self.direction = DirectionMask::STOP;
        self.camera = CameraMask::STOP;
    }
}

fn merge<Flag: MaskFlag>(
    mask: &mut Mask<Flag>,
    flag: Flag,
    sink: &mut dyn CommandSink,
) -> Result<ControlCommand, MotionError> {
    let next = mask.with(flag).map_err(|e| {
        debug!("rejected {} + {}: {e}", mask, flag.name());
        e
    })?;
    *mask = next;
    emit(next.to_command(), sink)
}

fn release<Flag: MaskFlag>(
    mask: &mut Mask<Flag>,
    flag: Flag,
    sink: &mut dyn CommandSink,
) -> Result<ControlCommand, MotionError> {
    if !mask.contains(flag) {
        debug!("ignoring release of {}: not held in {}", flag.name(), mask);
        return Err(MotionError::NotHeld(flag.name()));
    }
    let next = mask.toggled(flag)?;
    *mask = next;
    emit(next.to_command(), sink)
}

fn emit(command: ControlCommand, sink: &mut dyn CommandSink) -> Result<ControlCommand, MotionError> {
    sink.send_command(command.clone())?;
    Ok(command)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
