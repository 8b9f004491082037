//! RoverController: the single entry point the UI layer talks to.
//!
//! The controller owns one [`HandshakeSession`] and one
//! [`MotionIntentEngine`].  Motion requests are refused with
//! [`SessionError::NotBound`] until the handshake completes, and the engine
//! is not consulted at all before then, so the masks cannot drift away from
//! what the rover was actually told.

use std::fmt;

use rover_core::protocol::codec::{encode_accessory, encode_set_speed, format_speed};
use rover_core::protocol::messages::{AccessoryAction, AccessoryKind};
use rover_core::{CameraFlag, CameraMask, ControlCommand, DirectionMask, DriveFlag, RoverDescriptor};
use tracing::{debug, warn};

use super::bindings::{KeyBindings, MotionInput};
use super::handshake::{CommandSink, HandshakeSession, HandshakeState, SessionError, SessionEvent};
use super::held_inputs::{HeldFlag, HeldInputs, InputSource};
use super::motion_intent::{MotionError, MotionIntentEngine};
use super::wire_link::{LinkEvent, WireLink};

/// Point-in-time view of the controller, for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub state: HandshakeState,
    pub rover: Option<RoverDescriptor>,
    pub direction: DirectionMask,
    pub camera: CameraMask,
    pub speed: f64,
    pub laser_on: bool,
    pub light_on: bool,
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rover = self
            .rover
            .as_ref()
            .map_or("-", |r| r.display_name());
        write!(
            f,
            "state={} rover={} drive={} camera={} speed={} laser={} light={}",
            self.state,
            rover,
            self.direction,
            self.camera,
            format_speed(self.speed),
            on_off(self.laser_on),
            on_off(self.light_on),
        )
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// UI-facing façade over the session and the motion engine.
pub struct RoverController {
    session: HandshakeSession,
    engine: MotionIntentEngine,
    held: HeldInputs,
    bindings: KeyBindings,
    speed: f64,
    laser_on: bool,
    light_on: bool,
}

impl RoverController {
    /// `initial_speed` is sent as soon as the session binds.
    pub fn new(session: HandshakeSession, bindings: KeyBindings, initial_speed: f64) -> Self {
        Self {
            session,
            engine: MotionIntentEngine::new(),
            held: HeldInputs::new(),
            bindings,
            speed: initial_speed,
            laser_on: false,
            light_on: false,
        }
    }

    pub fn session(&self) -> &HandshakeSession {
        &self.session
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.session.current_state(),
            rover: self.session.active_rover().cloned(),
            direction: self.engine.direction(),
            camera: self.engine.camera(),
            speed: self.speed,
            laser_on: self.laser_on,
            light_on: self.light_on,
        }
    }

    // ── Session plumbing ──────────────────────────────────────────────────────

    /// Attaches the control link.
    ///
    /// # Errors
    ///
    /// See [`HandshakeSession::start`].
    pub fn start(&mut self, link: Box<dyn WireLink>) -> Result<Option<SessionEvent>, SessionError> {
        self.session.start(link)
    }

    /// Feeds a control-link event to the session.
    ///
    /// On binding the initial speed is sent; on close all held input is
    /// forgotten.
    ///
    /// # Errors
    ///
    /// See [`HandshakeSession::on_link_event`].
    pub fn on_link_event(&mut self, event: LinkEvent) -> Result<Option<SessionEvent>, SessionError> {
        let outcome = self.session.on_link_event(event)?;
        match &outcome {
            Some(SessionEvent::Bound(_)) => {
                if let Err(e) = self.session.send_command(encode_set_speed(self.speed)) {
                    warn!("failed to send initial speed: {e}");
                }
            }
            Some(SessionEvent::Closed) => {
                self.engine.reset();
                self.held.clear();
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// See [`HandshakeSession::select_rover`].
    pub fn select_rover(&mut self, index: isize) -> Result<SessionEvent, SessionError> {
        self.session.select_rover(index)
    }

    pub fn close(&mut self) {
        self.engine.reset();
        self.held.clear();
        self.session.close();
    }

    // ── Motion ────────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// [`SessionError::NotBound`] before binding, else as for
    /// [`MotionIntentEngine::begin`].
    pub fn begin(&mut self, flag: DriveFlag) -> Result<ControlCommand, MotionError> {
        self.ensure_bound()?;
        self.engine.begin(flag, &mut self.session)
    }

    /// # Errors
    ///
    /// [`SessionError::NotBound`] before binding, else as for
    /// [`MotionIntentEngine::end`].
    pub fn end(&mut self, flag: DriveFlag) -> Result<ControlCommand, MotionError> {
        self.ensure_bound()?;
        self.engine.end(flag, &mut self.session)
    }

    /// # Errors
    ///
    /// As for [`Self::begin`].
    pub fn begin_camera(&mut self, flag: CameraFlag) -> Result<ControlCommand, MotionError> {
        self.ensure_bound()?;
        self.engine.begin_camera(flag, &mut self.session)
    }

    /// # Errors
    ///
    /// As for [`Self::end`].
    pub fn end_camera(&mut self, flag: CameraFlag) -> Result<ControlCommand, MotionError> {
        self.ensure_bound()?;
        self.engine.end_camera(flag, &mut self.session)
    }

    /// # Errors
    ///
    /// As for [`Self::begin`].
    pub fn clear_camera(&mut self) -> Result<ControlCommand, MotionError> {
        self.ensure_bound()?;
        self.engine.clear_camera(&mut self.session)
    }

    /// Re-sends held movement.  Does nothing until the session is bound.
    ///
    /// # Errors
    ///
    /// See [`MotionIntentEngine::refresh`].
    pub fn refresh(&mut self) -> Result<Vec<ControlCommand>, MotionError> {
        if self.session.current_state() != HandshakeState::Bound {
            return Ok(Vec::new());
        }
        self.engine.refresh(&mut self.session)
    }

    /// Sets the wheel speed, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotBound`] before binding or a send failure.
    pub fn set_speed(&mut self, value: f64) -> Result<ControlCommand, MotionError> {
        self.ensure_bound()?;
        let command = encode_set_speed(value);
        self.session.send_command(command.clone())?;
        self.speed = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        Ok(command)
    }

    /// Sends an explicit accessory command.
    ///
    /// The remembered on/off state follows `On`/`Off`; `Dim` and `Blink`
    /// count as on.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotBound`] before binding or a send failure.
    pub fn set_accessory(
        &mut self,
        kind: AccessoryKind,
        action: AccessoryAction,
        intensity: Option<u8>,
    ) -> Result<ControlCommand, MotionError> {
        self.ensure_bound()?;
        let command = encode_accessory(kind, action, intensity);
        self.session.send_command(command.clone())?;
        let on = action != AccessoryAction::Off;
        match kind {
            AccessoryKind::Laser => self.laser_on = on,
            AccessoryKind::Light => self.light_on = on,
        }
        Ok(command)
    }

    /// # Errors
    ///
    /// As for [`Self::set_accessory`].
    pub fn toggle_laser(&mut self) -> Result<ControlCommand, MotionError> {
        let action = if self.laser_on { AccessoryAction::Off } else { AccessoryAction::On };
        self.set_accessory(AccessoryKind::Laser, action, None)
    }

    /// # Errors
    ///
    /// As for [`Self::set_accessory`].
    pub fn toggle_light(&mut self) -> Result<ControlCommand, MotionError> {
        let action = if self.light_on { AccessoryAction::Off } else { AccessoryAction::On };
        self.set_accessory(AccessoryKind::Light, action, None)
    }

    // ── Key input ─────────────────────────────────────────────────────────────

    /// Handles a key going down.
    ///
    /// Returns `Ok(None)` for unbound keys and auto-repeat.
    ///
    /// # Errors
    ///
    /// As for the motion operation the key is bound to.
    pub fn press_key(
        &mut self,
        source: InputSource,
        key: char,
    ) -> Result<Option<ControlCommand>, MotionError> {
        let Some(input) = self.bindings.resolve(key) else {
            debug!("unbound key '{key}'");
            return Ok(None);
        };
        self.ensure_bound()?;
        match input {
            MotionInput::CameraClear => self.clear_camera().map(Some),
            MotionInput::Laser => self.toggle_laser().map(Some),
            MotionInput::Light => self.toggle_light().map(Some),
            MotionInput::Drive(flag) => self.press_held(source, HeldFlag::Drive(flag)),
            MotionInput::Camera(flag) => self.press_held(source, HeldFlag::Camera(flag)),
        }
    }

    /// Handles a key going up.
    ///
    /// # Errors
    ///
    /// As for [`Self::end`].
    pub fn release_key(
        &mut self,
        source: InputSource,
        key: char,
    ) -> Result<Option<ControlCommand>, MotionError> {
        match self.bindings.resolve(key).and_then(MotionInput::held_flag) {
            Some(flag) => self.release_held(source, flag),
            None => Ok(None),
        }
    }

    /// Ends everything `source` holds, e.g. when the window loses focus.
    ///
    /// # Errors
    ///
    /// The first failing `end`; remaining flags are still released.
    pub fn release_all(&mut self, source: InputSource) -> Result<Vec<ControlCommand>, MotionError> {
        let mut sent = Vec::new();
        let mut first_error = None;
        for flag in self.held.release_all(source) {
            match self.end_flag(flag) {
                Ok(command) => sent.push(command),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    fn press_held(
        &mut self,
        source: InputSource,
        flag: HeldFlag,
    ) -> Result<Option<ControlCommand>, MotionError> {
        if !self.held.press(source, flag) {
            return Ok(None);
        }
        let result = match flag {
            HeldFlag::Drive(f) => self.engine.begin(f, &mut self.session),
            HeldFlag::Camera(f) => self.engine.begin_camera(f, &mut self.session),
        };
        if matches!(result, Err(MotionError::IllegalCombination(_))) {
            // The engine never set it, so the release must not end it either.
            self.held.release(source, flag);
        }
        result.map(Some)
    }

    fn release_held(
        &mut self,
        source: InputSource,
        flag: HeldFlag,
    ) -> Result<Option<ControlCommand>, MotionError> {
        if !self.held.release(source, flag) {
            return Ok(None);
        }
        self.ensure_bound()?;
        self.end_flag(flag).map(Some)
    }

    fn end_flag(&mut self, flag: HeldFlag) -> Result<ControlCommand, MotionError> {
        match flag {
            HeldFlag::Drive(f) => self.engine.end(f, &mut self.session),
            HeldFlag::Camera(f) => self.engine.end_camera(f, &mut self.session),
        }
    }

    fn ensure_bound(&self) -> Result<(), SessionError> {
        match self.session.current_state() {
            HandshakeState::Bound => Ok(()),
            HandshakeState::Closed => Err(SessionError::SessionClosed),
            other => Err(SessionError::NotBound(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handshake::{MockStreamLauncher, SessionOptions};
    use crate::application::wire_link::LinkError;
    use rover_core::SessionIdentity;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct SharedLink(Arc<Mutex<Vec<Value>>>);

    impl WireLink for SharedLink {
        fn is_open(&self) -> bool {
            true
        }

        fn send(&mut self, bytes: Vec<u8>) -> Result<(), LinkError> {
            self.0.lock().unwrap().push(serde_json::from_slice(&bytes).unwrap());
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn controller() -> (RoverController, Arc<Mutex<Vec<Value>>>) {
        let mut launcher = MockStreamLauncher::new();
        launcher.expect_launch().return_const(());
        let session = HandshakeSession::new(
            SessionIdentity::generate(),
            SessionOptions::default(),
            Box::new(launcher),
        );
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut controller = RoverController::new(session, KeyBindings::default(), 0.5);
        controller.start(Box::new(SharedLink(Arc::clone(&sent)))).unwrap();
        (controller, sent)
    }

    fn bind(controller: &mut RoverController) {
        for answer in [
            &br#"{"server_id":"s","msg":"ack"}"#[..],
            br#"{"server_id":"s","rovers":[{"rover_id":"A"}]}"#,
            br#"{"server_id":"s","client_id":"c","rover_id":"A","msg":"ok"}"#,
        ] {
            controller
                .on_link_event(LinkEvent::Message(answer.to_vec()))
                .unwrap();
        }
    }

    fn last_cmd(sent: &Arc<Mutex<Vec<Value>>>) -> Value {
        sent.lock().unwrap().last().cloned().unwrap()
    }

    #[test]
    fn test_motion_before_bound_is_refused_without_state_change() {
        // Arrange
        let (mut controller, sent) = controller();

        // Act
        let result = controller.begin(DriveFlag::Forward);

        // Assert
        assert!(matches!(
            result,
            Err(MotionError::Session(SessionError::NotBound(HandshakeState::AwaitingHello)))
        ));
        assert!(controller.status().direction.is_stop());
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_bind_sends_initial_speed() {
        let (mut controller, sent) = controller();
        bind(&mut controller);
        let speed = last_cmd(&sent);
        assert_eq!(speed["cmd"], "set_speed");
        assert_eq!(speed["params"]["speed"], "0.500");
    }

    #[test]
    fn test_key_press_and_release_drive_engine() {
        // Arrange
        let (mut controller, sent) = controller();
        bind(&mut controller);

        // Act
        controller.press_key(InputSource::Keyboard, 'w').unwrap();
        let repeat = controller.press_key(InputSource::Keyboard, 'w').unwrap();
        controller.press_key(InputSource::Keyboard, 'a').unwrap();

        // Assert
        assert!(repeat.is_none(), "auto-repeat is swallowed");
        assert_eq!(last_cmd(&sent)["params"]["direction"], serde_json::json!(["forward", "left"]));

        // Act
        controller.release_key(InputSource::Keyboard, 'w').unwrap();
        controller.release_key(InputSource::Keyboard, 'a').unwrap();

        // Assert
        assert_eq!(last_cmd(&sent)["cmd"], "move_stop");
    }

    #[test]
    fn test_illegal_press_does_not_leave_phantom_hold() {
        // Arrange
        let (mut controller, _) = controller();
        bind(&mut controller);
        controller.press_key(InputSource::Keyboard, 'w').unwrap();

        // Act
        let back = controller.press_key(InputSource::Keyboard, 's');
        let released = controller.release_key(InputSource::Keyboard, 's').unwrap();

        // Assert
        assert!(matches!(back, Err(MotionError::IllegalCombination(_))));
        assert!(released.is_none());
        assert_eq!(controller.status().direction.flags(), vec![DriveFlag::Forward]);
    }

    #[test]
    fn test_release_all_stops_touch_holds() {
        let (mut controller, sent) = controller();
        bind(&mut controller);
        controller.press_key(InputSource::Touch, 'r').unwrap();
        let ended = controller.release_all(InputSource::Touch).unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(last_cmd(&sent)["params"]["motors"], serde_json::json!(["camera"]));
    }

    #[test]
    fn test_toggles_flip_accessory_state() {
        // Arrange
        let (mut controller, sent) = controller();
        bind(&mut controller);

        // Act
        controller.press_key(InputSource::Keyboard, 'l').unwrap();
        let on = last_cmd(&sent);
        controller.toggle_laser().unwrap();
        let off = last_cmd(&sent);

        // Assert
        assert_eq!(on["cmd"], "laser_ctrl");
        assert_eq!(on["params"]["action"], "on");
        assert_eq!(off["params"]["action"], "off");
        assert!(!controller.status().laser_on);
    }

    #[test]
    fn test_set_speed_clamps_and_remembers() {
        let (mut controller, sent) = controller();
        bind(&mut controller);
        controller.set_speed(1.5).unwrap();
        assert_eq!(last_cmd(&sent)["params"]["speed"], "1.000");
        assert_eq!(controller.status().speed, 1.0);
    }

    #[test]
    fn test_close_event_forgets_held_motion() {
        let (mut controller, _) = controller();
        bind(&mut controller);
        controller.begin(DriveFlag::Cw).unwrap();
        controller.on_link_event(LinkEvent::Closed).unwrap();
        let status = controller.status();
        assert_eq!(status.state, HandshakeState::Closed);
        assert!(status.direction.is_stop());
        assert!(controller.refresh().unwrap().is_empty());
    }

    #[test]
    fn test_status_display_is_compact() {
        let (mut controller, _) = controller();
        bind(&mut controller);
        controller.begin(DriveFlag::Forward).unwrap();
        let text = controller.status().to_string();
        assert!(text.contains("state=bound"));
        assert!(text.contains("rover=A"));
        assert!(text.contains("drive=forward"));
    }
}
