//! HandshakeSession: the control-link state machine.
//!
//! # Protocol flow
//!
//! ```text
//! Idle ──(link opened)──► send hello ──► AwaitingHello
//!   ──(hello ack)──► send list ──► AwaitingList
//!   ──(rover list)──► AwaitingSelection
//!   ──(auto or select_rover)──► send connect ──► AwaitingBindAck
//!   ──(bind ack)──► Bound ──► StreamLauncher::launch(rover)
//! ```
//!
//! A refused `connect` goes back to `AwaitingSelection` so another rover can
//! be picked.
//!
//! Any `closed`/`error` link event moves the session to the terminal
//! `Closed` state; retrying means building a new session and a new link.
//!
//! # Answer correlation
//!
//! Every command carries a request id.  Handshake commands are remembered in
//! a pending map until their answer arrives.  Steady-state commands are
//! fire-and-forget: only the most recent ones are kept, in a small window
//! that silently drops the oldest, so a server that never answers moves
//! cannot grow the session's memory.
//!
//! Servers that echo the id are correlated by it; servers that do not are
//! correlated with the oldest outstanding request, handshake entries first.
//! An answer whose shape does not fit the correlated request is rejected and
//! the request stays outstanding, so a stray message can never advance the
//! handshake.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use rover_core::protocol::codec::{
    decode_answer, encode_connect, encode_hello, encode_list, frame_command,
};
use rover_core::protocol::sequence::RequestIdCounter;
use rover_core::{
    AnswerKind, CommandKind, ControlCommand, FailureReason, ProtocolError, RoverDescriptor,
    ServerAnswer, SessionIdentity,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::wire_link::{LinkError, LinkEvent, WireLink};

/// Unanswered steady-state commands kept for correlating late answers.
const IN_FLIGHT_WINDOW: usize = 16;

// ── State ─────────────────────────────────────────────────────────────────────

/// Position of a session in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Idle,
    AwaitingHello,
    AwaitingList,
    AwaitingSelection,
    AwaitingBindAck,
    Bound,
    /// Terminal: the control link closed or failed.
    Closed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Idle => "idle",
            HandshakeState::AwaitingHello => "awaiting_hello",
            HandshakeState::AwaitingList => "awaiting_list",
            HandshakeState::AwaitingSelection => "awaiting_selection",
            HandshakeState::AwaitingBindAck => "awaiting_bind_ack",
            HandshakeState::Bound => "bound",
            HandshakeState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A command that was sent and has not been answered yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub id: u64,
    pub command: ControlCommand,
}

impl PendingMessage {
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}

/// Side effect attached to a handshake transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Hello was acknowledged; request the rover list.
    SendList,
    /// The rover list arrived; store it and select (automatically or not).
    OfferRovers,
    /// The bind was acknowledged; activate the rover and launch the stream.
    Bind,
}

/// The handshake transition table.
///
/// Returns the next state and the side effect for a well-shaped answer in
/// `state`, or `None` if `answer` does not advance `state`.  `Failed`
/// answers never advance.
pub fn transition(
    state: HandshakeState,
    answer: &AnswerKind,
) -> Option<(HandshakeState, HandshakeStep)> {
    match (state, answer) {
        (HandshakeState::AwaitingHello, AnswerKind::HelloAck) => {
            Some((HandshakeState::AwaitingList, HandshakeStep::SendList))
        }
        (HandshakeState::AwaitingList, AnswerKind::RoverList) => {
            Some((HandshakeState::AwaitingSelection, HandshakeStep::OfferRovers))
        }
        (HandshakeState::AwaitingBindAck, AnswerKind::BindAck | AnswerKind::Ok) => {
            Some((HandshakeState::Bound, HandshakeStep::Bind))
        }
        _ => None,
    }
}

// ── Events and errors ─────────────────────────────────────────────────────────

/// Result of a steady-state command as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Ok,
    Failed(FailureReason),
}

/// What a handled link event or message did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The handshake moved to a new state.
    Advanced(HandshakeState),
    /// The session is bound; the stream launcher has been invoked.
    Bound(RoverDescriptor),
    /// The server answered a handshake command with `failed`.
    Refused {
        command: CommandKind,
        reason: FailureReason,
    },
    /// Answer to a command sent after binding.
    CommandAnswer {
        id: u64,
        command: CommandKind,
        outcome: CommandOutcome,
    },
    /// The control link closed; the session is finished.
    Closed,
}

/// Error type for session operations.
///
/// None of these are fatal: the session keeps its prior state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A send was attempted while the control link was not open.
    #[error("control link not ready: {0}")]
    LinkNotReady(#[source] LinkError),

    /// The answer could not be decoded or classified.
    #[error("malformed answer: {0}")]
    MalformedAnswer(#[source] ProtocolError),

    /// An answer arrived that matches no pending request.
    #[error("answer without a pending request (id {id:?})")]
    HandshakeOutOfOrder { id: Option<u64> },

    /// The answer's shape does not fit the request it was correlated with.
    #[error("answer {answer:?} does not fit pending '{expected}'")]
    UnexpectedAnswer {
        expected: CommandKind,
        answer: AnswerKind,
    },

    #[error("rover index {index} out of range for {len} rover(s)")]
    RoverIndexOutOfRange { index: isize, len: usize },

    #[error("rover selection not expected in state {0}")]
    SelectionNotExpected(HandshakeState),

    /// A steady-state command was issued before the session was bound.
    #[error("session not bound (state {0})")]
    NotBound(HandshakeState),

    #[error("session is closed")]
    SessionClosed,

    #[error("session already started")]
    AlreadyStarted,

    #[error("failed to encode command: {0}")]
    Encode(#[source] ProtocolError),
}

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Opens the stream link once the session is bound.
#[cfg_attr(test, mockall::automock)]
pub trait StreamLauncher: Send {
    /// Called exactly once, when the session reaches `Bound`.
    fn launch(&mut self, identity: SessionIdentity, rover: &RoverDescriptor);
}

/// The command-sending capability handed to the motion engine.
pub trait CommandSink {
    /// Frames and sends a steady-state command, returning its request id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotBound`] before the handshake completed and
    /// [`SessionError::LinkNotReady`] if the link refuses the bytes.
    fn send_command(&mut self, command: ControlCommand) -> Result<u64, SessionError>;
}

/// Rover selection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Select a rover as soon as the list arrives.
    pub auto_select: bool,
    /// Rover id to prefer when auto-selecting; falls back to the first rover.
    pub preferred_rover: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_select: true,
            preferred_rover: None,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Drives one control link through the handshake and correlates answers.
pub struct HandshakeSession {
    identity: SessionIdentity,
    options: SessionOptions,
    state: HandshakeState,
    link: Option<Box<dyn WireLink>>,
    ids: RequestIdCounter,
    pending: BTreeMap<u64, PendingMessage>,
    in_flight: VecDeque<PendingMessage>,
    rovers: Vec<RoverDescriptor>,
    selected: Option<usize>,
    active: Option<RoverDescriptor>,
    launcher: Box<dyn StreamLauncher>,
}

impl HandshakeSession {
    pub fn new(
        identity: SessionIdentity,
        options: SessionOptions,
        launcher: Box<dyn StreamLauncher>,
    ) -> Self {
        Self {
            identity,
            options,
            state: HandshakeState::Idle,
            link: None,
            ids: RequestIdCounter::new(),
            pending: BTreeMap::new(),
            in_flight: VecDeque::new(),
            rovers: Vec::new(),
            selected: None,
            active: None,
            launcher,
        }
    }

    pub fn identity(&self) -> SessionIdentity {
        self.identity
    }

    pub fn current_state(&self) -> HandshakeState {
        self.state
    }

    /// Rovers offered by the server; empty until the list arrives.
    pub fn rovers(&self) -> &[RoverDescriptor] {
        &self.rovers
    }

    /// The bound rover, once the session is `Bound`.
    pub fn active_rover(&self) -> Option<&RoverDescriptor> {
        self.active.as_ref()
    }

    /// Outstanding handshake requests, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PendingMessage> {
        self.pending.values()
    }

    /// Attaches the control link.
    ///
    /// If the link is already open, `hello` is sent immediately; otherwise
    /// the session waits for [`LinkEvent::Opened`].
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyStarted`] if a link is already attached.
    /// - [`SessionError::SessionClosed`] after the session closed.
    pub fn start(&mut self, link: Box<dyn WireLink>) -> Result<Option<SessionEvent>, SessionError> {
        if self.state == HandshakeState::Closed {
            return Err(SessionError::SessionClosed);
        }
        if self.link.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        let open = link.is_open();
        self.link = Some(link);
        if open {
            self.send_hello().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Feeds one control-link event into the session.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Self::on_message`] for message events.
    pub fn on_link_event(&mut self, event: LinkEvent) -> Result<Option<SessionEvent>, SessionError> {
        match event {
            LinkEvent::Opened => {
                if self.state == HandshakeState::Idle && self.link.is_some() {
                    self.send_hello().map(Some)
                } else {
                    debug!("ignoring link open in state {}", self.state);
                    Ok(None)
                }
            }
            LinkEvent::Message(raw) => self.on_message(&raw).map(Some),
            LinkEvent::Closed => {
                if self.state == HandshakeState::Closed {
                    return Ok(None);
                }
                info!("control link closed in state {}", self.state);
                self.shut_down();
                Ok(Some(SessionEvent::Closed))
            }
            LinkEvent::Error(reason) => {
                if self.state == HandshakeState::Closed {
                    return Ok(None);
                }
                warn!("control link error in state {}: {reason}", self.state);
                self.shut_down();
                Ok(Some(SessionEvent::Closed))
            }
        }
    }

    /// Handles one inbound control-link message.
    ///
    /// # Errors
    ///
    /// - [`SessionError::MalformedAnswer`] for undecodable input.
    /// - [`SessionError::HandshakeOutOfOrder`] if nothing is pending.
    /// - [`SessionError::UnexpectedAnswer`] on a shape mismatch.
    /// - [`SessionError::SessionClosed`] after the session closed.
    /// - [`SessionError::LinkNotReady`] if the follow-up `list` cannot be
    ///   sent; the hello ack is spent by then, so the session closes.
    ///
    /// Apart from the failed follow-up send, the session state is unchanged
    /// in every error case.
    pub fn on_message(&mut self, raw: &[u8]) -> Result<SessionEvent, SessionError> {
        if self.state == HandshakeState::Closed {
            return Err(SessionError::SessionClosed);
        }

        let answer = decode_answer(raw).map_err(|e| {
            warn!("dropping malformed answer in state {}: {e}", self.state);
            SessionError::MalformedAnswer(e)
        })?;
        let kind = answer.kind().map_err(|e| {
            warn!("dropping unclassifiable answer in state {}: {e}", self.state);
            SessionError::MalformedAnswer(e)
        })?;

        let (id, expected) = self.correlate(answer.id)?;
        if !kind.answers(expected) {
            warn!(id, "answer {kind:?} does not fit pending '{expected}'; state stays {}", self.state);
            return Err(SessionError::UnexpectedAnswer {
                expected,
                answer: kind,
            });
        }
        self.forget(id);

        if self.state == HandshakeState::Bound {
            return Ok(self.on_command_answer(id, expected, kind));
        }
        self.on_handshake_answer(id, expected, kind, answer)
    }

    /// Selects the rover at `index` of the offered list and sends `connect`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SelectionNotExpected`] outside `AwaitingSelection`.
    /// - [`SessionError::RoverIndexOutOfRange`] for `index < 0` or past the end.
    ///
    /// Nothing is sent and the state is unchanged on error.
    pub fn select_rover(&mut self, index: isize) -> Result<SessionEvent, SessionError> {
        if self.state != HandshakeState::AwaitingSelection {
            return Err(SessionError::SelectionNotExpected(self.state));
        }
        let len = self.rovers.len();
        match usize::try_from(index) {
            Ok(i) if i < len => self.connect_to(i),
            _ => {
                debug!("ignoring rover selection {index} (have {len})");
                Err(SessionError::RoverIndexOutOfRange { index, len })
            }
        }
    }

    /// Closes the control link and ends the session.
    pub fn close(&mut self) {
        if self.state != HandshakeState::Closed {
            info!("closing session in state {}", self.state);
            self.shut_down();
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn correlate(&self, echoed: Option<u64>) -> Result<(u64, CommandKind), SessionError> {
        let found = match echoed {
            Some(id) => self
                .pending
                .get(&id)
                .or_else(|| self.in_flight.iter().find(|p| p.id == id)),
            None => self
                .pending
                .values()
                .next()
                .or_else(|| self.in_flight.front()),
        };
        match found {
            Some(pending) => Ok((pending.id, pending.kind())),
            None => {
                warn!("answer without pending request (id {echoed:?}) in state {}", self.state);
                Err(SessionError::HandshakeOutOfOrder { id: echoed })
            }
        }
    }

    fn forget(&mut self, id: u64) {
        if self.pending.remove(&id).is_none() {
            self.in_flight.retain(|p| p.id != id);
        }
    }

    fn on_command_answer(&self, id: u64, command: CommandKind, kind: AnswerKind) -> SessionEvent {
        let outcome = match kind {
            AnswerKind::Failed(reason) => {
                warn!(id, "server refused '{command}': {reason}");
                CommandOutcome::Failed(reason)
            }
            _ => CommandOutcome::Ok,
        };
        SessionEvent::CommandAnswer {
            id,
            command,
            outcome,
        }
    }

    fn on_handshake_answer(
        &mut self,
        id: u64,
        expected: CommandKind,
        kind: AnswerKind,
        answer: ServerAnswer,
    ) -> Result<SessionEvent, SessionError> {
        if let AnswerKind::Failed(reason) = kind {
            warn!(id, "server refused '{expected}' in state {}: {reason}", self.state);
            if expected == CommandKind::Connect {
                // Back to the select step; the refused rover is not retried.
                self.selected = None;
                self.advance(HandshakeState::AwaitingSelection);
            }
            return Ok(SessionEvent::Refused {
                command: expected,
                reason,
            });
        }

        let Some((next, step)) = transition(self.state, &kind) else {
            warn!(id, "answer {kind:?} does not advance state {}", self.state);
            return Err(SessionError::UnexpectedAnswer {
                expected,
                answer: kind,
            });
        };

        match step {
            HandshakeStep::SendList => {
                if let Err(e) = self.dispatch(encode_list(&self.identity.to_string())) {
                    warn!("cannot request the rover list; closing session");
                    self.shut_down();
                    return Err(e);
                }
                Ok(self.advance(next))
            }
            HandshakeStep::OfferRovers => {
                self.rovers = answer.rovers.unwrap_or_default();
                info!("server offered {} rover(s)", self.rovers.len());
                let event = self.advance(next);
                self.auto_select().map(|selected| selected.unwrap_or(event))
            }
            HandshakeStep::Bind => self.bind(answer.rover_id),
        }
    }

    fn auto_select(&mut self) -> Result<Option<SessionEvent>, SessionError> {
        if self.rovers.is_empty() {
            warn!("server offered no rovers; waiting in {}", self.state);
            return Ok(None);
        }
        if !self.options.auto_select {
            return Ok(None);
        }
        let preferred = self.options.preferred_rover.as_deref().and_then(|wanted| {
            let found = self.rovers.iter().position(|r| r.rover_id == wanted);
            if found.is_none() {
                warn!("preferred rover '{wanted}' not offered; using the first rover");
            }
            found
        });
        self.connect_to(preferred.unwrap_or(0)).map(Some)
    }

    fn connect_to(&mut self, index: usize) -> Result<SessionEvent, SessionError> {
        let rover_id = self.rovers[index].rover_id.clone();
        self.dispatch(encode_connect(&self.identity.to_string(), &rover_id))?;
        self.selected = Some(index);
        info!("selected rover '{rover_id}'");
        Ok(self.advance(HandshakeState::AwaitingBindAck))
    }

    fn bind(&mut self, acked: Option<String>) -> Result<SessionEvent, SessionError> {
        let Some(rover) = self.selected.and_then(|i| self.rovers.get(i)).cloned() else {
            return Err(SessionError::HandshakeOutOfOrder { id: None });
        };
        if let Some(acked) = acked.filter(|id| *id != rover.rover_id) {
            warn!("bind ack names rover '{acked}', selected '{}'", rover.rover_id);
        }
        self.advance(HandshakeState::Bound);
        info!("session {} bound to rover '{}'", self.identity, rover.rover_id);
        self.active = Some(rover.clone());
        self.launcher.launch(self.identity, &rover);
        Ok(SessionEvent::Bound(rover))
    }

    fn send_hello(&mut self) -> Result<SessionEvent, SessionError> {
        self.dispatch(encode_hello(&self.identity.to_string()))?;
        Ok(self.advance(HandshakeState::AwaitingHello))
    }

    fn advance(&mut self, next: HandshakeState) -> SessionEvent {
        debug!("handshake {} -> {next}", self.state);
        self.state = next;
        SessionEvent::Advanced(next)
    }

    fn dispatch(&mut self, command: ControlCommand) -> Result<u64, SessionError> {
        let kind = command.kind();
        let Some(link) = self.link.as_mut().filter(|link| link.is_open()) else {
            warn!("dropping '{kind}': control link not ready");
            return Err(SessionError::LinkNotReady(LinkError::NotOpen));
        };

        let id = self.ids.next_id();
        let frame = frame_command(id, &command).map_err(SessionError::Encode)?;
        link.send(frame).map_err(|e| {
            warn!("dropping '{kind}': {e}");
            SessionError::LinkNotReady(e)
        })?;
        debug!(id, "sent '{kind}'");

        let message = PendingMessage { id, command };
        if kind.is_handshake() {
            self.pending.insert(id, message);
        } else {
            if self.in_flight.len() == IN_FLIGHT_WINDOW {
                if let Some(old) = self.in_flight.pop_front() {
                    trace!(id = old.id, "no answer to '{}'", old.kind());
                }
            }
            self.in_flight.push_back(message);
        }
        Ok(id)
    }

    fn shut_down(&mut self) {
        self.state = HandshakeState::Closed;
        self.pending.clear();
        self.in_flight.clear();
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }
}

impl CommandSink for HandshakeSession {
    fn send_command(&mut self, command: ControlCommand) -> Result<u64, SessionError> {
        match self.state {
            HandshakeState::Bound => self.dispatch(command),
            HandshakeState::Closed => Err(SessionError::SessionClosed),
            other => Err(SessionError::NotBound(other)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
