//! StreamBinder: the stream-link connect/start exchange and the sink handoff.
//!
//! ```text
//! Idle ──(link opened)──► send connect ──► AwaitingReply
//!   ──(JSON reply)──► send start ──► HandedOff  (sink owns the link)
//! ```
//!
//! The first JSON reply that is not `failed` acknowledges `connect`; bytes
//! that do not decode are skipped.  Everything after the handoff is video
//! transport and belongs to the [`VideoSink`].

use async_trait::async_trait;
use rover_core::protocol::codec::{
    decode_answer, encode_stream_connect, encode_stream_start, frame_stream_command,
};
use rover_core::{AnswerKind, SessionIdentity, StreamCommand};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::wire_link::{LinkEvent, WireLink};

/// Error type for stream binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamBindError {
    /// The stream link failed or was refused before the handoff.
    #[error("stream bind failed: {0}")]
    StreamBindFailed(String),

    /// A message arrived before `connect` was sent.
    #[error("unexpected stream message in state {0:?}")]
    UnexpectedMessage(StreamBindState),

    /// The link already belongs to the sink.
    #[error("stream already handed off")]
    AlreadyHandedOff,
}

/// Error type for video sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A chunk was written before a link was attached.
    #[error("sink has no attached stream")]
    Detached,
}

/// Position of the binder in the stream exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamBindState {
    Idle,
    AwaitingReply,
    HandedOff,
    Failed,
}

/// The stream link, ready for video, plus the rover it streams.
pub struct StreamHandoff {
    pub link: Box<dyn WireLink>,
    pub rover_id: String,
}

impl std::fmt::Debug for StreamHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandoff")
            .field("rover_id", &self.rover_id)
            .field("open", &self.link.is_open())
            .finish()
    }
}

/// Consumer of the live stream after the handoff.
///
/// The sink owns the stream link from `attach` on; the runtime feeds it every
/// later inbound message through `write_chunk`.
#[async_trait]
pub trait VideoSink: Send {
    /// Takes ownership of the handed-off stream.
    async fn attach(&mut self, handoff: StreamHandoff) -> Result<(), SinkError>;

    /// Consumes one chunk of transport bytes.
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError>;

    /// The stream ended; flush and release the link.
    async fn finish(&mut self) -> Result<(), SinkError>;
}

/// Drives one stream link from open to handoff.
pub struct StreamBinder {
    identity: SessionIdentity,
    rover_id: String,
    state: StreamBindState,
    link: Option<Box<dyn WireLink>>,
}

impl StreamBinder {
    pub fn new(identity: SessionIdentity, rover_id: impl Into<String>) -> Self {
        Self {
            identity,
            rover_id: rover_id.into(),
            state: StreamBindState::Idle,
            link: None,
        }
    }

    pub fn state(&self) -> StreamBindState {
        self.state
    }

    /// Attaches the stream link, sending `connect` right away if it is open.
    ///
    /// # Errors
    ///
    /// Returns [`StreamBindError::StreamBindFailed`] if `connect` cannot be sent.
    pub fn start(&mut self, link: Box<dyn WireLink>) -> Result<(), StreamBindError> {
        if self.state == StreamBindState::HandedOff {
            return Err(StreamBindError::AlreadyHandedOff);
        }
        let open = link.is_open();
        self.link = Some(link);
        if open {
            self.send_connect()?;
        }
        Ok(())
    }

    /// Feeds one stream-link event into the binder.
    ///
    /// Returns the handoff once the reply to `connect` arrived and `start`
    /// was sent, and `None` for events that do not complete the exchange.
    ///
    /// # Errors
    ///
    /// - [`StreamBindError::StreamBindFailed`] if the link closes or errors
    ///   before the handoff, or the server refuses the bind.
    /// - [`StreamBindError::UnexpectedMessage`] for a message before `connect`.
    /// - [`StreamBindError::AlreadyHandedOff`] for any event after the handoff.
    pub fn on_link_event(
        &mut self,
        event: LinkEvent,
    ) -> Result<Option<StreamHandoff>, StreamBindError> {
        match (self.state, event) {
            (StreamBindState::HandedOff, _) => Err(StreamBindError::AlreadyHandedOff),
            (StreamBindState::Idle, LinkEvent::Opened) => {
                self.send_connect()?;
                Ok(None)
            }
            (_, LinkEvent::Opened) => Ok(None),
            (StreamBindState::AwaitingReply, LinkEvent::Message(raw)) => self.on_reply(&raw),
            (state, LinkEvent::Message(_)) => {
                warn!("stream message in state {state:?}");
                Err(StreamBindError::UnexpectedMessage(state))
            }
            (_, LinkEvent::Closed) => Err(self.fail("stream link closed before start".to_string())),
            (_, LinkEvent::Error(reason)) => Err(self.fail(reason)),
        }
    }

    fn on_reply(&mut self, raw: &[u8]) -> Result<Option<StreamHandoff>, StreamBindError> {
        let answer = match decode_answer(raw) {
            Ok(answer) => answer,
            Err(e) => {
                debug!(len = raw.len(), "skipping stream message that is not a reply: {e}");
                return Ok(None);
            }
        };
        if let Ok(AnswerKind::Failed(reason)) = answer.kind() {
            return Err(self.fail(format!("server refused stream: {reason}")));
        }
        debug!("stream connect acknowledged for rover '{}'", self.rover_id);

        self.send(&encode_stream_start(&self.identity.to_string(), &self.rover_id))?;
        let link = self
            .link
            .take()
            .ok_or_else(|| self.fail("stream link missing at handoff".to_string()))?;
        self.state = StreamBindState::HandedOff;
        info!("stream for rover '{}' handed to sink", self.rover_id);
        Ok(Some(StreamHandoff {
            link,
            rover_id: self.rover_id.clone(),
        }))
    }

    fn send_connect(&mut self) -> Result<(), StreamBindError> {
        self.send(&encode_stream_connect(&self.identity.to_string(), &self.rover_id))?;
        self.state = StreamBindState::AwaitingReply;
        Ok(())
    }

    fn send(&mut self, command: &StreamCommand) -> Result<(), StreamBindError> {
        let frame = frame_stream_command(command).map_err(|e| self.fail(e.to_string()))?;
        let result = match self.link.as_mut() {
            Some(link) => link.send(frame).map_err(|e| e.to_string()),
            None => Err("no stream link attached".to_string()),
        };
        result.map_err(|reason| self.fail(reason))
    }

    fn fail(&mut self, reason: String) -> StreamBindError {
        warn!("stream bind for rover '{}' failed: {reason}", self.rover_id);
        self.state = StreamBindState::Failed;
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        StreamBindError::StreamBindFailed(reason)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
