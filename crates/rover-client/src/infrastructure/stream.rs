//! Stream launching: from "session bound" to bytes in a [`VideoSink`].
//!
//! The handshake session runs synchronously inside the main loop and must
//! not open sockets itself.  [`ChannelLauncher`] therefore only *queues* a
//! [`StreamRequest`]; the main loop picks it up and spawns
//! [`run_stream_binding`] for it.

use anyhow::{bail, Context};
use rover_core::{RoverDescriptor, SessionIdentity};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::application::handshake::StreamLauncher;
use crate::application::stream_binder::{StreamBinder, VideoSink};
use crate::application::wire_link::{LinkEvent, WireLink};
use crate::infrastructure::link::websocket;

/// A rover the session bound and whose stream should be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub identity: SessionIdentity,
    pub rover: RoverDescriptor,
}

/// [`StreamLauncher`] that forwards launch requests over a channel.
pub struct ChannelLauncher {
    tx: UnboundedSender<StreamRequest>,
}

impl ChannelLauncher {
    /// Creates the launcher and the receiver the runtime drains.
    pub fn new() -> (Self, UnboundedReceiver<StreamRequest>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StreamLauncher for ChannelLauncher {
    fn launch(&mut self, identity: SessionIdentity, rover: &RoverDescriptor) {
        let request = StreamRequest {
            identity,
            rover: rover.clone(),
        };
        if self.tx.send(request).is_err() {
            warn!("stream request for rover '{}' dropped: runtime gone", rover.rover_id);
        }
    }
}

/// Connects the stream link for `request` and pumps it into `sink`.
///
/// Returns the number of stream bytes delivered to the sink.
///
/// # Errors
///
/// Fails if the link cannot be opened, the bind exchange fails, or the sink
/// reports an error.
pub async fn run_stream_binding(
    url: &str,
    subprotocol: Option<&str>,
    request: StreamRequest,
    sink: &mut dyn VideoSink,
) -> anyhow::Result<u64> {
    let (link, mut events) = websocket::connect(url, subprotocol)
        .await
        .with_context(|| format!("failed to open stream link {url}"))?;
    let binder = StreamBinder::new(request.identity, request.rover.rover_id.clone());
    bind_and_pump(binder, Box::new(link), &mut events, sink).await
}

/// Drives `binder` over `link` until the handoff, then forwards every later
/// message to `sink` until the link ends.
///
/// # Errors
///
/// As for [`run_stream_binding`].
pub async fn bind_and_pump(
    mut binder: StreamBinder,
    link: Box<dyn WireLink>,
    events: &mut UnboundedReceiver<LinkEvent>,
    sink: &mut dyn VideoSink,
) -> anyhow::Result<u64> {
    binder.start(link)?;

    let handoff = loop {
        let Some(event) = events.recv().await else {
            bail!("stream link ended before the bind completed");
        };
        if let Some(handoff) = binder.on_link_event(event)? {
            break handoff;
        }
    };
    let rover_id = handoff.rover_id.clone();
    sink.attach(handoff).await?;

    let mut delivered = 0u64;
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Message(chunk) => {
                sink.write_chunk(&chunk).await?;
                delivered += chunk.len() as u64;
            }
            LinkEvent::Opened => {}
            LinkEvent::Closed => {
                debug!("stream link of rover '{rover_id}' closed");
                break;
            }
            LinkEvent::Error(reason) => {
                warn!("stream link of rover '{rover_id}' failed: {reason}");
                break;
            }
        }
    }
    sink.finish().await?;
    info!("stream of rover '{rover_id}' finished after {delivered} bytes");
    Ok(delivered)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
