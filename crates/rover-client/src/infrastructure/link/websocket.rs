//! WebSocket link adapter.
//!
//! [`connect`] performs the WebSocket upgrade and then runs two tasks per
//! connection:
//!
//! - **Reader** – reads frames from the socket and forwards every text or
//!   binary payload as [`LinkEvent::Message`].  It emits exactly one
//!   terminal event (`Closed` or `Error`) and then exits.
//! - **Writer** – drains an unbounded queue filled by [`WebSocketLink::send`]
//!   and writes each item to the socket.
//!
//! # Why the queue? (for beginners)
//!
//! The session state machines are synchronous: `WireLink::send` cannot
//! `.await`.  Pushing onto an unbounded `mpsc` channel never blocks, so the
//! synchronous side can hand bytes to the async writer task and return
//! immediately.  The open flag is an `AtomicBool` shared by the handle and
//! both tasks so that `is_open` is answered without any locking.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest, http::HeaderValue, Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, info, warn};

use crate::application::wire_link::{LinkError, LinkEvent, WireLink};

/// Items queued for the writer task.
#[derive(Debug)]
enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Send handle onto one WebSocket connection.
///
/// Dropping the handle closes the connection once the queue drains.
#[derive(Debug)]
pub struct WebSocketLink {
    url: String,
    outbound: UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl WireLink for WebSocketLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn send(&mut self, bytes: Vec<u8>) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        self.outbound.send(Outbound::Frame(bytes)).map_err(|_| {
            self.open.store(false, Ordering::Release);
            LinkError::Closed
        })
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!("closing link to {}", self.url);
            // The writer may already be gone; nothing left to close then.
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

/// Opens a WebSocket to `url` and starts its reader and writer tasks.
///
/// `subprotocol`, when given, is offered in the `Sec-WebSocket-Protocol`
/// header; the server must accept it or the upgrade fails.
///
/// The returned receiver yields [`LinkEvent::Opened`] first, then inbound
/// messages, then exactly one `Closed` or `Error`.
///
/// # Errors
///
/// Returns [`LinkError::Connect`] if the URL is invalid or the upgrade fails.
pub async fn connect(
    url: &str,
    subprotocol: Option<&str>,
) -> Result<(WebSocketLink, UnboundedReceiver<LinkEvent>), LinkError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| LinkError::Connect(format!("invalid url {url}: {e}")))?;
    if let Some(protocol) = subprotocol {
        let value = HeaderValue::from_str(protocol)
            .map_err(|e| LinkError::Connect(format!("invalid sub-protocol {protocol:?}: {e}")))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }

    let (ws_stream, _response) = connect_async(request)
        .await
        .map_err(|e| LinkError::Connect(format!("{url}: {e}")))?;
    info!("link to {url} open");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (events_tx, events_rx) = unbounded_channel();
    let (outbound_tx, mut outbound_rx) = unbounded_channel::<Outbound>();
    let open = Arc::new(AtomicBool::new(true));

    // The receiver is still held here, so this cannot fail.
    let _ = events_tx.send(LinkEvent::Opened);

    // ── Writer task ───────────────────────────────────────────────────────────
    let url_writer = url.to_string();
    let open_writer = Arc::clone(&open);
    tokio::spawn(async move {
        loop {
            // A dropped handle closes the connection like an explicit close.
            match outbound_rx.recv().await.unwrap_or(Outbound::Close) {
                Outbound::Frame(bytes) => {
                    let message = match String::from_utf8(bytes) {
                        Ok(text) => WsMessage::Text(text),
                        Err(e) => WsMessage::Binary(e.into_bytes()),
                    };
                    if let Err(e) = ws_tx.send(message).await {
                        warn!("send to {url_writer} failed: {e}");
                        open_writer.store(false, Ordering::Release);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    let _ = ws_tx.close().await;
                    break;
                }
            }
        }
        debug!("writer for {url_writer} finished");
    });

    // ── Reader task ───────────────────────────────────────────────────────────
    let url_reader = url.to_string();
    let open_reader = Arc::clone(&open);
    tokio::spawn(async move {
        let terminal = loop {
            match ws_rx.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if events_tx.send(LinkEvent::Message(text.into_bytes())).is_err() {
                        break None;
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    if events_tx.send(LinkEvent::Message(bytes)).is_err() {
                        break None;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("close frame from {url_reader}: {frame:?}");
                    break Some(LinkEvent::Closed);
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    break Some(LinkEvent::Closed);
                }
                Some(Err(e)) => {
                    warn!("link to {url_reader} failed: {e}");
                    break Some(LinkEvent::Error(e.to_string()));
                }
            }
        };
        open_reader.store(false, Ordering::Release);
        info!("link to {url_reader} closed");
        if let Some(event) = terminal {
            let _ = events_tx.send(event);
        }
    });

    Ok((
        WebSocketLink {
            url: url.to_string(),
            outbound: outbound_tx,
            open,
        },
        events_rx,
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
