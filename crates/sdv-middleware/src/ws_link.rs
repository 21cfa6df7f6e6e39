//! rosbridge WebSocket link built on `tokio-tungstenite`.
//!
//! [`WsConnector::dial`] spawns one task per Connection:
//!
//! 1. connect to the endpoint and report `Opened` (with a [`WsLink`]) or
//!    `Failed`;
//! 2. forward every inbound text frame as `Frame`, in arrival order;
//! 3. report `Closed` or `Failed` when the socket goes away.
//!
//! Outbound frames are queued on an unbounded channel and written by a
//! dedicated writer task, so [`Link::send_text`] never blocks the console and
//! frames keep their call order.

use futures_util::{SinkExt, StreamExt};
use sdv_types::{ConnectionId, ConsoleError};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, warn};

use crate::link::{Connector, Link, LinkEvent};

/// Sender half used by the driver tasks to report [`LinkEvent`]s.
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// [`Connector`] that dials real rosbridge WebSocket servers.
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct WsConnector {
    events: LinkEventSender,
}

impl WsConnector {
    pub fn new(events: LinkEventSender) -> Self {
        Self { events }
    }
}

impl Connector for WsConnector {
    fn dial(&self, endpoint: &str, connection: ConnectionId) {
        let events = self.events.clone();
        let endpoint = endpoint.to_string();
        tokio::spawn(async move {
            drive(endpoint, connection, events).await;
        });
    }
}

/// Outbound half of a live WebSocket.
pub struct WsLink {
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

impl Link for WsLink {
    fn send_text(&mut self, text: String) -> Result<(), ConsoleError> {
        let Some(outbound) = self.outbound.as_ref() else {
            return Err(ConsoleError::Connection("websocket link closed".into()));
        };
        outbound
            .send(Message::Text(text.into()))
            .map_err(|_| ConsoleError::Connection("websocket writer stopped".into()))
    }

    fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(None));
        }
    }
}

async fn drive(endpoint: String, connection: ConnectionId, events: LinkEventSender) {
    let ws_stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            error!(connection = %connection, endpoint = %endpoint, error = %e, "ws connect failed");
            let _ = events.send(LinkEvent::failed(connection, e.to_string()));
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    // ── Writer: console → bridge ────────────────────────────────────────────
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if let Err(e) = ws_tx.send(message).await {
                warn!(connection = %connection, error = %e, "ws write failed");
                break;
            }
            if is_close {
                break;
            }
        }
    });

    if events
        .send(LinkEvent::opened(connection, WsLink { outbound: Some(out_tx) }))
        .is_err()
    {
        // Nobody is listening any more; the console is gone.
        return;
    }

    // ── Reader: bridge → console ────────────────────────────────────────────
    let outcome = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                if events.send(LinkEvent::frame(connection, text.as_str())).is_err() {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(connection = %connection, frame = ?frame, "ws close frame");
                break LinkEvent::closed(connection);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break LinkEvent::failed(connection, e.to_string()),
            None => break LinkEvent::closed(connection),
        }
    };
    let _ = events.send(outcome);
}
