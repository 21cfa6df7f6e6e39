//! The link seam between the transport session and the actual wire.
//!
//! The [`TransportSession`][crate::transport::TransportSession] never touches
//! a socket. It hands outbound text frames to a [`Link`] and consumes
//! [`LinkEvent`]s produced by whoever drives the socket. A [`Connector`]
//! starts that driver for a freshly opened Connection.
//!
//! - [`WsConnector`][crate::ws_link::WsConnector] – drives a rosbridge
//!   WebSocket with `tokio-tungstenite`.
//! - [`MemoryLink`] – records frames in memory, for offline use and tests.

use std::fmt;
use std::sync::{Arc, Mutex};

use sdv_types::{ConnectionId, ConsoleError};

/// Outbound half of an established connection.
///
/// Sending is fire-and-forget: frames handed to `send_text` must reach the
/// wire in call order, but delivery is not acknowledged.
pub trait Link: Send {
    /// Queue one text frame for the wire.
    fn send_text(&mut self, text: String) -> Result<(), ConsoleError>;

    /// Close the link. Must be safe to call more than once.
    fn close(&mut self);
}

/// Starts the socket driver for a Connection.
///
/// Implementations report progress back as [`LinkEvent`]s tagged with
/// `connection`; `dial` itself must not block.
pub trait Connector {
    fn dial(&self, endpoint: &str, connection: ConnectionId);
}

/// Something the socket driver observed.
pub enum LinkEventKind {
    /// The handshake succeeded; outbound frames go to this link from now on.
    Opened(Box<dyn Link>),
    /// One inbound text frame.
    Frame(String),
    /// The link could not be established or dropped with a diagnostic.
    Failed(String),
    /// The link went away without a diagnostic.
    Closed,
}

impl fmt::Debug for LinkEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEventKind::Opened(_) => write!(f, "Opened(..)"),
            LinkEventKind::Frame(text) => f.debug_tuple("Frame").field(text).finish(),
            LinkEventKind::Failed(diag) => f.debug_tuple("Failed").field(diag).finish(),
            LinkEventKind::Closed => write!(f, "Closed"),
        }
    }
}

/// A [`LinkEventKind`] tagged with the Connection it belongs to.
#[derive(Debug)]
pub struct LinkEvent {
    pub connection: ConnectionId,
    pub kind: LinkEventKind,
}

impl LinkEvent {
    pub fn opened(connection: ConnectionId, link: impl Link + 'static) -> Self {
        Self {
            connection,
            kind: LinkEventKind::Opened(Box::new(link)),
        }
    }

    pub fn frame(connection: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            connection,
            kind: LinkEventKind::Frame(text.into()),
        }
    }

    pub fn failed(connection: ConnectionId, diagnostic: impl Into<String>) -> Self {
        Self {
            connection,
            kind: LinkEventKind::Failed(diagnostic.into()),
        }
    }

    pub fn closed(connection: ConnectionId) -> Self {
        Self {
            connection,
            kind: LinkEventKind::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory link
// ---------------------------------------------------------------------------

/// A [`Link`] that appends every frame to a shared buffer.
///
/// Clones share the buffer, so a test can keep one clone and hand the other
/// to the session.
#[derive(Clone, Default)]
pub struct MemoryLink {
    frames: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every frame sent so far.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Frames parsed as JSON; frames that are not JSON are skipped.
    pub fn json_frames(&self) -> Vec<serde_json::Value> {
        self.frames()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    /// `publish` frames on `topic`, as their `msg` bodies.
    pub fn published_on(&self, topic: &str) -> Vec<serde_json::Value> {
        self.json_frames()
            .into_iter()
            .filter(|f| f["op"] == "publish" && f["topic"] == topic)
            .map(|f| f["msg"].clone())
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(false)
    }
}

impl Link for MemoryLink {
    fn send_text(&mut self, text: String) -> Result<(), ConsoleError> {
        if self.is_closed() {
            return Err(ConsoleError::Connection("memory link closed".into()));
        }
        self.frames
            .lock()
            .map_err(|e| ConsoleError::Channel(format!("memory link poisoned: {e}")))?
            .push(text);
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }
}
