//! [`TransportSession`] – owner of the single bridge connection.
//!
//! The session multiplexes every topic of the console over one rosbridge
//! connection and tracks its health:
//!
//! ```text
//! Connecting ──▶ Open ──▶ Closed
//!      │           │
//!      └──▶ Error ◀┘
//! ```
//!
//! `Error` and `Closed` are terminal for a Connection; `open()` after that
//! creates a fresh one with a new [`ConnectionId`]. Link events carrying an
//! older id are ignored.
//!
//! The session is sans-IO. Outbound frames go to the [`Link`] delivered by
//! [`LinkEventKind::Opened`]; inbound frames are fed back through
//! [`TransportSession::handle`], which dispatches rosbridge `publish`
//! operations to the handlers subscribed on that topic, in arrival order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sdv_types::{ConnectionId, ConnectionState, ConsoleError, StateChange};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::link::{Link, LinkEvent, LinkEventKind};
use crate::rosbridge::{self, Operation};

/// Receives every message published on a subscribed topic.
///
/// Handlers run while the session is borrowed, so they cannot publish or
/// subscribe from inside `on_message`.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, topic: &str, msg: &Value);
}

type StateObserver = Box<dyn FnMut(&StateChange) + Send>;

struct Subscription {
    msg_type: String,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

struct Connection {
    id: ConnectionId,
    endpoint: String,
    state: ConnectionState,
    last_seen: DateTime<Utc>,
    link: Option<Box<dyn Link>>,
    advertised: BTreeSet<String>,
    subscriptions: BTreeMap<String, Subscription>,
}

impl Connection {
    fn send(&mut self, op: &Operation) -> Result<(), ConsoleError> {
        let frame = rosbridge::encode(op)?;
        match self.link.as_mut() {
            Some(link) => link.send_text(frame),
            None => Err(ConsoleError::NotConnected),
        }
    }

    /// Tear down the link and everything bound to this Connection.
    fn release(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.advertised.clear();
        self.subscriptions.clear();
    }
}

/// Owner of the bridge connection and of its topic multiplexing.
#[derive(Default)]
pub struct TransportSession {
    connection: Option<Connection>,
    observers: Vec<StateObserver>,
}

impl TransportSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer called on every health-state transition.
    pub fn on_state_change(&mut self, observer: impl FnMut(&StateChange) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start a fresh Connection to `endpoint` in the `Connecting` state.
    ///
    /// The caller is responsible for dialing the link (see
    /// [`Connector`][crate::link::Connector]) with the returned id.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::AlreadyConnected`] while a Connection is still live.
    pub fn open(&mut self, endpoint: &str) -> Result<ConnectionId, ConsoleError> {
        if self.state().is_live() {
            return Err(ConsoleError::AlreadyConnected);
        }
        let id = ConnectionId::new();
        info!(connection = %id, endpoint, "opening bridge connection");
        self.connection = Some(Connection {
            id,
            endpoint: endpoint.to_string(),
            state: ConnectionState::Connecting,
            last_seen: Utc::now(),
            link: None,
            advertised: BTreeSet::new(),
            subscriptions: BTreeMap::new(),
        });
        self.notify(id, ConnectionState::Connecting, None);
        Ok(id)
    }

    /// Close the current Connection. Idempotent: no transition is reported
    /// when there is nothing live to close.
    pub fn close(&mut self) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        if conn.state.is_terminal() {
            return;
        }
        conn.release();
        conn.state = ConnectionState::Closed;
        let id = conn.id;
        info!(connection = %id, "bridge connection closed by operator");
        self.notify(id, ConnectionState::Closed, None);
    }

    /// Apply one event observed by the socket driver.
    pub fn handle(&mut self, event: LinkEvent) {
        let Some(conn) = self.connection.as_mut() else {
            debug!(connection = %event.connection, "link event without a connection");
            return;
        };
        if conn.id != event.connection || conn.state.is_terminal() {
            debug!(connection = %event.connection, kind = ?event.kind, "stale link event ignored");
            if let LinkEventKind::Opened(mut link) = event.kind {
                link.close();
            }
            return;
        }

        match event.kind {
            LinkEventKind::Opened(link) => self.link_opened(link),
            LinkEventKind::Frame(text) => self.frame_received(&text),
            LinkEventKind::Failed(diagnostic) => self.link_failed(diagnostic),
            LinkEventKind::Closed => {
                if conn.state == ConnectionState::Connecting {
                    self.link_failed("link closed before handshake completed".to_string());
                } else {
                    conn.release();
                    conn.state = ConnectionState::Closed;
                    let id = conn.id;
                    info!(connection = %id, "bridge connection closed");
                    self.notify(id, ConnectionState::Closed, None);
                }
            }
        }
    }

    fn link_opened(&mut self, link: Box<dyn Link>) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        if conn.state != ConnectionState::Connecting {
            warn!(connection = %conn.id, "duplicate open from link ignored");
            return;
        }
        conn.link = Some(link);
        conn.state = ConnectionState::Open;
        conn.last_seen = Utc::now();

        // Subscriptions registered while connecting go out now.
        let pending: Vec<Operation> = conn
            .subscriptions
            .iter()
            .map(|(topic, sub)| Operation::subscribe(topic, &sub.msg_type))
            .collect();
        for op in &pending {
            if let Err(e) = conn.send(op) {
                warn!(connection = %conn.id, error = %e, "queued subscribe failed");
            }
        }

        let id = conn.id;
        info!(connection = %id, endpoint = %conn.endpoint, "bridge connection open");
        self.notify(id, ConnectionState::Open, None);
    }

    fn link_failed(&mut self, diagnostic: String) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        conn.release();
        conn.state = ConnectionState::Error;
        let id = conn.id;
        error!(connection = %id, diagnostic = %diagnostic, "bridge connection error");
        self.notify(id, ConnectionState::Error, Some(diagnostic));
    }

    fn frame_received(&mut self, text: &str) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        conn.last_seen = Utc::now();

        match rosbridge::decode(text) {
            Ok(Operation::Publish { topic, msg }) => {
                // Clone the handler list so a handler cannot observe a
                // half-updated registry.
                let handlers: Vec<Arc<dyn MessageHandler>> = conn
                    .subscriptions
                    .get(&topic)
                    .map(|sub| sub.handlers.clone())
                    .unwrap_or_default();
                if handlers.is_empty() {
                    debug!(topic = %topic, "message on unsubscribed topic dropped");
                }
                for handler in handlers {
                    handler.on_message(&topic, &msg);
                }
            }
            Ok(Operation::Status { level, msg }) => {
                warn!(level = ?level, msg = ?msg, "bridge status");
            }
            Ok(other) => debug!(op = ?other, "inbound operation ignored"),
            Err(e) => warn!(error = %e, "undecodable frame from bridge"),
        }
    }

    fn notify(&mut self, connection: ConnectionId, state: ConnectionState, diagnostic: Option<String>) {
        let change = StateChange {
            connection,
            state,
            diagnostic,
        };
        for observer in self.observers.iter_mut() {
            observer(&change);
        }
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    /// Health of the current Connection; `Closed` when none was ever opened.
    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.endpoint.as_str())
    }

    /// Time of the last open or inbound frame on the current Connection.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.connection.as_ref().map(|c| c.last_seen)
    }

    // -----------------------------------------------------------------------
    // Topic multiplexing
    // -----------------------------------------------------------------------

    /// Publish `msg` on `topic`, advertising the topic first if this
    /// Connection has not done so yet.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] unless the Connection is `Open`; the
    /// refusal is logged so a dropped command is never silent.
    pub fn publish(&mut self, topic: &str, msg_type: &str, msg: Value) -> Result<(), ConsoleError> {
        if !self.is_open() {
            warn!(topic, state = %self.state(), "publish refused: bridge not open");
            return Err(ConsoleError::NotConnected);
        }
        let Some(conn) = self.connection.as_mut() else {
            return Err(ConsoleError::NotConnected);
        };
        if !conn.advertised.contains(topic) {
            conn.send(&Operation::advertise(topic, msg_type))?;
            conn.advertised.insert(topic.to_string());
        }
        conn.send(&Operation::publish(topic, msg))?;
        debug!(topic, "published");
        Ok(())
    }

    /// Bind `handler` to `topic` for the lifetime of the current Connection.
    ///
    /// Allowed while `Connecting` (the subscribe goes out once `Open`) or
    /// `Open`. Subscribing the same handler twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] when no Connection is live.
    pub fn subscribe(
        &mut self,
        topic: &str,
        msg_type: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), ConsoleError> {
        let conn = match self.connection.as_mut() {
            Some(conn) if conn.state.is_live() => conn,
            _ => return Err(ConsoleError::NotConnected),
        };

        let is_new_topic = !conn.subscriptions.contains_key(topic);
        let sub = conn
            .subscriptions
            .entry(topic.to_string())
            .or_insert_with(|| Subscription {
                msg_type: msg_type.to_string(),
                handlers: Vec::new(),
            });
        if sub.handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            debug!(topic, "handler already subscribed");
            return Ok(());
        }
        sub.handlers.push(handler);

        if is_new_topic && conn.state == ConnectionState::Open {
            conn.send(&Operation::subscribe(topic, msg_type))?;
        }
        debug!(topic, msg_type, "subscribed");
        Ok(())
    }

    /// Remove `handler` from `topic`. The wire subscription is dropped with
    /// the last handler. Unknown handlers are ignored.
    pub fn unsubscribe(&mut self, topic: &str, handler: &Arc<dyn MessageHandler>) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        let Some(sub) = conn.subscriptions.get_mut(topic) else {
            return;
        };
        sub.handlers.retain(|h| !Arc::ptr_eq(h, handler));
        if sub.handlers.is_empty() {
            conn.subscriptions.remove(topic);
            if conn.state == ConnectionState::Open {
                let op = Operation::Unsubscribe {
                    topic: topic.to_string(),
                };
                if let Err(e) = conn.send(&op) {
                    warn!(topic, error = %e, "unsubscribe failed");
                }
            }
        }
    }

    /// Number of distinct handlers bound to `topic` on the current Connection.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.connection
            .as_ref()
            .and_then(|c| c.subscriptions.get(topic))
            .map(|s| s.handlers.len())
            .unwrap_or(0)
    }
}
