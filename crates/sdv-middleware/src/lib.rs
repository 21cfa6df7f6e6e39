//! `sdv-middleware` – the command/telemetry multiplexing layer.
//!
//! Owns the single connection to the vehicle's rosbridge server and maps it
//! onto independent, typed topics without caring about their meaning.
//!
//! # Modules
//!
//! - [`transport`] – [`TransportSession`]: connection lifecycle, health
//!   state machine, observer registry and topic multiplexing.
//! - [`topic`] – [`TopicChannel`]: typed publish/subscribe handle bound to a
//!   topic name and ROS message type.
//! - [`rosbridge`] – rosbridge v2 JSON framing.
//! - [`link`] – the [`Link`] / [`Connector`] seam and the in-memory
//!   [`MemoryLink`].
//! - [`ws_link`] – [`WsConnector`]: the `tokio-tungstenite` WebSocket driver.
//! - [`bus`] – [`EventBus`]: operator feedback on Tokio broadcast lanes.

pub mod bus;
pub mod link;
pub mod rosbridge;
pub mod topic;
pub mod transport;
pub mod ws_link;

pub use bus::{EventBus, Lane, LaneReceiver};
pub use link::{Connector, Link, LinkEvent, LinkEventKind, MemoryLink};
pub use topic::TopicChannel;
pub use transport::{MessageHandler, TransportSession};
pub use ws_link::{LinkEventSender, WsConnector};
