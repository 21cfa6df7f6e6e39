//! `sdv-console` – operator console for a self-driving vehicle (SDV).
//!
//! Builds the operator's controls on top of the single bridge connection
//! owned by [`sdv_middleware::TransportSession`]:
//!
//! | Module | Role |
//! |---|---|
//! | [`goal`] | Goal dispatch and cancellation |
//! | [`waypoint`] | Fixed label → goal pose table |
//! | [`telemetry`] | Live pose readout |
//! | [`teleop`] | Direction-pad velocity control |
//! | [`viewport`] | Map renderer binding, zoom and pan |
//! | [`console`] | [`ControlConsole`], the façade the UI talks to |
//! | [`config`] | [`ConsoleConfig`] |
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sdv_console::{ConsoleConfig, ControlConsole, LogRenderer};
//! use sdv_middleware::{EventBus, WsConnector};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let bus = Arc::new(EventBus::default());
//!     let mut console = ControlConsole::new(
//!         ConsoleConfig::default(),
//!         bus,
//!         Box::new(WsConnector::new(events_tx)),
//!         Box::new(LogRenderer::new()),
//!     );
//!     console.connect().expect("connect");
//!     while let Some(event) = events_rx.recv().await {
//!         console.handle_link_event(event);
//!     }
//! }
//! ```

pub mod config;
pub mod console;
pub mod goal;
pub mod telemetry;
pub mod teleop;
pub mod viewport;
pub mod waypoint;

pub use config::{ConsoleConfig, TeleopScales, TopicNames};
pub use console::{ConsoleStatus, ControlConsole};
pub use goal::{GoalChannel, parse_goal_input};
pub use telemetry::{BusDisplaySink, DisplaySink, TelemetryChannel};
pub use teleop::TeleopController;
pub use viewport::{LogRenderer, MapBinding, MapRenderer, RenderSurface, ViewPortAdapter, ViewTransform};
