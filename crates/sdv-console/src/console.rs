//! [`ControlConsole`] – the operator-facing façade.
//!
//! Owns the single [`TransportSession`] and every channel built on it, and
//! turns operator actions (buttons, waypoint selector, goal form, teleop
//! toggle, direction pad, map controls) into channel calls.
//!
//! Construction is pure: [`ControlConsole::new`] wires nothing to the
//! outside world. The caller feeds link events back through
//! [`ControlConsole::handle_link_event`] and reads operator feedback from the
//! [`EventBus`]:
//!
//! | Lane | Events |
//! |---|---|
//! | `Connection` | `ConnectionChanged` on every health transition |
//! | `Telemetry` | `PoseReadout` per pose sample |
//! | `Operator` | `GoalDispatched`, `GoalCancelled`, `TeleopArmed`, `Rejected` |
//!
//! Every refused action is returned as an error **and** emitted as
//! `Rejected`, so the UI can flash it without inspecting return values.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sdv_middleware::{Connector, EventBus, LinkEvent, TransportSession};
use sdv_types::{
    ConnectionId, ConnectionState, ConsoleError, Direction, GoalTarget, OperatorFeedback, Twist,
};
use tracing::{debug, info, warn};

use crate::config::ConsoleConfig;
use crate::goal::{GoalChannel, parse_goal_input};
use crate::telemetry::{BusDisplaySink, TelemetryChannel};
use crate::teleop::TeleopController;
use crate::viewport::{MapRenderer, RenderSurface, ViewPortAdapter, ViewTransform};
use crate::waypoint;

const SOURCE: &str = "sdv-console::console";

/// Point-in-time summary for the status panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleStatus {
    pub state: ConnectionState,
    pub endpoint: String,
    pub connection: Option<ConnectionId>,
    pub last_seen: Option<DateTime<Utc>>,
    pub teleop_armed: bool,
    pub held: Vec<Direction>,
    pub last_goal_sequence: u32,
    pub view: ViewTransform,
    pub map_bound: bool,
    pub samples_shown: u64,
    pub decode_errors: u64,
}

pub struct ControlConsole {
    config: ConsoleConfig,
    bus: Arc<EventBus>,
    connector: Box<dyn Connector>,
    transport: TransportSession,
    goals: GoalChannel,
    telemetry: TelemetryChannel,
    teleop: TeleopController,
    viewport: ViewPortAdapter,
}

impl ControlConsole {
    pub fn new(
        config: ConsoleConfig,
        bus: Arc<EventBus>,
        connector: Box<dyn Connector>,
        renderer: Box<dyn MapRenderer>,
    ) -> Self {
        let mut transport = TransportSession::new();
        let banner = Arc::clone(&bus);
        transport.on_state_change(move |change| {
            banner.emit(
                "sdv-console::transport",
                OperatorFeedback::ConnectionChanged {
                    state: change.state,
                    diagnostic: change.diagnostic.clone(),
                },
            );
        });

        let goals = GoalChannel::new(&config.topics, config.frame_id.clone());
        let telemetry = TelemetryChannel::new(
            config.topics.pose.clone(),
            Arc::new(BusDisplaySink::new(Arc::clone(&bus))),
        );
        let teleop = TeleopController::new(config.topics.velocity.clone(), config.teleop);
        let viewport = ViewPortAdapter::new(
            renderer,
            RenderSurface::square(config.map_width),
            &config.topics,
        );

        Self {
            config,
            bus,
            connector,
            transport,
            goals,
            telemetry,
            teleop,
            viewport,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportSession {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Open a fresh Connection to the configured bridge and start dialing.
    ///
    /// The pose readout is subscribed right away; the subscription goes out
    /// on the wire once the link is up.
    pub fn connect(&mut self) -> Result<ConnectionId, ConsoleError> {
        let endpoint = self.config.endpoint();
        let connection = self
            .transport
            .open(&endpoint)
            .map_err(|e| self.reject("connect", e))?;
        if let Err(e) = self.telemetry.attach(&mut self.transport) {
            warn!(error = %e, "telemetry not attached");
        }
        self.connector.dial(&endpoint, connection);
        Ok(connection)
    }

    /// Close the current Connection. A moving teleop pad is stopped first.
    pub fn disconnect(&mut self) {
        if self.teleop.is_armed() {
            if let Err(e) = self.teleop.arm(&mut self.transport, false) {
                warn!(error = %e, "teleop stop before disconnect failed");
            }
            self.bus.emit(SOURCE, OperatorFeedback::TeleopArmed(false));
        }
        self.transport.close();
        self.after_transition();
    }

    /// Feed one event from the link driver.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        self.transport.handle(event);
        self.after_transition();
    }

    fn after_transition(&mut self) {
        if self.transport.is_open() {
            self.viewport.sync(&self.transport);
        } else if self.transport.state().is_terminal() && self.teleop.is_armed() {
            self.teleop.reset();
            self.bus.emit(SOURCE, OperatorFeedback::TeleopArmed(false));
        }
    }

    // -----------------------------------------------------------------------
    // Goals
    // -----------------------------------------------------------------------

    /// Emergency stop: cancel the current goal and, when the pad is armed,
    /// command zero velocity.
    pub fn emergency_stop(&mut self) -> Result<(), ConsoleError> {
        self.require_open("emergency stop")?;
        self.goals
            .cancel_goal(&mut self.transport)
            .map_err(|e| self.reject("emergency stop", e))?;
        if self.teleop.is_armed() {
            self.teleop
                .stop(&mut self.transport)
                .map_err(|e| self.reject("emergency stop", e))?;
        }
        warn!("emergency stop");
        self.bus.emit(SOURCE, OperatorFeedback::GoalCancelled);
        Ok(())
    }

    /// Dispatch the goal stored under `label`.
    ///
    /// Unknown labels are ignored and yield `Ok(None)`.
    pub fn send_waypoint(&mut self, label: &str) -> Result<Option<u32>, ConsoleError> {
        let Some(target) = waypoint::lookup(label) else {
            debug!(label, "unknown waypoint ignored");
            return Ok(None);
        };
        self.dispatch(target, Some(label.trim().to_string())).map(Some)
    }

    /// Dispatch a goal typed into the free-form form.
    pub fn send_goal_input(&mut self, x: &str, y: &str, w: &str) -> Result<u32, ConsoleError> {
        let target = parse_goal_input(x, y, w).map_err(|e| self.reject("goal", e))?;
        self.dispatch(target, None)
    }

    pub fn send_goal(&mut self, target: GoalTarget) -> Result<u32, ConsoleError> {
        self.dispatch(target, None)
    }

    fn dispatch(&mut self, target: GoalTarget, waypoint: Option<String>) -> Result<u32, ConsoleError> {
        if self.teleop.is_armed() {
            return Err(self.reject("goal", ConsoleError::TeleopActive));
        }
        let sequence = self
            .goals
            .send_goal(&mut self.transport, target)
            .map_err(|e| self.reject("goal", e))?;
        self.bus
            .emit(SOURCE, OperatorFeedback::GoalDispatched { sequence, waypoint });
        Ok(sequence)
    }

    // -----------------------------------------------------------------------
    // Teleoperation
    // -----------------------------------------------------------------------

    /// Arm or disarm the direction pad.
    ///
    /// Arming cancels the active goal first, so at most one of goal
    /// navigation and teleoperation drives the vehicle.
    pub fn set_teleop_armed(&mut self, flag: bool) -> Result<(), ConsoleError> {
        if flag == self.teleop.is_armed() {
            return Ok(());
        }
        if flag {
            self.require_open("teleop")?;
            self.goals
                .cancel_goal(&mut self.transport)
                .map_err(|e| self.reject("teleop", e))?;
            self.bus.emit(SOURCE, OperatorFeedback::GoalCancelled);
            self.teleop
                .arm(&mut self.transport, true)
                .map_err(|e| self.reject("teleop", e))?;
        } else {
            let stopped = self.teleop.arm(&mut self.transport, false);
            self.bus.emit(SOURCE, OperatorFeedback::TeleopArmed(false));
            return stopped.map_err(|e| self.reject("teleop", e));
        }
        info!("goal dispatch suppressed while teleop is armed");
        self.bus.emit(SOURCE, OperatorFeedback::TeleopArmed(true));
        Ok(())
    }

    /// Forward a key-down to the pad.
    ///
    /// A disarmed pad accepts the press without publishing, connected or
    /// not. An armed pad needs an `Open` transport.
    pub fn direction_pressed(&mut self, direction: Direction) -> Result<Option<Twist>, ConsoleError> {
        if self.teleop.is_armed() {
            self.require_open("teleop")?;
        }
        self.teleop
            .press(&mut self.transport, direction)
            .map_err(|e| self.reject("teleop", e))
    }

    pub fn direction_released(&mut self, direction: Direction) -> Result<Option<Twist>, ConsoleError> {
        self.teleop
            .release(&mut self.transport, direction)
            .map_err(|e| self.reject("teleop", e))
    }

    // -----------------------------------------------------------------------
    // Map view
    // -----------------------------------------------------------------------

    pub fn zoom_in(&mut self) -> ViewTransform {
        self.viewport.zoom_in()
    }

    pub fn zoom_out(&mut self) -> ViewTransform {
        self.viewport.zoom_out()
    }

    pub fn pan(&mut self, direction: Direction) -> ViewTransform {
        self.viewport.pan(direction)
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn status(&self) -> ConsoleStatus {
        let connection = self.transport.connection_id();
        ConsoleStatus {
            state: self.transport.state(),
            endpoint: self.config.endpoint(),
            connection,
            last_seen: self.transport.last_seen(),
            teleop_armed: self.teleop.is_armed(),
            held: self.teleop.held().to_vec(),
            last_goal_sequence: self.goals.last_sequence(),
            view: self.viewport.view(),
            map_bound: connection.is_some() && self.viewport.bound_connection() == connection,
            samples_shown: self.telemetry.samples_shown(),
            decode_errors: self.telemetry.decode_errors(),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn require_open(&self, action: &str) -> Result<(), ConsoleError> {
        if self.transport.is_open() {
            Ok(())
        } else {
            Err(self.reject(action, ConsoleError::NotConnected))
        }
    }

    /// Report a refused action to the operator and hand the error back.
    fn reject(&self, action: &str, error: ConsoleError) -> ConsoleError {
        warn!(action, error = %error, "operator action rejected");
        self.bus.emit(
            SOURCE,
            OperatorFeedback::Rejected {
                action: action.to_string(),
                reason: error.to_string(),
            },
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::LogRenderer;
    use sdv_middleware::{Lane, LaneReceiver, MemoryLink};
    use sdv_types::Event;
    use std::sync::Mutex;

    type Dials = Arc<Mutex<Vec<(String, ConnectionId)>>>;

    struct RecordingConnector(Dials);

    impl Connector for RecordingConnector {
        fn dial(&self, endpoint: &str, connection: ConnectionId) {
            self.0.lock().unwrap().push((endpoint.to_string(), connection));
        }
    }

    struct Harness {
        console: ControlConsole,
        dials: Dials,
        bus: Arc<EventBus>,
    }

    fn harness() -> Harness {
        let bus = Arc::new(EventBus::default());
        let dials: Dials = Arc::new(Mutex::new(Vec::new()));
        let mut config = ConsoleConfig::default();
        config.bridge_host = "sdv.local".into();
        let console = ControlConsole::new(
            config,
            Arc::clone(&bus),
            Box::new(RecordingConnector(Arc::clone(&dials))),
            Box::new(LogRenderer::new()),
        );
        Harness { console, dials, bus }
    }

    /// Connect and complete the handshake; returns the recording link.
    fn connected(h: &mut Harness) -> (ConnectionId, MemoryLink) {
        let id = h.console.connect().unwrap();
        let link = MemoryLink::new();
        h.console.handle_link_event(LinkEvent::opened(id, link.clone()));
        (id, link)
    }

    fn drain(rx: &mut LaneReceiver) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    fn publishes(link: &MemoryLink) -> usize {
        link.json_frames().iter().filter(|f| f["op"] == "publish").count()
    }

    #[test]
    fn connect_dials_configured_endpoint_once() {
        let mut h = harness();
        let id = h.console.connect().unwrap();
        assert_eq!(
            h.dials.lock().unwrap().as_slice(),
            &[("ws://sdv.local:9090".to_string(), id)]
        );
        assert_eq!(h.console.connect(), Err(ConsoleError::AlreadyConnected));
        assert_eq!(h.dials.lock().unwrap().len(), 1);
    }

    #[test]
    fn every_action_before_open_is_not_connected_and_flagged() {
        let mut h = harness();
        let mut operator = h.bus.subscribe_to(Lane::Operator);
        h.console.connect().unwrap();

        assert_eq!(h.console.emergency_stop(), Err(ConsoleError::NotConnected));
        assert_eq!(h.console.send_waypoint("Home"), Err(ConsoleError::NotConnected));
        assert_eq!(h.console.send_goal_input("1", "2", "1"), Err(ConsoleError::NotConnected));
        assert_eq!(h.console.set_teleop_armed(true), Err(ConsoleError::NotConnected));

        let rejected = drain(&mut operator)
            .into_iter()
            .filter(|e| matches!(e.payload, OperatorFeedback::Rejected { .. }))
            .count();
        assert_eq!(rejected, 4);
        assert_eq!(h.console.status().last_goal_sequence, 0);
    }

    #[test]
    fn connection_banners_follow_transitions() {
        let mut h = harness();
        let mut banners = h.bus.subscribe_to(Lane::Connection);
        connected(&mut h);
        h.console.disconnect();

        let states: Vec<ConnectionState> = drain(&mut banners)
            .into_iter()
            .filter_map(|e| match e.payload {
                OperatorFeedback::ConnectionChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Open,
                ConnectionState::Closed
            ]
        );
    }

    #[test]
    fn link_failure_reports_diagnostic() {
        let mut h = harness();
        let mut banners = h.bus.subscribe_to(Lane::Connection);
        let id = h.console.connect().unwrap();
        h.console.handle_link_event(LinkEvent::failed(id, "connection refused"));

        let last = drain(&mut banners).pop().unwrap();
        assert_eq!(
            last.payload,
            OperatorFeedback::ConnectionChanged {
                state: ConnectionState::Error,
                diagnostic: Some("connection refused".into()),
            }
        );
        // A fresh, user-initiated connect is allowed after an error.
        assert!(h.console.connect().is_ok());
    }

    #[test]
    fn home_waypoint_goal() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        assert_eq!(h.console.send_waypoint("Home"), Ok(Some(1)));

        let goal = &link.published_on("/move_base_simple/goal")[0];
        assert_eq!(goal["pose"]["position"]["x"], 0.0);
        assert_eq!(goal["pose"]["position"]["y"], 0.0);
        assert_eq!(goal["pose"]["orientation"]["z"], 0.0);
        assert_eq!(goal["pose"]["orientation"]["w"], 1.0);
    }

    #[test]
    fn celda_industrial_waypoint_goal() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        h.console.send_waypoint("Celda Industrial").unwrap();

        let goal = &link.published_on("/move_base_simple/goal")[0];
        assert_eq!(goal["pose"]["position"]["x"], 6.76584243774);
        assert_eq!(goal["pose"]["position"]["y"], 3.13956570625);
        assert_eq!(goal["pose"]["orientation"]["z"], 1.0);
        assert_eq!(goal["pose"]["orientation"]["w"], 0.0);
    }

    #[test]
    fn unknown_waypoint_is_a_no_op() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        let mut operator = h.bus.subscribe_to(Lane::Operator);
        assert_eq!(h.console.send_waypoint("Cafeteria"), Ok(None));
        assert_eq!(publishes(&link), 0);
        assert!(drain(&mut operator).is_empty());
    }

    #[test]
    fn non_numeric_goal_input_never_publishes() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        let mut operator = h.bus.subscribe_to(Lane::Operator);

        assert!(matches!(
            h.console.send_goal_input("abc", "1", "1"),
            Err(ConsoleError::InvalidInput(_))
        ));
        assert_eq!(publishes(&link), 0);
        let events = drain(&mut operator);
        assert!(matches!(
            &events[0].payload,
            OperatorFeedback::Rejected { action, .. } if action == "goal"
        ));
    }

    #[test]
    fn goal_sequence_strictly_increases() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        let mut operator = h.bus.subscribe_to(Lane::Operator);
        assert_eq!(h.console.send_goal_input("1", "2", "1"), Ok(1));
        assert_eq!(h.console.send_waypoint("Home"), Ok(Some(2)));
        assert_eq!(publishes(&link), 2);

        let events = drain(&mut operator);
        assert_eq!(
            events[1].payload,
            OperatorFeedback::GoalDispatched {
                sequence: 2,
                waypoint: Some("Home".into())
            }
        );
    }

    #[test]
    fn emergency_stop_cancels_with_empty_id() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        h.console.emergency_stop().unwrap();

        let cancels = link.published_on("/move_base/cancel");
        assert_eq!(cancels.len(), 1);
        assert_eq!(cancels[0]["id"], "");
        assert!(link.published_on("/mobile_base/commands/velocity").is_empty());
    }

    #[test]
    fn emergency_stop_also_halts_teleop() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        h.console.set_teleop_armed(true).unwrap();
        h.console.direction_pressed(Direction::Up).unwrap();
        h.console.emergency_stop().unwrap();

        let velocities = link.published_on("/mobile_base/commands/velocity");
        assert_eq!(velocities.last().unwrap()["linear"]["x"], 0.0);
        assert!(h.console.status().teleop_armed);
    }

    #[test]
    fn arming_teleop_cancels_goal_and_blocks_dispatch() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        h.console.send_waypoint("Home").unwrap();
        h.console.set_teleop_armed(true).unwrap();
        assert_eq!(link.published_on("/move_base/cancel").len(), 1);

        assert_eq!(h.console.send_waypoint("Home"), Err(ConsoleError::TeleopActive));
        assert_eq!(link.published_on("/move_base_simple/goal").len(), 1);

        h.console.set_teleop_armed(false).unwrap();
        assert_eq!(h.console.send_waypoint("Home"), Ok(Some(2)));
    }

    #[test]
    fn disarmed_press_is_accepted_offline_without_publish() {
        let mut h = harness();
        let mut operator = h.bus.subscribe_to(Lane::Operator);
        h.console.connect().unwrap();

        assert_eq!(h.console.direction_pressed(Direction::Up), Ok(None));
        assert_eq!(h.console.direction_released(Direction::Up), Ok(None));
        assert!(drain(&mut operator).is_empty());
        assert!(h.console.status().held.is_empty());
    }

    #[test]
    fn armed_pad_holding_opposites_commands_zero() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        h.console.set_teleop_armed(true).unwrap();
        h.console.direction_pressed(Direction::Up).unwrap();
        h.console.direction_pressed(Direction::Down).unwrap();

        let velocities = link.published_on("/mobile_base/commands/velocity");
        assert_eq!(velocities.len(), 2);
        assert_eq!(velocities[1]["linear"]["x"], 0.0);
    }

    #[test]
    fn teleop_press_publishes_once_per_press_until_release() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        h.console.set_teleop_armed(true).unwrap();
        h.console.direction_pressed(Direction::Up).unwrap();

        let velocities = link.published_on("/mobile_base/commands/velocity");
        assert_eq!(velocities.len(), 1);
        assert_eq!(velocities[0]["linear"]["x"], 0.3);

        h.console.direction_released(Direction::Up).unwrap();
        let velocities = link.published_on("/mobile_base/commands/velocity");
        assert_eq!(velocities.len(), 2);
        assert_eq!(velocities[1]["linear"]["x"], 0.0);
    }

    #[test]
    fn disconnect_while_moving_stops_first() {
        let mut h = harness();
        let (_, link) = connected(&mut h);
        h.console.set_teleop_armed(true).unwrap();
        h.console.direction_pressed(Direction::Left).unwrap();
        h.console.disconnect();

        let velocities = link.published_on("/mobile_base/commands/velocity");
        assert_eq!(velocities.last().unwrap()["angular"]["z"], 0.0);
        assert!(link.is_closed());
        assert!(!h.console.status().teleop_armed);
    }

    #[test]
    fn connection_loss_disarms_teleop() {
        let mut h = harness();
        let (id, _) = connected(&mut h);
        h.console.set_teleop_armed(true).unwrap();
        h.console.handle_link_event(LinkEvent::failed(id, "reset by peer"));
        assert!(!h.console.status().teleop_armed);
        assert_eq!(h.console.status().state, ConnectionState::Error);
    }

    #[test]
    fn pose_samples_reach_the_telemetry_lane() {
        let mut h = harness();
        let mut readouts = h.bus.subscribe_to(Lane::Telemetry);
        let id = h.console.connect().unwrap();
        let link = MemoryLink::new();
        h.console.handle_link_event(LinkEvent::opened(id, link.clone()));
        assert_eq!(link.json_frames()[0]["op"], "subscribe");
        assert_eq!(link.json_frames()[0]["topic"], "/scanmatch_odom");

        h.console.handle_link_event(LinkEvent::frame(
            id,
            r#"{"op":"publish","topic":"/scanmatch_odom","msg":{"pose":{"pose":{"position":{"x":1.0,"y":2.0,"z":0.0},"orientation":{"x":0.0,"y":0.0,"z":0.0,"w":1.0}}}}}"#,
        ));
        let events = drain(&mut readouts);
        assert_eq!(
            events[0].payload,
            OperatorFeedback::PoseReadout("X: 1.00\nY: 2.00\nZ: 0.00\nW: 1.00\n".into())
        );
        assert_eq!(h.console.status().samples_shown, 1);
    }

    #[test]
    fn map_is_bound_once_open() {
        let mut h = harness();
        h.console.connect().unwrap();
        assert!(!h.console.status().map_bound);
        let mut h = harness();
        connected(&mut h);
        assert!(h.console.status().map_bound);

        let view = h.console.zoom_in();
        assert_eq!(view.zoom_steps(), 1);
        assert_eq!(h.console.pan(Direction::Down).vertical_steps(), 1);
        assert_eq!(h.console.zoom_out().zoom_steps(), 0);
    }
}
