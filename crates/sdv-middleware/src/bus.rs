//! Operator feedback bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! UI surface (banner, pose panel, alert highlight) receives every message
//! without any single subscriber blocking the others or the console.
//!
//! # Lanes
//!
//! | Lane | Typical traffic |
//! |---|---|
//! | [`Lane::Connection`] | Health-state banners (connected / error / closed) |
//! | [`Lane::Telemetry`] | Live pose readouts |
//! | [`Lane::Operator`] | Goal dispatch confirmations, teleop arming, rejections |

use sdv_types::{ConsoleError, Event, OperatorFeedback};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the feedback bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Connection health transitions.
    Connection,
    /// Formatted pose readouts, one per inbound sample.
    Telemetry,
    /// Results of operator actions.
    Operator,
}

impl Lane {
    /// The lane an event of this kind belongs on.
    pub fn of(feedback: &OperatorFeedback) -> Lane {
        match feedback {
            OperatorFeedback::ConnectionChanged { .. } => Lane::Connection,
            OperatorFeedback::PoseReadout(_) => Lane::Telemetry,
            OperatorFeedback::GoalDispatched { .. }
            | OperatorFeedback::GoalCancelled
            | OperatorFeedback::TeleopArmed(_)
            | OperatorFeedback::Rejected { .. } => Lane::Operator,
        }
    }
}

/// Shared feedback bus. Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    connection: broadcast::Sender<Event>,
    telemetry: broadcast::Sender<Event>,
    operator: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every lane independently.
    pub fn new(capacity: usize) -> Self {
        let (connection, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        let (operator, _) = broadcast::channel(capacity);
        Self {
            connection,
            telemetry,
            operator,
        }
    }

    /// Publish `event` to the given [`Lane`].
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns [`ConsoleError::Channel`] when nobody listens on the lane.
    pub fn publish_to(&self, lane: Lane, event: Event) -> Result<usize, ConsoleError> {
        self.lane_sender(lane)
            .send(event)
            .map_err(|_| ConsoleError::Channel(format!("No subscribers for lane {lane:?}")))
    }

    /// Wrap `feedback` in an [`Event`] from `source` and publish it on the
    /// lane that matches its kind.
    ///
    /// Feedback is best effort: a UI that is not listening is not an error
    /// for the console, so the outcome is only traced.
    pub fn emit(&self, source: &str, feedback: OperatorFeedback) {
        let lane = Lane::of(&feedback);
        if let Err(e) = self.publish_to(lane, Event::new(source, feedback)) {
            tracing::trace!(source, error = %e, "feedback dropped");
        }
    }

    /// Subscribe to a specific [`Lane`].
    pub fn subscribe_to(&self, lane: Lane) -> LaneReceiver {
        LaneReceiver {
            lane,
            receiver: self.lane_sender(lane).subscribe(),
        }
    }

    fn lane_sender(&self, lane: Lane) -> &broadcast::Sender<Event> {
        match lane {
            Lane::Connection => &self.connection,
            Lane::Telemetry => &self.telemetry,
            Lane::Operator => &self.operator,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Lane`].
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct LaneReceiver {
    lane: Lane,
    receiver: broadcast::Receiver<Event>,
}

impl LaneReceiver {
    /// Wait for the next event on this lane.
    ///
    /// Lagging is logged and skipped; `None` means the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lane = ?self.lane, lagged_by = n, "feedback receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll, used by tests and by synchronous UIs.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The [`Lane`] this receiver is bound to.
    pub fn lane(&self) -> Lane {
        self.lane
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdv_types::ConnectionState;

    fn banner(state: ConnectionState) -> OperatorFeedback {
        OperatorFeedback::ConnectionChanged {
            state,
            diagnostic: None,
        }
    }

    #[tokio::test]
    async fn emit_routes_by_feedback_kind() {
        let bus = EventBus::default();
        let mut connection = bus.subscribe_to(Lane::Connection);
        let mut telemetry = bus.subscribe_to(Lane::Telemetry);

        bus.emit("test", banner(ConnectionState::Open));
        bus.emit("test", OperatorFeedback::PoseReadout("X: 1.00\n".into()));

        let event = connection.recv().await.expect("connection event");
        assert_eq!(event.payload, banner(ConnectionState::Open));
        let event = telemetry.recv().await.expect("telemetry event");
        assert!(matches!(event.payload, OperatorFeedback::PoseReadout(_)));
        assert!(connection.try_recv().is_none());
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Lane::Operator);
        let mut rx2 = bus.subscribe_to(Lane::Operator);

        let event = Event::new("sdv-console::goal", OperatorFeedback::GoalCancelled);
        bus.publish_to(Lane::Operator, event.clone())?;

        assert_eq!(rx1.recv().await.ok_or("rx1 empty")?.id, event.id);
        assert_eq!(rx2.recv().await.ok_or("rx2 empty")?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(
            Lane::Telemetry,
            Event::new("test", OperatorFeedback::PoseReadout(String::new())),
        );
        assert!(matches!(result, Err(ConsoleError::Channel(_))));
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit("test", OperatorFeedback::GoalCancelled);
    }

    #[tokio::test]
    async fn lagging_receiver_skips_to_latest() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_to(Lane::Telemetry);
        for i in 0..32 {
            bus.emit("flood", OperatorFeedback::PoseReadout(format!("{i}")));
        }
        let event = slow.recv().await.expect("event after lag");
        assert!(matches!(event.payload, OperatorFeedback::PoseReadout(_)));
        assert_eq!(slow.lane(), Lane::Telemetry);
    }
}
