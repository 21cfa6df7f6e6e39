//! Telemetry Channel – live pose readout.
//!
//! Subscribes to the vehicle's odometry stream once per Connection, decodes
//! every message into a [`TelemetrySample`] and hands the formatted readout
//! to a [`DisplaySink`]. Samples are not buffered: a display that falls
//! behind simply sees the latest one next.
//!
//! Malformed messages are logged and counted; they never end the
//! subscription.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sdv_middleware::{EventBus, MessageHandler, TopicChannel, TransportSession};
use sdv_types::{ConnectionId, ConsoleError, OperatorFeedback, Point, TelemetrySample};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Where formatted pose readouts end up.
pub trait DisplaySink: Send + Sync {
    fn show(&self, readout: &str);
}

/// Forwards readouts to the [`Lane::Telemetry`][sdv_middleware::Lane] lane.
pub struct BusDisplaySink {
    bus: Arc<EventBus>,
}

impl BusDisplaySink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl DisplaySink for BusDisplaySink {
    fn show(&self, readout: &str) {
        self.bus.emit(
            "sdv-console::telemetry",
            OperatorFeedback::PoseReadout(readout.to_string()),
        );
    }
}

// ---------------------------------------------------------------------------
// nav_msgs/Odometry (only the fields the readout uses)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Odometry {
    pub pose: PoseWithCovariance,
}

#[derive(Debug, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: OdometryPose,
}

#[derive(Debug, Deserialize)]
pub struct OdometryPose {
    pub position: Point,
    pub orientation: OrientationW,
}

#[derive(Debug, Deserialize)]
pub struct OrientationW {
    pub w: f64,
}

impl Odometry {
    pub fn sample(&self) -> TelemetrySample {
        let pose = &self.pose.pose;
        TelemetrySample {
            x: pose.position.x,
            y: pose.position.y,
            z: pose.position.z,
            w: pose.orientation.w,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    shown: AtomicU64,
    decode_errors: AtomicU64,
}

struct PoseHandler {
    channel: TopicChannel<Odometry>,
    sink: Arc<dyn DisplaySink>,
    counters: Arc<Counters>,
}

impl MessageHandler for PoseHandler {
    fn on_message(&self, topic: &str, msg: &Value) {
        match self.channel.decode(msg) {
            Ok(odometry) => {
                self.sink.show(&odometry.sample().readout());
                self.counters.shown.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let total = self.counters.decode_errors.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(topic, error = %e, decode_errors = total, "pose sample dropped");
            }
        }
    }
}

pub struct TelemetryChannel {
    channel: TopicChannel<Odometry>,
    sink: Arc<dyn DisplaySink>,
    counters: Arc<Counters>,
    attached: Option<(ConnectionId, Arc<dyn MessageHandler>)>,
}

impl TelemetryChannel {
    pub fn new(topic: impl Into<String>, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            channel: TopicChannel::new(topic, "nav_msgs/Odometry"),
            sink,
            counters: Arc::new(Counters::default()),
            attached: None,
        }
    }

    pub fn topic(&self) -> &str {
        self.channel.name()
    }

    /// Subscribe to the pose stream on the current Connection.
    ///
    /// A no-op when already attached to this Connection. A fresh Connection
    /// gets a fresh binding.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] when no Connection is live.
    pub fn attach(&mut self, transport: &mut TransportSession) -> Result<(), ConsoleError> {
        let Some(connection) = transport.connection_id() else {
            return Err(ConsoleError::NotConnected);
        };
        if matches!(&self.attached, Some((bound, _)) if *bound == connection) {
            debug!(topic = self.topic(), "telemetry already attached");
            return Ok(());
        }
        let handler: Arc<dyn MessageHandler> = Arc::new(PoseHandler {
            channel: self.channel.clone(),
            sink: Arc::clone(&self.sink),
            counters: Arc::clone(&self.counters),
        });
        self.channel.subscribe(transport, Arc::clone(&handler))?;
        self.attached = Some((connection, handler));
        debug!(topic = self.topic(), connection = %connection, "telemetry attached");
        Ok(())
    }

    /// Drop the binding, unsubscribing when its Connection is still current.
    pub fn detach(&mut self, transport: &mut TransportSession) {
        if let Some((connection, handler)) = self.attached.take()
            && transport.connection_id() == Some(connection)
        {
            self.channel.unsubscribe(transport, &handler);
        }
    }

    pub fn is_attached_to(&self, connection: ConnectionId) -> bool {
        matches!(&self.attached, Some((bound, _)) if *bound == connection)
    }

    /// Readouts shown so far, over every Connection.
    pub fn samples_shown(&self) -> u64 {
        self.counters.shown.load(Ordering::Relaxed)
    }

    /// Messages that failed to decode, over every Connection.
    pub fn decode_errors(&self) -> u64 {
        self.counters.decode_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdv_middleware::{LinkEvent, MemoryLink};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Panel {
        shown: Mutex<Vec<String>>,
    }

    impl DisplaySink for Panel {
        fn show(&self, readout: &str) {
            self.shown.lock().unwrap().push(readout.to_string());
        }
    }

    fn odometry_frame(x: f64, y: f64, w: f64) -> String {
        format!(
            r#"{{"op":"publish","topic":"/scanmatch_odom","msg":{{"pose":{{"pose":{{"position":{{"x":{x},"y":{y},"z":0.0}},"orientation":{{"x":0.0,"y":0.0,"z":0.0,"w":{w}}}}}}}}}}}"#
        )
    }

    fn setup() -> (TransportSession, ConnectionId, MemoryLink, TelemetryChannel, Arc<Panel>) {
        let mut transport = TransportSession::new();
        let id = transport.open("ws://sdv.local:9090").unwrap();
        let link = MemoryLink::new();
        transport.handle(LinkEvent::opened(id, link.clone()));
        let panel = Arc::new(Panel::default());
        let telemetry = TelemetryChannel::new("/scanmatch_odom", panel.clone());
        (transport, id, link, telemetry, panel)
    }

    #[test]
    fn sample_is_formatted_to_two_decimals() {
        let (mut transport, id, _, mut telemetry, panel) = setup();
        telemetry.attach(&mut transport).unwrap();
        transport.handle(LinkEvent::frame(id, odometry_frame(1.0, 2.0, 1.0)));

        let shown = panel.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0], "X: 1.00\nY: 2.00\nZ: 0.00\nW: 1.00\n");
        assert_eq!(telemetry.samples_shown(), 1);
    }

    #[test]
    fn malformed_message_does_not_stop_the_next_one() {
        let (mut transport, id, _, mut telemetry, panel) = setup();
        telemetry.attach(&mut transport).unwrap();

        transport.handle(LinkEvent::frame(
            id,
            r#"{"op":"publish","topic":"/scanmatch_odom","msg":{"pose":{"pose":{"position":{"x":"oops"}}}}}"#,
        ));
        transport.handle(LinkEvent::frame(id, odometry_frame(3.25, -1.5, 0.5)));

        assert_eq!(telemetry.decode_errors(), 1);
        let shown = panel.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].starts_with("X: 3.25\nY: -1.50"));
    }

    #[test]
    fn attach_is_once_per_connection() {
        let (mut transport, _, link, mut telemetry, _) = setup();
        telemetry.attach(&mut transport).unwrap();
        telemetry.attach(&mut transport).unwrap();
        assert_eq!(transport.subscriber_count("/scanmatch_odom"), 1);
        let subscribes = link
            .json_frames()
            .into_iter()
            .filter(|f| f["op"] == "subscribe")
            .count();
        assert_eq!(subscribes, 1);
    }

    #[test]
    fn fresh_connection_gets_fresh_binding() {
        let (mut transport, first, _, mut telemetry, panel) = setup();
        telemetry.attach(&mut transport).unwrap();
        transport.close();

        let second = transport.open("ws://sdv.local:9090").unwrap();
        transport.handle(LinkEvent::opened(second, MemoryLink::new()));
        assert!(!telemetry.is_attached_to(second));
        telemetry.attach(&mut transport).unwrap();
        assert!(telemetry.is_attached_to(second));
        assert!(!telemetry.is_attached_to(first));

        transport.handle(LinkEvent::frame(second, odometry_frame(0.0, 0.0, 1.0)));
        assert_eq!(panel.shown.lock().unwrap().len(), 1);
    }

    #[test]
    fn attach_without_connection_is_not_connected() {
        let mut transport = TransportSession::new();
        let mut telemetry = TelemetryChannel::new("/scanmatch_odom", Arc::new(Panel::default()));
        assert_eq!(telemetry.attach(&mut transport), Err(ConsoleError::NotConnected));
    }

    #[test]
    fn detach_unsubscribes() {
        let (mut transport, _, link, mut telemetry, _) = setup();
        telemetry.attach(&mut transport).unwrap();
        telemetry.detach(&mut transport);
        assert_eq!(transport.subscriber_count("/scanmatch_odom"), 0);
        assert_eq!(link.json_frames().last().unwrap()["op"], "unsubscribe");
    }

    #[tokio::test]
    async fn bus_sink_emits_pose_readout() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe_to(sdv_middleware::Lane::Telemetry);
        BusDisplaySink::new(Arc::clone(&bus)).show("X: 0.00\n");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload, OperatorFeedback::PoseReadout("X: 0.00\n".into()));
    }
}
