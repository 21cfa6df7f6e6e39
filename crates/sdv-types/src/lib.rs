//! `sdv-types` – shared vocabulary of the SDV operator console.
//!
//! Wire payloads exchanged with the vehicle's rosbridge server, the health
//! states of the transport, the operator feedback events shown by the UI,
//! and the [`ConsoleError`] taxonomy used across every crate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Connection health
// ---------------------------------------------------------------------------

/// Identity of one Connection created by the transport session.
///
/// Every `open()` mints a new id so that late events from a replaced link can
/// be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health of the single connection to the vehicle bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Error,
    Closed,
}

impl ConnectionState {
    /// `Error` and `Closed` end a Connection; a new `open()` is required.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Error | ConnectionState::Closed)
    }

    /// `Connecting` and `Open` count as a live connection.
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Error => write!(f, "error"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// A single health-state transition, as delivered to state observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub connection: ConnectionId,
    pub state: ConnectionState,
    /// Opaque diagnostic, only set for [`ConnectionState::Error`].
    pub diagnostic: Option<String>,
}

// ---------------------------------------------------------------------------
// ROS message bodies (as carried in rosbridge `msg` fields)
// ---------------------------------------------------------------------------

/// `geometry_msgs/Point`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// `geometry_msgs/Quaternion`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// `geometry_msgs/Vector3`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// ROS `time` as sent by rosbridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub secs: u32,
    pub nsecs: u32,
}

/// `std_msgs/Header`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub seq: u32,
    pub stamp: Stamp,
    pub frame_id: String,
}

/// `geometry_msgs/Pose`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

/// `geometry_msgs/PoseStamped`, the goal-dispatch wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

/// `actionlib_msgs/GoalID`. An empty `id` cancels every goal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoalId {
    pub stamp: Stamp,
    pub id: String,
}

impl GoalId {
    /// Cancellation of "the current goal" (all goals on the bridge side).
    pub fn cancel_all() -> Self {
        Self::default()
    }
}

/// `geometry_msgs/Twist`, the velocity-command wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Planar twist: forward speed on `linear.x`, yaw rate on `angular.z`.
    pub fn planar(linear_x: f64, angular_z: f64) -> Self {
        Self {
            linear: Vector3 { x: linear_x, y: 0.0, z: 0.0 },
            angular: Vector3 { x: 0.0, y: 0.0, z: angular_z },
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

// ---------------------------------------------------------------------------
// Domain values
// ---------------------------------------------------------------------------

/// Planar goal requested by the operator, before it becomes a
/// [`PoseCommand`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalTarget {
    pub x: f64,
    pub y: f64,
    pub orientation_z: f64,
    pub orientation_w: f64,
}

/// Target pose command, built fresh for every publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCommand {
    pub frame_id: String,
    pub sequence: u32,
    pub position: Point,
    /// Planar motion only: `x` and `y` stay at zero.
    pub orientation: Quaternion,
}

impl PoseCommand {
    pub fn new(target: GoalTarget, frame_id: impl Into<String>, sequence: u32) -> Self {
        Self {
            frame_id: frame_id.into(),
            sequence,
            position: Point { x: target.x, y: target.y, z: 0.0 },
            orientation: Quaternion {
                x: 0.0,
                y: 0.0,
                z: target.orientation_z,
                w: target.orientation_w,
            },
        }
    }

    /// Wire representation as a stamped pose.
    pub fn to_pose_stamped(&self) -> PoseStamped {
        PoseStamped {
            header: Header {
                seq: self.sequence,
                stamp: Stamp::default(),
                frame_id: self.frame_id.clone(),
            },
            pose: Pose {
                position: self.position,
                orientation: self.orientation,
            },
        }
    }
}

/// One decoded vehicle pose sample. Lives for a single display update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl TelemetrySample {
    /// Readout block shown in the live pose panel, two decimals per field.
    pub fn readout(&self) -> String {
        format!(
            "X: {:.2}\nY: {:.2}\nZ: {:.2}\nW: {:.2}\n",
            self.x, self.y, self.z, self.w
        )
    }
}

/// Directional input of the teleoperation pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" => Ok(Direction::Up),
            "down" | "s" => Ok(Direction::Down),
            "left" | "a" => Ok(Direction::Left),
            "right" | "d" => Ok(Direction::Right),
            other => Err(ConsoleError::InvalidInput(format!("unknown direction '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Operator feedback events
// ---------------------------------------------------------------------------

/// Envelope for everything the console reports back to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "sdv-console::goal"
    pub source: String,
    pub payload: OperatorFeedback,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: OperatorFeedback) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// What the operator sees: banners, readouts and rejection highlights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperatorFeedback {
    ConnectionChanged {
        state: ConnectionState,
        diagnostic: Option<String>,
    },
    PoseReadout(String),
    GoalDispatched {
        sequence: u32,
        waypoint: Option<String>,
    },
    GoalCancelled,
    TeleopArmed(bool),
    /// An operator action was refused; nothing reached the wire.
    Rejected {
        action: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error taxonomy of the command/telemetry layer.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConsoleError {
    #[error("Connection Error: {0}")]
    Connection(String),

    #[error("Not Connected: the bridge connection is not open")]
    NotConnected,

    #[error("Already Connected: a bridge connection is still live")]
    AlreadyConnected,

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    #[error("Decode Error: {0}")]
    Decode(String),

    #[error("Teleoperation Active: goal dispatch is suppressed while teleop is armed")]
    TeleopActive,

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}
