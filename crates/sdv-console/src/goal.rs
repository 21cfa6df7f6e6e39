//! Goal Channel – dispatch and cancellation of navigation goals.
//!
//! Goals go out as `geometry_msgs/PoseStamped` on the goal topic; each one
//! is built fresh from a [`GoalTarget`] and stamped with the next sequence
//! number. Cancellation publishes an `actionlib_msgs/GoalID` with an empty
//! id, which the navigation stack reads as "cancel everything".

use sdv_middleware::{TopicChannel, TransportSession};
use sdv_types::{ConsoleError, GoalId, GoalTarget, PoseCommand, PoseStamped};
use tracing::{info, warn};

use crate::config::TopicNames;

pub struct GoalChannel {
    goal: TopicChannel<PoseStamped>,
    cancel: TopicChannel<GoalId>,
    frame_id: String,
    /// Sequence of the last goal that reached the transport.
    sequence: u32,
}

impl GoalChannel {
    pub fn new(topics: &TopicNames, frame_id: impl Into<String>) -> Self {
        Self {
            goal: TopicChannel::new(topics.goal.clone(), "geometry_msgs/PoseStamped"),
            cancel: TopicChannel::new(topics.cancel.clone(), "actionlib_msgs/GoalID"),
            frame_id: frame_id.into(),
            sequence: 0,
        }
    }

    /// Publish `target` as the new navigation goal.
    ///
    /// Returns the sequence number the goal was sent with. The counter only
    /// advances when the publish succeeds, so the first goal is always 1 and
    /// refused goals leave no gaps.
    ///
    /// # Errors
    ///
    /// - [`ConsoleError::InvalidInput`] when a coordinate is NaN or infinite.
    /// - [`ConsoleError::NotConnected`] when the transport is not `Open`.
    /// - [`ConsoleError::Channel`] once the `u32` header sequence is used up.
    pub fn send_goal(
        &mut self,
        transport: &mut TransportSession,
        target: GoalTarget,
    ) -> Result<u32, ConsoleError> {
        validate(&target)?;
        let sequence = self
            .sequence
            .checked_add(1)
            .ok_or_else(|| ConsoleError::Channel("goal sequence exhausted".into()))?;
        let command = PoseCommand::new(target, self.frame_id.as_str(), sequence);
        self.goal.publish(transport, &command.to_pose_stamped())?;
        self.sequence = sequence;
        info!(
            sequence,
            x = target.x,
            y = target.y,
            w = target.orientation_w,
            "goal dispatched"
        );
        Ok(sequence)
    }

    /// Cancel whatever goal the vehicle is pursuing.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] when the transport is not `Open`.
    pub fn cancel_goal(&self, transport: &mut TransportSession) -> Result<(), ConsoleError> {
        self.cancel.publish(transport, &GoalId::cancel_all())?;
        info!(topic = self.cancel.name(), "goal cancelled");
        Ok(())
    }

    pub fn last_sequence(&self) -> u32 {
        self.sequence
    }
}

fn validate(target: &GoalTarget) -> Result<(), ConsoleError> {
    let fields = [
        ("x", target.x),
        ("y", target.y),
        ("orientation z", target.orientation_z),
        ("orientation w", target.orientation_w),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            warn!(field = name, value, "goal rejected");
            return Err(ConsoleError::InvalidInput(format!("{name} must be a finite number")));
        }
    }
    Ok(())
}

/// Parse the free-form goal form: position `x`, `y` and orientation `w`.
///
/// Each field is trimmed and must parse as a finite float; `orientation_z`
/// is always zero for hand-entered goals.
pub fn parse_goal_input(x: &str, y: &str, w: &str) -> Result<GoalTarget, ConsoleError> {
    Ok(GoalTarget {
        x: parse_field("x", x)?,
        y: parse_field("y", y)?,
        orientation_z: 0.0,
        orientation_w: parse_field("w", w)?,
    })
}

fn parse_field(name: &str, raw: &str) -> Result<f64, ConsoleError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConsoleError::InvalidInput(format!("{name} is required")));
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ConsoleError::InvalidInput(format!(
            "{name} is not a number: '{trimmed}'"
        ))),
    }
}
