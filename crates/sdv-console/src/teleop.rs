//! Teleoperation Controller – direct velocity control from a direction pad.
//!
//! | Direction | Command |
//! |---|---|
//! | Up | `linear.x = +linear` |
//! | Down | `linear.x = -linear` |
//! | Left | `angular.z = +angular` |
//! | Right | `angular.z = -angular` |
//!
//! Held directions combine across axes. Opposing directions held together
//! cancel out, so Up+Down is zero on the linear axis whatever the press
//! order.
//!
//! Publishing is event driven: one command per press (a zero one when the
//! press completes an opposing pair), one per release that changes the
//! command, and exactly one zero from the release that empties the pad.
//! Nothing is published on a timer.

use sdv_middleware::{TopicChannel, TransportSession};
use sdv_types::{ConsoleError, Direction, Twist};
use tracing::{debug, info, warn};

use crate::config::TeleopScales;

pub struct TeleopController {
    channel: TopicChannel<Twist>,
    scales: TeleopScales,
    armed: bool,
    /// Held directions, oldest press first.
    held: Vec<Direction>,
    /// Last command that reached the transport.
    last_sent: Twist,
}

impl TeleopController {
    pub fn new(topic: impl Into<String>, scales: TeleopScales) -> Self {
        Self {
            channel: TopicChannel::new(topic, "geometry_msgs/Twist"),
            scales,
            armed: false,
            held: Vec::new(),
            last_sent: Twist::zero(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn held(&self) -> &[Direction] {
        &self.held
    }

    pub fn last_sent(&self) -> Twist {
        self.last_sent
    }

    /// Arm or disarm the pad.
    ///
    /// Arming requires an `Open` transport. Disarming always takes effect:
    /// held directions are cleared and, if the vehicle was last told to
    /// move, one zero command is published.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] when arming without an `Open`
    /// transport, or when the stopping command cannot be published.
    pub fn arm(&mut self, transport: &mut TransportSession, flag: bool) -> Result<(), ConsoleError> {
        if flag == self.armed {
            return Ok(());
        }
        if flag {
            if !transport.is_open() {
                return Err(ConsoleError::NotConnected);
            }
            self.armed = true;
            self.held.clear();
            info!("teleoperation armed");
            return Ok(());
        }

        self.armed = false;
        self.held.clear();
        info!("teleoperation disarmed");
        if !self.last_sent.is_zero() {
            self.send(transport, Twist::zero())?;
        }
        Ok(())
    }

    /// Apply a key-down. Returns the command published, or `None` when the
    /// pad is disarmed and the press is ignored.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] when the transport is not `Open`; the
    /// press is then not recorded.
    pub fn press(
        &mut self,
        transport: &mut TransportSession,
        direction: Direction,
    ) -> Result<Option<Twist>, ConsoleError> {
        if !self.armed {
            debug!(?direction, "press ignored: teleop disarmed");
            return Ok(None);
        }
        if !transport.is_open() {
            return Err(ConsoleError::NotConnected);
        }
        self.held.retain(|d| *d != direction);
        self.held.push(direction);
        let command = self.command();
        self.send(transport, command)?;
        Ok(Some(command))
    }

    /// Apply a key-up. Returns the command published, if any.
    ///
    /// Releasing a direction that is not held does nothing. Releasing the
    /// last held direction always publishes exactly one zero command, even
    /// when an opposing pair already brought the vehicle to zero.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] when the resulting command cannot be
    /// published; the release itself is still recorded.
    pub fn release(
        &mut self,
        transport: &mut TransportSession,
        direction: Direction,
    ) -> Result<Option<Twist>, ConsoleError> {
        let before = self.held.len();
        self.held.retain(|d| *d != direction);
        if self.held.len() == before {
            debug!(?direction, "release ignored: direction not held");
            return Ok(None);
        }
        let command = self.command();
        if !self.held.is_empty() && command == self.last_sent {
            return Ok(None);
        }
        self.send(transport, command)?;
        Ok(Some(command))
    }

    /// Command derived from the held directions.
    ///
    /// Each axis is the net of its two directions, so an opposing pair
    /// resolves to zero on that axis.
    pub fn command(&self) -> Twist {
        let (mut linear, mut angular) = (0i8, 0i8);
        for direction in &self.held {
            match direction {
                Direction::Up => linear += 1,
                Direction::Down => linear -= 1,
                Direction::Left => angular += 1,
                Direction::Right => angular -= 1,
            }
        }
        Twist::planar(
            f64::from(linear) * self.scales.linear,
            f64::from(angular) * self.scales.angular,
        )
    }

    /// Publish a zero command and forget held directions. Stays armed.
    pub fn stop(&mut self, transport: &mut TransportSession) -> Result<(), ConsoleError> {
        self.held.clear();
        self.send(transport, Twist::zero())
    }

    /// Drop all local state without publishing, for a Connection that
    /// already ended.
    pub fn reset(&mut self) {
        if self.armed {
            info!("teleoperation disarmed: connection ended");
        }
        self.armed = false;
        self.held.clear();
        self.last_sent = Twist::zero();
    }

    fn send(&mut self, transport: &mut TransportSession, command: Twist) -> Result<(), ConsoleError> {
        match self.channel.publish(transport, &command) {
            Ok(()) => {
                self.last_sent = command;
                debug!(
                    linear = command.linear.x,
                    angular = command.angular.z,
                    "velocity command"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "velocity command not sent");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdv_middleware::{LinkEvent, MemoryLink};

    const TOPIC: &str = "/mobile_base/commands/velocity";

    fn armed() -> (TransportSession, MemoryLink, TeleopController) {
        let mut transport = TransportSession::new();
        let id = transport.open("ws://sdv.local:9090").unwrap();
        let link = MemoryLink::new();
        transport.handle(LinkEvent::opened(id, link.clone()));
        let mut teleop = TeleopController::new(TOPIC, TeleopScales::default());
        teleop.arm(&mut transport, true).unwrap();
        (transport, link, teleop)
    }

    fn sent(link: &MemoryLink) -> Vec<(f64, f64)> {
        link.published_on(TOPIC)
            .iter()
            .map(|m| {
                (
                    m["linear"]["x"].as_f64().unwrap(),
                    m["angular"]["z"].as_f64().unwrap(),
                )
            })
            .collect()
    }

    fn zeros(link: &MemoryLink) -> usize {
        sent(link).iter().filter(|c| **c == (0.0, 0.0)).count()
    }

    #[test]
    fn direction_mapping() {
        let (mut transport, link, mut teleop) = armed();
        for direction in Direction::ALL {
            teleop.press(&mut transport, direction).unwrap();
            teleop.release(&mut transport, direction).unwrap();
        }
        assert_eq!(
            sent(&link),
            vec![
                (0.3, 0.0),
                (0.0, 0.0),
                (-0.3, 0.0),
                (0.0, 0.0),
                (0.0, 0.5),
                (0.0, 0.0),
                (0.0, -0.5),
                (0.0, 0.0),
            ]
        );
    }

    #[test]
    fn one_publish_per_press() {
        let (mut transport, link, mut teleop) = armed();
        teleop.press(&mut transport, Direction::Up).unwrap();
        assert_eq!(sent(&link), vec![(0.3, 0.0)]);
        teleop.press(&mut transport, Direction::Up).unwrap();
        assert_eq!(sent(&link).len(), 2);
        teleop.release(&mut transport, Direction::Up).unwrap();
        assert_eq!(sent(&link).last(), Some(&(0.0, 0.0)));
    }

    #[test]
    fn releasing_everything_publishes_exactly_one_zero() {
        let histories: [&[Direction]; 4] = [
            &[Direction::Up],
            &[Direction::Up, Direction::Left],
            &[Direction::Down, Direction::Down, Direction::Right],
            &[Direction::Right, Direction::Down, Direction::Right],
        ];
        for presses in histories {
            let (mut transport, link, mut teleop) = armed();
            for d in presses {
                teleop.press(&mut transport, *d).unwrap();
            }
            assert_eq!(zeros(&link), 0, "no zero while something is held: {presses:?}");
            for d in Direction::ALL {
                teleop.release(&mut transport, d).unwrap();
            }
            assert_eq!(zeros(&link), 1, "history {presses:?}");
            assert_eq!(sent(&link).last(), Some(&(0.0, 0.0)));
        }
    }

    #[test]
    fn final_release_publishes_one_zero_after_conflicting_presses() {
        let histories: [&[Direction]; 3] = [
            &[Direction::Up, Direction::Down],
            &[Direction::Left, Direction::Right, Direction::Up, Direction::Down],
            &[Direction::Down, Direction::Up, Direction::Left],
        ];
        for presses in histories {
            let (mut transport, link, mut teleop) = armed();
            for d in presses {
                teleop.press(&mut transport, *d).unwrap();
            }
            let mut remaining = teleop.held().to_vec();
            let last = remaining.pop().unwrap();
            for d in remaining {
                teleop.release(&mut transport, d).unwrap();
            }
            let before = sent(&link).len();
            assert_eq!(
                teleop.release(&mut transport, last),
                Ok(Some(Twist::zero())),
                "history {presses:?}"
            );
            assert_eq!(sent(&link).len(), before + 1);
            assert_eq!(sent(&link).last(), Some(&(0.0, 0.0)));

            // Late key-ups after the pad is empty publish nothing.
            for d in Direction::ALL {
                assert_eq!(teleop.release(&mut transport, d), Ok(None));
            }
            assert_eq!(sent(&link).len(), before + 1);
        }
    }

    #[test]
    fn opposing_directions_cancel_on_their_axis() {
        let (mut transport, link, mut teleop) = armed();
        teleop.press(&mut transport, Direction::Up).unwrap();
        let both = teleop.press(&mut transport, Direction::Down).unwrap();
        assert_eq!(both.map(|t| t.linear.x), Some(0.0));
        assert_eq!(teleop.command(), Twist::zero());

        // Letting go of one side resumes the other.
        teleop.release(&mut transport, Direction::Up).unwrap();
        assert_eq!(sent(&link), vec![(0.3, 0.0), (0.0, 0.0), (-0.3, 0.0)]);
    }

    #[test]
    fn opposing_pair_leaves_the_other_axis_alone() {
        let (mut transport, _, mut teleop) = armed();
        teleop.press(&mut transport, Direction::Left).unwrap();
        teleop.press(&mut transport, Direction::Right).unwrap();
        let command = teleop.press(&mut transport, Direction::Up).unwrap();
        assert_eq!(command, Some(Twist::planar(0.3, 0.0)));
    }

    #[test]
    fn axes_combine() {
        let (mut transport, _, mut teleop) = armed();
        teleop.press(&mut transport, Direction::Up).unwrap();
        let command = teleop.press(&mut transport, Direction::Right).unwrap();
        assert_eq!(command, Some(Twist::planar(0.3, -0.5)));
    }

    #[test]
    fn release_of_unheld_direction_is_ignored() {
        let (mut transport, link, mut teleop) = armed();
        assert_eq!(teleop.release(&mut transport, Direction::Down), Ok(None));
        assert!(sent(&link).is_empty());
    }

    #[test]
    fn disarmed_pad_ignores_presses() {
        let (mut transport, link, mut teleop) = armed();
        teleop.arm(&mut transport, false).unwrap();
        assert_eq!(teleop.press(&mut transport, Direction::Up), Ok(None));
        assert!(sent(&link).is_empty());
    }

    #[test]
    fn disarming_while_moving_publishes_one_zero() {
        let (mut transport, link, mut teleop) = armed();
        teleop.press(&mut transport, Direction::Up).unwrap();
        teleop.arm(&mut transport, false).unwrap();
        assert_eq!(sent(&link), vec![(0.3, 0.0), (0.0, 0.0)]);
        assert!(teleop.held().is_empty());

        // Nothing held any more, so a late key-up is a no-op.
        teleop.release(&mut transport, Direction::Up).unwrap();
        assert_eq!(zeros(&link), 1);
    }

    #[test]
    fn disarming_while_stopped_publishes_nothing() {
        let (mut transport, link, mut teleop) = armed();
        teleop.arm(&mut transport, false).unwrap();
        assert!(sent(&link).is_empty());
    }

    #[test]
    fn arming_requires_open_transport() {
        let mut transport = TransportSession::new();
        let mut teleop = TeleopController::new(TOPIC, TeleopScales::default());
        assert_eq!(teleop.arm(&mut transport, true), Err(ConsoleError::NotConnected));
        assert!(!teleop.is_armed());
    }

    #[test]
    fn press_after_connection_loss_is_not_connected() {
        let (mut transport, _, mut teleop) = armed();
        transport.close();
        assert_eq!(
            teleop.press(&mut transport, Direction::Up),
            Err(ConsoleError::NotConnected)
        );
        assert!(teleop.held().is_empty());
    }

    #[test]
    fn stop_publishes_zero_and_stays_armed() {
        let (mut transport, link, mut teleop) = armed();
        teleop.press(&mut transport, Direction::Left).unwrap();
        teleop.stop(&mut transport).unwrap();
        assert!(teleop.is_armed());
        assert!(teleop.held().is_empty());
        assert_eq!(sent(&link).last(), Some(&(0.0, 0.0)));
    }

    #[test]
    fn reset_forgets_everything_without_publishing() {
        let (mut transport, link, mut teleop) = armed();
        teleop.press(&mut transport, Direction::Up).unwrap();
        teleop.reset();
        assert!(!teleop.is_armed());
        assert!(teleop.last_sent().is_zero());
        assert_eq!(sent(&link).len(), 1);
    }
}
