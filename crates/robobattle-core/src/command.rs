//! Per-tick robot commands.
//!
//! A [`RobotCommand`] is what a robot hands back when it goes to sleep: one
//! immutable snapshot of everything it wants to do this tick. The physics
//! step consumes it exactly once. A robot that misses its deadline has no
//! command at all for the tick, which is different from an empty command.
//!
//! # Example
//!
//! ```
//! use robobattle_core::command::RobotCommand;
//!
//! let command = RobotCommand::new().ahead(8.0).turn(0.1).fire(3.0);
//! assert_eq!(command.velocity, 8.0);
//! assert_eq!(command.fire, Some(3.0));
//! ```

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// A debug drawing primitive, recorded only while painting is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DebugMark {
    /// Line segment.
    Line {
        /// Start point
        from: DVec2,
        /// End point
        to: DVec2,
    },
    /// Circle outline.
    Circle {
        /// Center
        center: DVec2,
        /// Radius
        radius: f64,
    },
    /// Text label.
    Text {
        /// Anchor point
        at: DVec2,
        /// Label
        text: String,
    },
}

/// Actions requested by one robot for one tick.
///
/// Turn amounts are in radians and are clipped to the per-tick rate limits
/// by the physics step, as is the velocity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotCommand {
    /// Desired velocity; negative moves backwards.
    pub velocity: f64,
    /// Body turn, clockwise positive.
    pub body_turn: f64,
    /// Gun turn relative to the body.
    pub gun_turn: f64,
    /// Radar turn relative to the gun.
    pub radar_turn: f64,
    /// Fire power, if the robot wants to shoot.
    pub fire: Option<f64>,
    /// Debug graphics for this tick.
    pub debug_marks: Vec<DebugMark>,
}

impl RobotCommand {
    /// An empty command: stop, hold headings, don't fire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the desired velocity.
    #[must_use]
    pub fn ahead(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    /// Sets the body turn.
    #[must_use]
    pub fn turn(mut self, radians: f64) -> Self {
        self.body_turn = radians;
        self
    }

    /// Sets the gun turn.
    #[must_use]
    pub fn turn_gun(mut self, radians: f64) -> Self {
        self.gun_turn = radians;
        self
    }

    /// Sets the radar turn.
    #[must_use]
    pub fn turn_radar(mut self, radians: f64) -> Self {
        self.radar_turn = radians;
        self
    }

    /// Requests a shot.
    #[must_use]
    pub fn fire(mut self, power: f64) -> Self {
        self.fire = Some(power);
        self
    }

    /// Adds a debug mark.
    #[must_use]
    pub fn mark(mut self, mark: DebugMark) -> Self {
        self.debug_marks.push(mark);
        self
    }

    /// True when the command requests nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.velocity == 0.0
            && self.body_turn == 0.0
            && self.gun_turn == 0.0
            && self.radar_turn == 0.0
            && self.fire.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_is_idle() {
        assert!(RobotCommand::new().is_idle());
        assert!(!RobotCommand::new().fire(1.0).is_idle());
        assert!(!RobotCommand::new().turn_radar(0.1).is_idle());
    }

    #[test]
    fn builder_sets_fields() {
        let c = RobotCommand::new()
            .ahead(-4.0)
            .turn(0.5)
            .turn_gun(-0.25)
            .turn_radar(1.0)
            .mark(DebugMark::Circle {
                center: DVec2::ZERO,
                radius: 5.0,
            });
        assert_eq!(c.velocity, -4.0);
        assert_eq!(c.body_turn, 0.5);
        assert_eq!(c.gun_turn, -0.25);
        assert_eq!(c.radar_turn, 1.0);
        assert_eq!(c.debug_marks.len(), 1);
    }
}
