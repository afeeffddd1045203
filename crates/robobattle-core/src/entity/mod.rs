//! Entity types owned by the battle registry.
//!
//! - [`RobotId`], [`TeamId`], [`BulletId`]: typed identifiers
//! - [`RobotPeer`]: one robot's simulation state
//! - [`BulletPeer`]: one projectile in flight
//! - [`Contestant`]: the scoring unit, a lone robot or a team
//!
//! # Example
//!
//! ```
//! use robobattle_core::entity::{RobotId, RobotPeer, RobotState};
//! use glam::DVec2;
//!
//! let mut robot = RobotPeer::new(RobotId::new(0), "sample.Walls");
//! robot.place(DVec2::new(100.0, 100.0), 0.0);
//!
//! assert_eq!(robot.state(), RobotState::Active);
//! assert_eq!(robot.energy(), 100.0);
//! ```

pub mod bullet;
pub mod contestant;
pub mod robot;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use bullet::{BulletPeer, BulletState};
pub use contestant::{Contestant, TeamPeer};
pub use robot::{PaintFlags, RobotConsole, RobotPeer, RobotState};

/// Index of a robot in the battle's robot list.
///
/// Robot IDs are assigned in declaration order and stay fixed for the whole
/// battle, so they double as the robot index of the control surface.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RobotId(usize);

impl RobotId {
    /// Creates a robot ID from its index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the index into the robot list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RobotId({})", self.0)
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a team in the battle's team list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(usize);

impl TeamId {
    /// Creates a team ID from its index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the team index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Unique identifier of a bullet within a battle.
///
/// Bullet IDs increase monotonically and are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BulletId(u64);

impl BulletId {
    /// Creates a bullet ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BulletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bullet:{}", self.0)
    }
}
