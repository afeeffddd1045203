//! Immutable per-tick copies of battle state for observers.
//!
//! A [`TurnSnapshot`] is captured once per completed tick, after the command
//! bridge has been drained. It owns plain data only, so observers may keep
//! it, send it to another thread or serialize it.
//!
//! # Example
//!
//! ```
//! use robobattle_core::registry::{ContestantEntry, Registry};
//! use robobattle_core::snapshot::TurnSnapshot;
//!
//! let registry = Registry::new(&[ContestantEntry::solo("a"), ContestantEntry::solo("b")]);
//! let snapshot = TurnSnapshot::capture(&registry, 0, 12);
//!
//! assert_eq!(snapshot.time, 12);
//! assert_eq!(snapshot.robots.len(), 2);
//! assert!(snapshot.bullets.is_empty());
//! ```

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::command::DebugMark;
use crate::entity::{
    BulletId, BulletPeer, BulletState, PaintFlags, RobotId, RobotPeer, RobotState, TeamId,
};
use crate::program::RobotEvent;
use crate::registry::Registry;
use crate::scoring::ScoreBreakdown;

/// One robot at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSnapshot {
    /// Robot ID
    pub id: RobotId,
    /// Unique robot name
    pub name: String,
    /// Team, if any
    pub team: Option<TeamId>,
    /// Life state
    pub state: RobotState,
    /// Center position
    pub position: DVec2,
    /// Body heading in radians
    pub heading: f64,
    /// Gun heading in radians
    pub gun_heading: f64,
    /// Radar heading in radians
    pub radar_heading: f64,
    /// Velocity along the body heading
    pub velocity: f64,
    /// Energy
    pub energy: f64,
    /// Gun heat
    pub gun_heat: f64,
    /// Turns skipped this round
    pub skipped_turns: u32,
    /// Painting switches
    pub paint: PaintFlags,
    /// Debug graphics, present only while painting is enabled
    pub debug_marks: Vec<DebugMark>,
    /// Console lines written since the previous snapshot
    pub console: Vec<String>,
    /// Events queued for the robot's next turn
    pub events: Vec<RobotEvent>,
    /// Score so far this round
    pub score: ScoreBreakdown,
}

impl RobotSnapshot {
    fn capture(robot: &RobotPeer) -> Self {
        Self {
            id: robot.id(),
            name: robot.name().to_string(),
            team: robot.team(),
            state: robot.state(),
            position: robot.position(),
            heading: robot.heading(),
            gun_heading: robot.gun_heading(),
            radar_heading: robot.radar_heading(),
            velocity: robot.velocity(),
            energy: robot.energy(),
            gun_heat: robot.gun_heat(),
            skipped_turns: robot.skipped_turns(),
            paint: robot.paint(),
            debug_marks: robot.debug_marks().to_vec(),
            console: robot.console().drain(),
            events: robot.pending_events().to_vec(),
            score: *robot.statistics().round(),
        }
    }
}

/// One bullet at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletSnapshot {
    /// Bullet ID
    pub id: BulletId,
    /// Robot that fired it
    pub owner: RobotId,
    /// Robot it hit, if any
    pub victim: Option<RobotId>,
    /// Position
    pub position: DVec2,
    /// Heading in radians
    pub heading: f64,
    /// Power
    pub power: f64,
    /// Lifecycle state
    pub state: BulletState,
}

impl From<&BulletPeer> for BulletSnapshot {
    fn from(bullet: &BulletPeer) -> Self {
        Self {
            id: bullet.id(),
            owner: bullet.owner(),
            victim: bullet.victim(),
            position: bullet.position(),
            heading: bullet.heading(),
            power: bullet.power(),
            state: bullet.state(),
        }
    }
}

/// Point-in-time copy of the battle after one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    /// Zero-based round
    pub round: u32,
    /// Tick within the round
    pub time: u64,
    /// Every robot, in ID order
    pub robots: Vec<RobotSnapshot>,
    /// Bullets in the active set
    pub bullets: Vec<BulletSnapshot>,
}

impl TurnSnapshot {
    /// Copies the registry state. Console buffers are drained into the
    /// snapshot, so each console line appears in exactly one snapshot.
    #[must_use]
    pub fn capture(registry: &Registry, round: u32, time: u64) -> Self {
        Self {
            round,
            time,
            robots: registry.robots().iter().map(RobotSnapshot::capture).collect(),
            bullets: registry.bullets().iter().map(BulletSnapshot::from).collect(),
        }
    }

    /// Robot by ID.
    #[must_use]
    pub fn robot(&self, id: RobotId) -> Option<&RobotSnapshot> {
        self.robots.get(id.index())
    }

    /// Robots still alive.
    pub fn alive(&self) -> impl Iterator<Item = &RobotSnapshot> {
        self.robots.iter().filter(|r| r.state == RobotState::Active)
    }
}
