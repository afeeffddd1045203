//! The seam between the engine and robot code.
//!
//! Robot code is untrusted. The engine only needs three things from it:
//!
//! - a [`RobotFactory`] that can hand out a fresh [`RobotProgram`] each round,
//!   or fail with a [`LoadError`]
//! - a [`RobotProgram`] that turns a [`RobotView`] into a
//!   [`RobotCommand`] once per tick
//! - identifying metadata in a [`RobotSpec`]
//!
//! Programs run on their own worker threads and only ever see an owned copy of
//! the pre-tick state, so nothing they do can race with the physics step.
//!
//! # Example
//!
//! ```
//! use robobattle_core::command::RobotCommand;
//! use robobattle_core::program::{ProgramFactory, RobotFactory, RobotSpec, RobotView};
//! use robobattle_core::entity::RobotConsole;
//!
//! let factory = ProgramFactory::new(RobotSpec::new("sample.SittingDuck"), || {
//!     Ok(Box::new(|_view: &RobotView, _console: &RobotConsole| RobotCommand::new()))
//! });
//!
//! assert_eq!(factory.spec().short_class_name(), "SittingDuck");
//! assert!(factory.instantiate().is_ok());
//! ```

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::command::RobotCommand;
use crate::entity::{BulletId, RobotConsole};
use crate::error::LoadError;
use crate::scoring::ContestantResult;

/// Longest accepted package or short class name.
pub const MAX_NAME_LENGTH: usize = 32;

// =============================================================================
// Robot Program
// =============================================================================

/// Robot decision logic, run once per tick on the robot's worker thread.
///
/// A panic inside `run` is caught at the worker boundary: the robot gets a
/// console line and an empty command for the tick.
pub trait RobotProgram: Send {
    /// Produces this tick's command from the pre-tick view.
    fn run(&mut self, view: &RobotView, console: &RobotConsole) -> RobotCommand;
}

impl<F> RobotProgram for F
where
    F: FnMut(&RobotView, &RobotConsole) -> RobotCommand + Send,
{
    fn run(&mut self, view: &RobotView, console: &RobotConsole) -> RobotCommand {
        self(view, console)
    }
}

/// Produces program instances for one robot.
///
/// The loader calls [`instantiate`](Self::instantiate) once per round from its
/// background thread. Errors and panics are contained to the robot.
pub trait RobotFactory: Send + Sync {
    /// Identifying metadata.
    fn spec(&self) -> &RobotSpec;

    /// Creates a fresh program for a new round.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the program cannot be constructed.
    fn instantiate(&self) -> Result<Box<dyn RobotProgram>, LoadError>;
}

/// A [`RobotFactory`] backed by a closure.
pub struct ProgramFactory<F> {
    spec: RobotSpec,
    make: F,
}

impl<F> ProgramFactory<F>
where
    F: Fn() -> Result<Box<dyn RobotProgram>, LoadError> + Send + Sync,
{
    /// Wraps a constructor closure.
    pub fn new(spec: RobotSpec, make: F) -> Self {
        Self { spec, make }
    }
}

impl<F> RobotFactory for ProgramFactory<F>
where
    F: Fn() -> Result<Box<dyn RobotProgram>, LoadError> + Send + Sync,
{
    fn spec(&self) -> &RobotSpec {
        &self.spec
    }

    fn instantiate(&self) -> Result<Box<dyn RobotProgram>, LoadError> {
        (self.make)()
    }
}

impl<F> std::fmt::Debug for ProgramFactory<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramFactory")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Robot Spec
// =============================================================================

/// Identifying metadata for a robot program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotSpec {
    /// Fully qualified class name, e.g. `sample.Walls`.
    pub class_name: String,
    /// Optional version string appended to the display name.
    pub version: Option<String>,
}

impl RobotSpec {
    /// Spec without a version.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            version: None,
        }
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Package part of the class name (empty for the default package).
    #[must_use]
    pub fn package(&self) -> &str {
        self.class_name
            .rsplit_once('.')
            .map_or("", |(package, _)| package)
    }

    /// Class name without the package.
    #[must_use]
    pub fn short_class_name(&self) -> &str {
        self.class_name
            .rsplit_once('.')
            .map_or(self.class_name.as_str(), |(_, class)| class)
    }

    /// Display name before duplicate suffixes are applied.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{} {version}", self.class_name),
            None => self.class_name.clone(),
        }
    }

    /// Reason this robot must be disabled, if its names are too long.
    #[must_use]
    pub fn name_violation(&self) -> Option<String> {
        if self.package().chars().count() > MAX_NAME_LENGTH {
            return Some(format!(
                "Your package name is too long. {MAX_NAME_LENGTH} characters maximum please."
            ));
        }
        if self.short_class_name().chars().count() > MAX_NAME_LENGTH {
            return Some(format!(
                "Your classname is too long. {MAX_NAME_LENGTH} characters maximum please."
            ));
        }
        None
    }
}

// =============================================================================
// Robot View
// =============================================================================

/// A robot's own state at the start of the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    /// Center position
    pub position: DVec2,
    /// Body heading (radians, 0 = north, clockwise)
    pub heading: f64,
    /// Gun heading
    pub gun_heading: f64,
    /// Radar heading
    pub radar_heading: f64,
    /// Signed speed
    pub velocity: f64,
    /// Remaining energy
    pub energy: f64,
    /// Gun heat; the gun fires only at zero
    pub gun_heat: f64,
    /// Other robots still alive
    pub others: usize,
    /// Tick within the round
    pub time: u64,
    /// Zero-based round number
    pub round: u32,
}

/// Another robot as seen at the start of the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSighting {
    /// Display name
    pub name: String,
    /// Center position
    pub position: DVec2,
    /// Body heading
    pub heading: f64,
    /// Signed speed
    pub velocity: f64,
    /// Remaining energy
    pub energy: f64,
    /// True when on the observer's team
    pub teammate: bool,
}

/// Everything a robot may read during its turn.
///
/// Built from the pre-tick registry state, so every robot acts against the
/// same positions regardless of wake order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotView {
    /// Own display name
    pub name: String,
    /// Own state
    pub status: RobotStatus,
    /// Rounds in the battle
    pub rounds: u32,
    /// Battlefield width
    pub battlefield_width: f64,
    /// Battlefield height
    pub battlefield_height: f64,
    /// Gun cooling per tick
    pub gun_cooling_rate: f64,
    /// Living robots other than this one
    pub sightings: Vec<RobotSighting>,
    /// Events since the last turn, oldest first
    pub events: Vec<RobotEvent>,
}

impl RobotView {
    /// Closest living robot, teammates excluded.
    #[must_use]
    pub fn nearest_enemy(&self) -> Option<&RobotSighting> {
        let me = self.status.position;
        self.sightings
            .iter()
            .filter(|s| !s.teammate)
            .min_by(|a, b| {
                me.distance_squared(a.position)
                    .total_cmp(&me.distance_squared(b.position))
            })
    }
}

// =============================================================================
// Events
// =============================================================================

/// External input forwarded to every robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Key pressed.
    KeyPressed(u32),
    /// Key released.
    KeyReleased(u32),
    /// Pointer moved to a battlefield position.
    MouseMoved(DVec2),
    /// Pointer button clicked at a battlefield position.
    MouseClicked {
        /// Battlefield position
        at: DVec2,
        /// Button number
        button: u8,
    },
    /// Wheel rotated.
    MouseWheel(i32),
}

/// Something that happened to a robot since its last turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotEvent {
    /// Own state, delivered every turn.
    Status(RobotStatus),
    /// Hit by someone else's bullet.
    HitByBullet {
        /// Bullet
        bullet: BulletId,
        /// Shooter's name
        shooter: String,
        /// Bullet power
        power: f64,
    },
    /// Own bullet hit a robot.
    BulletHit {
        /// Bullet
        bullet: BulletId,
        /// Victim's name
        victim: String,
        /// Victim's energy after the hit
        victim_energy: f64,
    },
    /// Own bullet collided with another bullet.
    BulletHitBullet {
        /// Own bullet
        bullet: BulletId,
        /// The bullet it hit
        other: BulletId,
    },
    /// Own bullet left the battlefield.
    BulletMissed {
        /// Bullet
        bullet: BulletId,
    },
    /// Drove into a wall.
    HitWall,
    /// Bumped into another robot.
    HitRobot {
        /// Other robot's name
        name: String,
        /// True when this robot was moving into the other
        at_fault: bool,
    },
    /// Another robot died.
    RobotDeath {
        /// Dead robot's name
        name: String,
    },
    /// This robot died.
    Death,
    /// This robot won the round.
    Win,
    /// This robot missed the deadline for a tick.
    SkippedTurn {
        /// Tick that was skipped
        time: u64,
    },
    /// The round is over.
    RoundEnded {
        /// Zero-based round number
        round: u32,
        /// Ticks played in the round
        turns: u64,
    },
    /// The battle is over.
    BattleEnded {
        /// True when the battle was aborted
        aborted: bool,
        /// Final standing of the robot's contestant
        result: Option<ContestantResult>,
    },
    /// Forwarded input.
    Interactive(InputEvent),
}

impl RobotEvent {
    /// Terminal events are queued even for dead robots.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Death | Self::RoundEnded { .. } | Self::BattleEnded { .. }
        )
    }
}
