//! Resolvers apply one tick's collected commands to the registry.
//!
//! The physics step is a fixed sequence of resolvers, each owning one part of
//! the tick:
//!
//! 1. [`BulletResolver`]: retire finished bullets, advance the rest, then
//!    resolve bullet/robot, bullet/bullet and bullet/wall contacts
//! 2. [`PhysicsResolver`]: robot turning, movement, wall and robot bumps,
//!    firing, gun cooling and inactivity drain
//!
//! # Invariants
//!
//! - Resolvers run on the driver thread only and see the full command set
//! - Per-robot work follows [`TurnInput::order`], never declaration order
//! - [`TurnInput::order`] is drawn with [`resolution_order`], independently
//!   of the order robots were woken in
//! - Given the same registry and input, a resolver produces the same result

mod bullets;
mod physics;

pub use bullets::BulletResolver;
pub use physics::{next_velocity, PhysicsResolver, ACCELERATION, DECELERATION, MAX_VELOCITY};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::command::RobotCommand;
use crate::config::BattleRules;
use crate::entity::RobotId;
use crate::registry::Registry;

/// Commands collected for one tick.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    /// Tick within the round
    pub time: u64,
    /// This tick's random resolution order
    pub order: Vec<RobotId>,
    /// Command per robot index; `None` when the robot was skipped or idle
    pub commands: Vec<Option<RobotCommand>>,
}

impl TurnInput {
    /// Input with no commands for `robot_count` robots.
    #[must_use]
    pub fn empty(time: u64, order: Vec<RobotId>, robot_count: usize) -> Self {
        Self {
            time,
            order,
            commands: vec![None; robot_count],
        }
    }

    /// Command collected for a robot.
    #[must_use]
    pub fn command(&self, id: RobotId) -> Option<&RobotCommand> {
        self.commands.get(id.index()).and_then(Option::as_ref)
    }
}

/// A uniformly random order for resolving `count` robots.
///
/// Drawn separately from the wake order; the wake order never reaches the
/// physics step.
pub fn resolution_order<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<RobotId> {
    let mut order: Vec<RobotId> = (0..count).map(RobotId::new).collect();
    order.shuffle(rng);
    order
}

/// One stage of the physics step.
///
/// # Example
///
/// ```
/// use robobattle_core::config::BattleRules;
/// use robobattle_core::registry::Registry;
/// use robobattle_core::resolver::{Resolver, TurnInput};
///
/// struct Noop;
///
/// impl Resolver for Noop {
///     fn name(&self) -> &'static str {
///         "noop"
///     }
///
///     fn resolve(&self, _input: &TurnInput, _rules: &BattleRules, _registry: &mut Registry) {}
/// }
/// ```
pub trait Resolver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Applies this stage to the registry.
    fn resolve(&self, input: &TurnInput, rules: &BattleRules, registry: &mut Registry);
}

/// The resolvers of the standard physics step, in order.
#[must_use]
pub fn default_resolvers() -> Vec<Box<dyn Resolver>> {
    vec![Box::new(BulletResolver::new()), Box::new(PhysicsResolver::new())]
}
