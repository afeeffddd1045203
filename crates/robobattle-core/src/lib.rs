//! # Robobattle Core
//!
//! Turn-synchronized battle engine for independently written, untrusted
//! robot programs.
//!
//! Every robot runs on its own worker thread. Once per tick the engine wakes
//! the robots in a fresh random order, waits a bounded time for each one's
//! command, then applies the complete command set in a deterministic physics
//! step. One slow or crashing robot never stalls or corrupts the others.
//!
//! ## Architecture
//!
//! - **Registry**: robots, bullets and contestants ([`registry`], [`entity`])
//! - **Scheduler**: the per-tick turn barrier ([`scheduler`])
//! - **Resolvers**: bullets, movement, collisions ([`resolver`])
//! - **Scoring**: deaths, placements, results ([`scoring`])
//! - **Loader**: next-round program construction off the driver thread ([`loader`])
//! - **Bridge**: control commands from other threads ([`bridge`])
//! - **Battle**: the lifecycle state machine tying it together ([`battle`])
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use robobattle_core::prelude::*;
//!
//! let duck = |name: &str| -> Arc<dyn RobotFactory> {
//!     Arc::new(ProgramFactory::new(RobotSpec::new(name), || {
//!         let program = |_: &RobotView, _: &RobotConsole| RobotCommand::new();
//!         Ok(Box::new(program) as Box<dyn RobotProgram>)
//!     }))
//! };
//!
//! let mut config = BattleConfig::default();
//! config.rules.rounds = 1;
//! config.rules.end_ticks = 0;
//! config.budget.turn_timeout = Duration::from_millis(200);
//!
//! let mut battle = Battle::builder(config).robot(duck("sample.Duck")).build()?;
//! let results = battle.run()?;
//! assert_eq!(results[0].name, "sample.Duck");
//! # Ok::<(), BattleError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod battle;
pub mod bridge;
pub mod command;
pub mod config;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod observer;
pub mod program;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod scoring;
pub mod snapshot;
pub mod telemetry;

pub use battle::{Battle, BattleBuilder, BattlePhase};
pub use bridge::{BattleControl, ControlCommand};
pub use error::{BattleError, ConfigError, LoadError};

/// Commonly used types.
pub mod prelude {
    pub use crate::battle::{Battle, BattleBuilder, BattlePhase};
    pub use crate::bridge::{BattleControl, ControlCommand};
    pub use crate::command::{DebugMark, RobotCommand};
    pub use crate::config::{BattleConfig, BattleRules, TimeBudget, WakePolicy};
    pub use crate::entity::{RobotConsole, RobotId};
    pub use crate::error::{BattleError, ConfigError, LoadError};
    pub use crate::observer::{BattleObserver, RecordingObserver};
    pub use crate::program::{
        InputEvent, ProgramFactory, RobotEvent, RobotFactory, RobotProgram, RobotSpec, RobotView,
    };
    pub use crate::scoring::ContestantResult;
    pub use crate::snapshot::TurnSnapshot;
}

#[cfg(test)]
mod tests;
