//! Error types for battle setup, robot loading and the driver.
//!
//! Only configuration and systemic faults surface as [`BattleError`]. Faults
//! inside robot code never escape the robot that caused them: they are turned
//! into console output and a disabled robot instead.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating a battle configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Battlefield too small to hold a single robot.
    #[error("battlefield {width}x{height} is smaller than one robot")]
    FieldTooSmall {
        /// Requested width
        width: f64,
        /// Requested height
        height: f64,
    },
    /// A battle needs at least one round.
    #[error("battle must have at least one round")]
    NoRounds,
    /// A battle needs at least one robot.
    #[error("battle must have at least one robot")]
    NoRobots,
    /// The per-turn timeout must be positive.
    #[error("turn timeout must be positive, got {0:?}")]
    ZeroTimeout(Duration),
    /// The time scale must be finite and not negative.
    #[error("time scale must be a finite non-negative number, got {0}")]
    InvalidScale(f64),
    /// The inactivity reset energy must be finite and positive.
    #[error("inactivity reset energy must be a finite positive number, got {0}")]
    InvalidResetEnergy(f64),
    /// A team needs at least one member to lead it.
    #[error("team {0} has no members")]
    EmptyTeam(String),
}

/// Errors raised while instantiating a robot program.
///
/// These are always contained to the offending robot: the loader writes the
/// error to the robot console and disables the robot for the round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The factory has no program to hand out.
    #[error("no robot program available for {0}")]
    Missing(String),
    /// The factory reported a construction failure.
    #[error("unable to instantiate {name}: {reason}")]
    Construction {
        /// Robot name
        name: String,
        /// Reason reported by the factory
        reason: String,
    },
    /// The factory panicked while constructing the program.
    #[error("an error occurred during initialization of {name}: {message}")]
    Panicked {
        /// Robot name
        name: String,
        /// Panic payload, if it was a string
        message: String,
    },
}

/// Errors returned by the battle driver.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Invalid battle configuration.
    #[error("invalid battle configuration: {0}")]
    Config(#[from] ConfigError),
    /// A background thread could not be spawned.
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        /// Which thread failed to start
        what: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// The robot loader stopped before delivering a round.
    #[error("robot loader stopped before round {0} was loaded")]
    LoaderGone(u32),
    /// A battle can only be run once.
    #[error("battle has already been run")]
    AlreadyRun,
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
