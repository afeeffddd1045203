//! Battle configuration: rules, time budget and initial placement.
//!
//! Everything here is plain data with `serde` support so a battle can be
//! described in a JSON file. Missing fields fall back to their defaults.
//!
//! # Example
//!
//! ```
//! use robobattle_core::config::{BattleConfig, WakePolicy};
//!
//! let json = r#"{ "rules": { "rounds": 3 }, "budget": { "policy": "parallel" } }"#;
//! let config: BattleConfig = serde_json::from_str(json).unwrap();
//!
//! assert_eq!(config.rules.rounds, 3);
//! assert_eq!(config.rules.battlefield_width, 800.0);
//! assert_eq!(config.budget.policy, WakePolicy::Parallel);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::robot::{ROBOT_HEIGHT, ROBOT_WIDTH};
use crate::error::ConfigError;

// =============================================================================
// Battle Rules
// =============================================================================

/// Rules shared by every round of a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleRules {
    /// Battlefield width in units.
    pub battlefield_width: f64,
    /// Battlefield height in units.
    pub battlefield_height: f64,
    /// Number of rounds to play.
    pub rounds: u32,
    /// Gun heat removed per tick.
    pub gun_cooling_rate: f64,
    /// Ticks without meaningful energy loss before inactivity drain starts.
    pub inactivity_time: u64,
    /// Energy drained from every live robot per tick while inactive.
    pub inactivity_drain: f64,
    /// Accumulated energy loss that resets the inactivity counter.
    pub inactivity_reset_energy: f64,
    /// Frozen ticks played after a round is decided.
    pub end_ticks: u32,
}

impl Default for BattleRules {
    fn default() -> Self {
        Self {
            battlefield_width: 800.0,
            battlefield_height: 600.0,
            rounds: 10,
            gun_cooling_rate: 0.1,
            inactivity_time: 450,
            inactivity_drain: 0.1,
            inactivity_reset_energy: 10.0,
            end_ticks: 35,
        }
    }
}

impl BattleRules {
    /// Checks that the rules describe a playable battle.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the field cannot hold a robot, when no
    /// rounds are requested, or for a non-positive inactivity reset energy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.battlefield_width < ROBOT_WIDTH || self.battlefield_height < ROBOT_HEIGHT {
            return Err(ConfigError::FieldTooSmall {
                width: self.battlefield_width,
                height: self.battlefield_height,
            });
        }
        if self.rounds == 0 {
            return Err(ConfigError::NoRounds);
        }
        if !(self.inactivity_reset_energy.is_finite() && self.inactivity_reset_energy > 0.0) {
            return Err(ConfigError::InvalidResetEnergy(self.inactivity_reset_energy));
        }
        Ok(())
    }
}

// =============================================================================
// Time Budget
// =============================================================================

/// How robots are woken within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakePolicy {
    /// Wake one robot, wait for it, then wake the next.
    #[default]
    Serial,
    /// Wake every robot, then wait for all of them.
    Parallel,
}

/// Upper bound on the startup wait, however large the turn budget is.
pub const MAX_STARTUP_WAIT: Duration = Duration::from_secs(10);

/// Upper bound on the turn budget; larger timeout and scale products saturate
/// here.
pub const MAX_TURN_WAIT: Duration = Duration::from_secs(3600);

/// Multiplier applied to the turn budget for a robot's first turn.
const STARTUP_FACTOR: u32 = 300;

/// Per-robot time allowance for producing a turn's command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeBudget {
    /// Base wait per robot per tick (the CPU constant).
    pub turn_timeout: Duration,
    /// Global speed factor applied to `turn_timeout`.
    pub scale: f64,
    /// Serial or parallel wake-up.
    pub policy: WakePolicy,
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_millis(20),
            scale: 1.0,
            policy: WakePolicy::Serial,
        }
    }
}

impl TimeBudget {
    /// Wait allowed for one robot in an ordinary tick.
    #[must_use]
    pub fn turn_budget(&self) -> Duration {
        let secs = self.turn_timeout.as_secs_f64() * self.scale.max(0.0);
        Duration::try_from_secs_f64(secs)
            .map_or(MAX_TURN_WAIT, |budget| budget.min(MAX_TURN_WAIT))
    }

    /// Wait allowed for a robot's first tick of a round.
    #[must_use]
    pub fn startup_budget(&self) -> Duration {
        self.turn_budget()
            .saturating_mul(STARTUP_FACTOR)
            .min(MAX_STARTUP_WAIT)
    }

    /// Checks that the budget allows robots any time at all.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidScale`] for a negative or non-finite
    /// scale and [`ConfigError::ZeroTimeout`] for a zero budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale.is_finite() && self.scale >= 0.0) {
            return Err(ConfigError::InvalidScale(self.scale));
        }
        if self.turn_budget().is_zero() {
            return Err(ConfigError::ZeroTimeout(self.turn_budget()));
        }
        Ok(())
    }
}

// =============================================================================
// Battle Config
// =============================================================================

/// Complete description of a battle, minus the robots themselves.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Battle rules.
    pub rules: BattleRules,
    /// Robot time budget.
    pub budget: TimeBudget,
    /// Master seed for every random draw in the battle.
    pub seed: u64,
    /// Optional cap on ticks per second.
    pub max_tps: Option<u32>,
    /// Initial positions, e.g. `"(50,50,90), (?,100,0)"`.
    pub initial_positions: Option<String>,
}

impl BattleConfig {
    /// Validates rules and time budget.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules.validate()?;
        self.budget.validate()
    }

    /// Parsed initial positions, empty when none are configured.
    #[must_use]
    pub fn parsed_initial_positions(&self) -> Vec<InitialPosition> {
        self.initial_positions
            .as_deref()
            .map(parse_initial_positions)
            .unwrap_or_default()
    }
}

// =============================================================================
// Initial Positions
// =============================================================================

/// A requested start position; `None` components are chosen at random.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InitialPosition {
    /// X coordinate
    pub x: Option<f64>,
    /// Y coordinate
    pub y: Option<f64>,
    /// Heading in radians
    pub heading: Option<f64>,
}

/// Parses an initial position list.
///
/// Two forms are accepted: parenthesised triples `"(x,y,heading), ..."` and a
/// flat list `"x,y,heading,x,y,heading"`. Headings are in degrees. A `?` or
/// any component that does not parse becomes random; malformed input is
/// logged and skipped, never fatal.
///
/// ```
/// use robobattle_core::config::parse_initial_positions;
///
/// let positions = parse_initial_positions("(50,60,90), (?,100,x)");
/// assert_eq!(positions.len(), 2);
/// assert_eq!(positions[0].x, Some(50.0));
/// assert_eq!(positions[1].x, None);
/// assert_eq!(positions[1].heading, None);
/// ```
#[must_use]
pub fn parse_initial_positions(text: &str) -> Vec<InitialPosition> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let groups: Vec<Vec<&str>> = if text.contains('(') {
        text.split('(')
            .skip(1)
            .map(|group| {
                let inner = group.split(')').next().unwrap_or("");
                inner.split(',').collect()
            })
            .collect()
    } else {
        let tokens: Vec<&str> = text.split(',').collect();
        tokens.chunks(3).map(<[&str]>::to_vec).collect()
    };

    groups
        .into_iter()
        .map(|coords| InitialPosition {
            x: coords.first().and_then(|c| parse_coordinate(c)),
            y: coords.get(1).and_then(|c| parse_coordinate(c)),
            heading: coords
                .get(2)
                .and_then(|c| parse_coordinate(c))
                .map(f64::to_radians),
        })
        .collect()
}

fn parse_coordinate(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() || token == "?" {
        return None;
    }
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(token, "ignoring malformed initial position component");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod rules_tests {
        use super::*;

        #[test]
        fn default_rules_are_valid() {
            assert!(BattleRules::default().validate().is_ok());
        }

        #[test]
        fn tiny_field_rejected() {
            let rules = BattleRules {
                battlefield_width: 10.0,
                ..BattleRules::default()
            };
            assert!(matches!(
                rules.validate(),
                Err(ConfigError::FieldTooSmall { .. })
            ));
        }

        #[test]
        fn zero_rounds_rejected() {
            let rules = BattleRules {
                rounds: 0,
                ..BattleRules::default()
            };
            assert_eq!(rules.validate(), Err(ConfigError::NoRounds));
        }

        #[test]
        fn reset_energy_must_be_positive() {
            for energy in [0.0, -10.0, f64::INFINITY] {
                let rules = BattleRules {
                    inactivity_reset_energy: energy,
                    ..BattleRules::default()
                };
                assert!(matches!(
                    rules.validate(),
                    Err(ConfigError::InvalidResetEnergy(_))
                ));
            }
            let nan = BattleRules {
                inactivity_reset_energy: f64::NAN,
                ..BattleRules::default()
            };
            assert!(nan.validate().is_err());
        }
    }

    mod budget_tests {
        use super::*;

        #[test]
        fn turn_budget_applies_scale() {
            let budget = TimeBudget {
                turn_timeout: Duration::from_millis(10),
                scale: 2.5,
                policy: WakePolicy::Serial,
            };
            assert_eq!(budget.turn_budget(), Duration::from_millis(25));
        }

        #[test]
        fn startup_budget_is_capped() {
            let budget = TimeBudget {
                turn_timeout: Duration::from_secs(1),
                ..TimeBudget::default()
            };
            assert_eq!(budget.startup_budget(), MAX_STARTUP_WAIT);

            let small = TimeBudget {
                turn_timeout: Duration::from_millis(1),
                ..TimeBudget::default()
            };
            assert_eq!(small.startup_budget(), Duration::from_millis(300));
        }

        #[test]
        fn zero_budget_rejected() {
            let budget = TimeBudget {
                scale: 0.0,
                ..TimeBudget::default()
            };
            assert!(matches!(budget.validate(), Err(ConfigError::ZeroTimeout(_))));
        }

        #[test]
        fn bad_scale_rejected() {
            for scale in [-1.0, f64::NAN, f64::INFINITY] {
                let budget = TimeBudget {
                    scale,
                    ..TimeBudget::default()
                };
                assert!(matches!(budget.validate(), Err(ConfigError::InvalidScale(_))));
            }
        }

        #[test]
        fn huge_budgets_saturate() {
            let budget = TimeBudget {
                turn_timeout: Duration::MAX,
                scale: 1e300,
                policy: WakePolicy::Parallel,
            };
            assert_eq!(budget.turn_budget(), MAX_TURN_WAIT);
            assert_eq!(budget.startup_budget(), MAX_STARTUP_WAIT);
            assert!(budget.validate().is_ok());

            let infinite = TimeBudget {
                scale: f64::INFINITY,
                ..TimeBudget::default()
            };
            assert_eq!(infinite.turn_budget(), MAX_TURN_WAIT);
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn empty_json_gives_defaults() {
            let config: BattleConfig = serde_json::from_str("{}").unwrap();
            assert_eq!(config, BattleConfig::default());
        }

        #[test]
        fn serialization_roundtrip() {
            let config = BattleConfig {
                seed: 7,
                max_tps: Some(30),
                initial_positions: Some("(1,2,3)".to_string()),
                ..BattleConfig::default()
            };
            let json = serde_json::to_string(&config).unwrap();
            let back: BattleConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(back, config);
        }

        #[test]
        fn parsed_positions_empty_without_config() {
            assert!(BattleConfig::default().parsed_initial_positions().is_empty());
        }
    }

    mod initial_position_tests {
        use super::*;

        #[test]
        fn parses_parenthesised_triples() {
            let positions = parse_initial_positions("(50, 60, 90), (100,200,180)");
            assert_eq!(positions.len(), 2);
            assert_eq!(positions[0].x, Some(50.0));
            assert_eq!(positions[0].y, Some(60.0));
            let heading = positions[0].heading.unwrap();
            assert!((heading - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
            assert_eq!(positions[1].y, Some(200.0));
        }

        #[test]
        fn parses_flat_list() {
            let positions = parse_initial_positions("10,20,0,30,40");
            assert_eq!(positions.len(), 2);
            assert_eq!(positions[0].x, Some(10.0));
            assert_eq!(positions[0].heading, Some(0.0));
            assert_eq!(positions[1].x, Some(30.0));
            assert_eq!(positions[1].y, Some(40.0));
            assert_eq!(positions[1].heading, None);
        }

        #[test]
        fn question_mark_means_random() {
            let positions = parse_initial_positions("(?, 5, ?)");
            assert_eq!(positions[0].x, None);
            assert_eq!(positions[0].y, Some(5.0));
            assert_eq!(positions[0].heading, None);
        }

        #[test]
        fn malformed_components_are_ignored() {
            let positions = parse_initial_positions("(abc, 5, NaN)");
            assert_eq!(positions.len(), 1);
            assert_eq!(positions[0].x, None);
            assert_eq!(positions[0].y, Some(5.0));
            assert_eq!(positions[0].heading, None);
        }

        #[test]
        fn blank_text_gives_nothing() {
            assert!(parse_initial_positions("   ").is_empty());
        }
    }

    proptest! {
        #[test]
        fn parser_never_panics(text in ".{0,64}") {
            let _ = parse_initial_positions(&text);
        }

        #[test]
        fn parsed_values_are_finite(text in "[0-9?,() .-]{0,48}") {
            for position in parse_initial_positions(&text) {
                for value in [position.x, position.y, position.heading].into_iter().flatten() {
                    prop_assert!(value.is_finite());
                }
            }
        }
    }
}
