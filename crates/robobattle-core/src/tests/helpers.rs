//! Test helpers: robot factories, battle configs and scripted observers.

use std::sync::Arc;
use std::time::Duration;

use crate::battle::{Battle, BattleBuilder};
use crate::bridge::BattleControl;
use crate::command::RobotCommand;
use crate::config::{BattleConfig, BattleRules, TimeBudget};
use crate::entity::{RobotConsole, RobotId};
use crate::observer::{BattleObserver, Recording, RecordingObserver};
use crate::program::{ProgramFactory, RobotFactory, RobotProgram, RobotSpec, RobotView};
use crate::snapshot::{RobotSnapshot, TurnSnapshot};

// =============================================================================
// Robots
// =============================================================================

/// Factory building a fresh program from `make` every round.
pub fn factory<F, P>(name: &str, make: F) -> Arc<dyn RobotFactory>
where
    F: Fn() -> P + Send + Sync + 'static,
    P: RobotProgram + 'static,
{
    Arc::new(ProgramFactory::new(RobotSpec::new(name), move || {
        Ok(Box::new(make()) as Box<dyn RobotProgram>)
    }))
}

/// A robot that never does anything.
pub fn sitting_duck(name: &str) -> Arc<dyn RobotFactory> {
    factory(name, || |_: &RobotView, _: &RobotConsole| RobotCommand::new())
}

/// A robot that always drives forward at full speed.
pub fn runner(name: &str) -> Arc<dyn RobotFactory> {
    factory(name, || |_: &RobotView, _: &RobotConsole| RobotCommand::new().ahead(8.0))
}

// =============================================================================
// Configs
// =============================================================================

/// A 400×400 single-round battle with a generous time budget.
pub fn arena_config(initial_positions: Option<&str>) -> BattleConfig {
    BattleConfig {
        rules: BattleRules {
            battlefield_width: 400.0,
            battlefield_height: 400.0,
            rounds: 1,
            end_ticks: 2,
            ..BattleRules::default()
        },
        budget: TimeBudget {
            turn_timeout: Duration::from_millis(500),
            ..TimeBudget::default()
        },
        seed: 42,
        max_tps: None,
        initial_positions: initial_positions.map(str::to_string),
    }
}

/// Adds a recorder to `builder`, runs the battle and returns what was seen.
pub fn run_recorded(builder: BattleBuilder) -> (Battle, Recording) {
    let recorder = RecordingObserver::new();
    let mut battle = builder
        .observer(Box::new(recorder.clone()))
        .build()
        .expect("valid battle");
    battle.run().expect("battle runs");
    (battle, recorder.recording())
}

/// Robot `id` in a snapshot.
pub fn robot_at(snapshot: &TurnSnapshot, id: usize) -> &RobotSnapshot {
    snapshot.robot(RobotId::new(id)).expect("robot in snapshot")
}

// =============================================================================
// Scripted observers
// =============================================================================

/// Aborts the battle once tick `at` has been observed.
pub struct AbortAt {
    control: BattleControl,
    at: u64,
}

impl AbortAt {
    /// Boxed observer aborting after tick `at`.
    pub fn boxed(control: BattleControl, at: u64) -> Box<dyn BattleObserver> {
        Box::new(Self { control, at })
    }
}

impl BattleObserver for AbortAt {
    fn on_turn_ended(&mut self, snapshot: &TurnSnapshot) {
        if snapshot.time >= self.at {
            self.control.abort();
        }
    }
}

/// Kills a robot through the control surface once tick `at` has been observed.
pub struct KillAt {
    control: BattleControl,
    robot: RobotId,
    at: u64,
    sent: bool,
}

impl KillAt {
    /// Boxed observer killing `robot` after tick `at`.
    pub fn boxed(control: BattleControl, robot: RobotId, at: u64) -> Box<dyn BattleObserver> {
        Box::new(Self {
            control,
            robot,
            at,
            sent: false,
        })
    }
}

impl BattleObserver for KillAt {
    fn on_turn_ended(&mut self, snapshot: &TurnSnapshot) {
        if !self.sent && snapshot.time >= self.at {
            self.control.kill_robot(self.robot);
            self.sent = true;
        }
    }
}
