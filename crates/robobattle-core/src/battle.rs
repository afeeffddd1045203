//! The battle driver: lifecycle state machine and per-tick loop.
//!
//! A [`Battle`] owns every piece of mutable battle state and is advanced by
//! a single driver thread, the one calling [`Battle::run`]. Each tick runs
//! the same fixed sequence:
//!
//! 1. Honor pause / single-step, then check for abort
//! 2. Draw this tick's wake order and, separately, its resolution order
//! 3. Collect commands through the [`Scheduler`] in wake order
//! 4. Run the resolvers (bullets, then robots) in resolution order
//! 5. Detect deaths and score them
//! 6. Drain the [`CommandBridge`]
//! 7. Capture a [`TurnSnapshot`] for the observers
//!
//! Once a single contestant remains the round enters its grace period:
//! gameplay freezes, winners are scored on the first grace tick and, in the
//! last round, results are computed on the second.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use robobattle_core::battle::Battle;
//! use robobattle_core::command::RobotCommand;
//! use robobattle_core::config::BattleConfig;
//! use robobattle_core::entity::RobotConsole;
//! use robobattle_core::program::{
//!     ProgramFactory, RobotFactory, RobotProgram, RobotSpec, RobotView,
//! };
//!
//! fn sitting_duck(name: &str) -> Arc<dyn RobotFactory> {
//!     Arc::new(ProgramFactory::new(RobotSpec::new(name), || {
//!         let program = |_: &RobotView, _: &RobotConsole| RobotCommand::new();
//!         Ok(Box::new(program) as Box<dyn RobotProgram>)
//!     }))
//! }
//!
//! let mut battle = Battle::builder(BattleConfig::default())
//!     .robot(sitting_duck("sample.DuckA"))
//!     .robot(sitting_duck("sample.DuckB"))
//!     .build()?;
//! let results = battle.run()?;
//! println!("winner: {}", results[0].name);
//! # Ok::<(), robobattle_core::error::BattleError>(())
//! ```

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use crate::bridge::{BattleControl, CommandBridge};
use crate::config::BattleConfig;
use crate::entity::RobotId;
use crate::error::{BattleError, ConfigError};
use crate::loader::RobotLoader;
use crate::observer::BattleObserver;
use crate::program::{RobotEvent, RobotFactory};
use crate::registry::{ContestantEntry, Registry};
use crate::resolver::{
    default_resolvers, resolution_order, BulletResolver, Resolver, TurnInput,
};
use crate::scheduler::Scheduler;
use crate::scoring::{
    compute_results, detect_deaths, handle_death_robots, placement_tie_break, score_round_winners,
    ContestantResult, TieBreak,
};
use crate::snapshot::TurnSnapshot;

const BANNER: &str = "=========================";

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BattlePhase {
    /// Built, not yet running.
    Uninitialized,
    /// Loader started, first round requested.
    BattleStarting,
    /// Robots being placed and started.
    RoundStarting,
    /// Tick boundary: pause and abort are honored here.
    TurnStarting,
    /// Commands collected and resolved.
    TurnRunning,
    /// Bridge drained, snapshot taken.
    TurnEnding,
    /// Robots stopped, next round requested.
    RoundEnding,
    /// Results reported, loader stopped.
    BattleEnding,
    /// Everything released.
    BattleFinalized,
}

impl fmt::Display for BattlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects robots, observers and options for a [`Battle`].
pub struct BattleBuilder {
    config: BattleConfig,
    entries: Vec<ContestantEntry>,
    factories: Vec<Arc<dyn RobotFactory>>,
    observers: Vec<Box<dyn BattleObserver>>,
    resolvers: Option<Vec<Box<dyn Resolver>>>,
    tie_break: TieBreak,
    bridge: CommandBridge,
}

impl fmt::Debug for BattleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BattleBuilder")
            .field("config", &self.config)
            .field("entries", &self.entries)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl BattleBuilder {
    /// Control handle for the battle being built.
    ///
    /// Commands sent before [`Battle::run`] are applied on the first tick.
    #[must_use]
    pub fn control(&self) -> BattleControl {
        self.bridge.control()
    }

    /// Adds a lone robot.
    #[must_use]
    pub fn robot(mut self, factory: Arc<dyn RobotFactory>) -> Self {
        self.entries
            .push(ContestantEntry::Solo(factory.spec().display_name()));
        self.factories.push(factory);
        self
    }

    /// Adds a team; the first member leads it.
    ///
    /// A team without members is rejected by [`BattleBuilder::build`].
    #[must_use]
    pub fn team(mut self, name: impl Into<String>, members: Vec<Arc<dyn RobotFactory>>) -> Self {
        self.entries.push(ContestantEntry::Team {
            name: name.into(),
            members: members.iter().map(|m| m.spec().display_name()).collect(),
        });
        self.factories.extend(members);
        self
    }

    /// Registers an observer.
    #[must_use]
    pub fn observer(mut self, observer: Box<dyn BattleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replaces the resolver pipeline.
    #[must_use]
    pub fn resolvers(mut self, resolvers: Vec<Box<dyn Resolver>>) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    /// Sets the comparator for contestants with equal scores.
    #[must_use]
    pub fn tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Validates the configuration and builds the battle.
    ///
    /// Robots whose names are too long are disabled, not rejected.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::Config`] for invalid rules or budget, for a
    /// team without members, or when no robot was added.
    pub fn build(self) -> Result<Battle, BattleError> {
        self.config.validate()?;
        for entry in &self.entries {
            if let ContestantEntry::Team { name, members } = entry {
                if members.is_empty() {
                    return Err(ConfigError::EmptyTeam(name.clone()).into());
                }
            }
        }
        if self.factories.is_empty() {
            return Err(ConfigError::NoRobots.into());
        }

        let mut registry = Registry::new(&self.entries);
        for (robot, factory) in registry.robots_mut().iter_mut().zip(&self.factories) {
            if let Some(reason) = factory.spec().name_violation() {
                warn!(robot = %robot.name(), %reason, "disabling robot");
                robot.disable(reason);
            }
        }

        let budget = self.config.budget.clone();
        Ok(Battle {
            rng: ChaCha8Rng::seed_from_u64(self.config.seed),
            config: self.config,
            registry,
            factories: self.factories,
            resolvers: self.resolvers.unwrap_or_else(default_resolvers),
            observers: self.observers,
            bridge: self.bridge,
            scheduler: Scheduler::new(budget),
            tie_break: self.tie_break,
            phase: BattlePhase::Uninitialized,
            round: 0,
            time: 0,
            end_timer: 0,
            aborted: false,
            results: None,
        })
    }
}

// =============================================================================
// Battle
// =============================================================================

/// One battle: the aggregate root of all battle state.
pub struct Battle {
    config: BattleConfig,
    registry: Registry,
    factories: Vec<Arc<dyn RobotFactory>>,
    resolvers: Vec<Box<dyn Resolver>>,
    observers: Vec<Box<dyn BattleObserver>>,
    bridge: CommandBridge,
    scheduler: Scheduler,
    rng: ChaCha8Rng,
    tie_break: TieBreak,
    phase: BattlePhase,
    round: u32,
    time: u64,
    end_timer: u32,
    aborted: bool,
    results: Option<Vec<ContestantResult>>,
}

impl fmt::Debug for Battle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Battle")
            .field("phase", &self.phase)
            .field("round", &self.round)
            .field("time", &self.time)
            .field("robots", &self.registry.robots().len())
            .field("resolvers", &format!("[{} resolvers]", self.resolvers.len()))
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Battle {
    /// Starts describing a battle.
    #[must_use]
    pub fn builder(config: BattleConfig) -> BattleBuilder {
        BattleBuilder {
            config,
            entries: Vec::new(),
            factories: Vec::new(),
            observers: Vec::new(),
            resolvers: None,
            tie_break: placement_tie_break,
            bridge: CommandBridge::new(),
        }
    }

    /// Control handle usable from any thread.
    #[must_use]
    pub fn control(&self) -> BattleControl {
        self.bridge.control()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> BattlePhase {
        self.phase
    }

    /// Battle state.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Final results, once computed.
    #[must_use]
    pub fn results(&self) -> Option<&[ContestantResult]> {
        self.results.as_deref()
    }

    /// True when the battle ended through [`BattleControl::abort`].
    #[must_use]
    pub const fn was_aborted(&self) -> bool {
        self.aborted
    }

    fn set_phase(&mut self, phase: BattlePhase) {
        debug!(
            from = %self.phase,
            to = %phase,
            round = self.round,
            time = self.time,
            "phase transition"
        );
        self.phase = phase;
    }

    /// Plays every round and returns the ranked results.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError`] when the battle was already run, or for
    /// systemic faults: a thread that cannot be spawned or a loader that
    /// stops early. Robot faults never surface here.
    pub fn run(&mut self) -> Result<Vec<ContestantResult>, BattleError> {
        if self.phase != BattlePhase::Uninitialized {
            return Err(BattleError::AlreadyRun);
        }
        let outcome = self.run_battle();
        self.bridge.close();
        outcome
    }

    fn run_battle(&mut self) -> Result<Vec<ContestantResult>, BattleError> {
        self.set_phase(BattlePhase::BattleStarting);
        let rounds = self.config.rules.rounds;
        let robots = self.registry.robots().len();
        info!(rounds, robots, seed = self.config.seed, "battle starting");

        let names = self.registry.robots().iter().map(|r| r.name().to_string()).collect();
        let mut loader = RobotLoader::spawn(
            self.factories.clone(),
            names,
            self.config.rules.clone(),
            self.config.parsed_initial_positions(),
            self.config.seed,
        )?;
        loader.request(0)?;
        for observer in &mut self.observers {
            observer.on_battle_started(rounds, robots);
        }

        for round in 0..rounds {
            if self.bridge.is_aborted() {
                self.aborted = true;
                break;
            }
            self.round = round;
            self.run_round(&loader)?;
            if self.aborted {
                break;
            }
        }

        self.set_phase(BattlePhase::BattleEnding);
        self.finish_results();
        let results = self.results.clone().unwrap_or_default();
        for observer in &mut self.observers {
            observer.on_battle_completed(&results);
        }
        loader.shutdown();
        self.set_phase(BattlePhase::BattleFinalized);
        for observer in &mut self.observers {
            observer.on_battle_ended(self.aborted);
        }
        info!(aborted = self.aborted, "battle finished");
        Ok(results)
    }

    // -------------------------------------------------------------------------
    // Rounds
    // -------------------------------------------------------------------------

    fn start_round(&mut self, loader: &RobotLoader) -> Result<(), BattleError> {
        self.set_phase(BattlePhase::RoundStarting);
        self.registry.reset_for_round();
        self.time = 0;
        self.end_timer = 0;

        let loaded = loader.wait_loaded(self.round)?;
        loader.release();

        let banner = format!("Round {} of {}", self.round + 1, self.config.rules.rounds);
        info!("{BANNER}");
        info!("{banner}");
        info!("{BANNER}");

        for (index, (program, (position, heading))) in
            loaded.programs.into_iter().zip(loaded.placements).enumerate()
        {
            let id = RobotId::new(index);
            let robot = self.registry.robot_mut(id);
            robot.println(BANNER);
            robot.println(banner.clone());
            robot.println(BANNER);
            robot.place(position, heading);
            if robot.disabled_reason().is_some() {
                continue;
            }
            match program {
                Ok(program) => {
                    let console = robot.console().clone();
                    let name = robot.name().to_string();
                    self.scheduler.start_robot(id, &name, program, console)?;
                    self.registry.robot_mut(id).set_running(true);
                }
                Err(err) => {
                    error!(robot = %robot.name(), error = %err, "robot could not be loaded");
                    robot.println(format!("SYSTEM: {err}"));
                    robot.println("SYSTEM: Robot disabled for this round.");
                    robot.zero_energy();
                }
            }
        }
        self.registry.recompute_active_robots();

        for observer in &mut self.observers {
            observer.on_round_started(self.round);
        }
        Ok(())
    }

    fn run_round(&mut self, loader: &RobotLoader) -> Result<(), BattleError> {
        self.start_round(loader)?;
        loop {
            let tick_started = Instant::now();
            self.set_phase(BattlePhase::TurnStarting);
            self.bridge.wait_while_paused();
            if self.bridge.is_aborted() {
                self.abort_round();
                break;
            }

            self.set_phase(BattlePhase::TurnRunning);
            let order = self.run_turn();

            self.set_phase(BattlePhase::TurnEnding);
            let round_over = self.end_turn(&order);
            self.throttle(tick_started);
            if round_over {
                break;
            }
        }
        self.end_round(loader)
    }

    /// Collects and resolves one tick. Returns the tick's resolution order.
    fn run_turn(&mut self) -> Vec<RobotId> {
        let robots = self.registry.robots().len();
        let wake_order = Scheduler::wake_order(robots, &mut self.rng);
        let order = resolution_order(robots, &mut self.rng);

        if self.end_timer == 0 {
            let rules = &self.config.rules;
            let views = self.registry.build_views(self.round, self.time, rules);
            let mut input = TurnInput::empty(self.time, order.clone(), robots);
            self.scheduler.collect(&mut input, &wake_order, views, &mut self.registry);
            for resolver in &self.resolvers {
                resolver.resolve(&input, &self.config.rules, &mut self.registry);
            }
        } else {
            BulletResolver::retire_finished(&mut self.registry);
        }

        detect_deaths(&mut self.registry, &order);
        handle_death_robots(&mut self.registry);

        if self.end_timer > 0 || self.registry.one_team_remaining() {
            self.shutdown_turn(&order);
        }
        order
    }

    /// Grace-period bookkeeping once the round is decided.
    fn shutdown_turn(&mut self, order: &[RobotId]) {
        match self.end_timer {
            0 => {
                let winners = score_round_winners(&mut self.registry, order);
                info!(round = self.round, winners = winners.len(), "round decided");
                for robot in self.registry.robots_mut() {
                    robot.set_halted(true);
                }
            }
            1 if self.round + 1 == self.config.rules.rounds => self.finish_results(),
            _ => {}
        }
        self.end_timer += 1;
    }

    /// Drains control commands and publishes the snapshot. Returns `true`
    /// when the round is over.
    fn end_turn(&mut self, order: &[RobotId]) -> bool {
        let applied = self.bridge.drain(&mut self.registry);
        if applied > 0 {
            detect_deaths(&mut self.registry, order);
            handle_death_robots(&mut self.registry);
        }
        self.registry.recompute_active_robots();

        let round_over = self.end_timer > self.config.rules.end_ticks;
        if round_over {
            self.add_round_ended_events();
        }

        let snapshot = TurnSnapshot::capture(&self.registry, self.round, self.time);
        for observer in &mut self.observers {
            observer.on_turn_ended(&snapshot);
        }
        self.time += 1;
        round_over
    }

    fn throttle(&self, tick_started: Instant) {
        let Some(tps) = self.config.max_tps.filter(|&tps| tps > 0) else {
            return;
        };
        let interval = Duration::from_secs(1) / tps;
        if let Some(remaining) = interval.checked_sub(tick_started.elapsed()) {
            thread::sleep(remaining);
        }
    }

    fn abort_round(&mut self) {
        info!(round = self.round, time = self.time, "battle aborted");
        self.aborted = true;
        for robot in self.registry.robots() {
            if robot.is_alive() {
                robot.println("SYSTEM: game aborted.");
            }
        }
        self.finish_results();
        self.add_round_ended_events();
    }

    fn add_round_ended_events(&mut self) {
        let (round, turns) = (self.round, self.time + 1);
        for robot in self.registry.robots_mut() {
            robot.add_event(RobotEvent::RoundEnded { round, turns });
        }
    }

    fn end_round(&mut self, loader: &RobotLoader) -> Result<(), BattleError> {
        self.set_phase(BattlePhase::RoundEnding);
        let next = self.round + 1;
        if !self.aborted && next < self.config.rules.rounds {
            loader.request(next)?;
        }

        let abandoned = self.scheduler.stop_all();
        if abandoned > 0 {
            warn!(round = self.round, abandoned, "robot threads did not stop");
        }
        for robot in self.registry.robots_mut() {
            robot.set_running(false);
        }
        info!(round = self.round, turns = self.time, "round ended");
        for observer in &mut self.observers {
            observer.on_round_ended(self.round, self.time);
        }
        Ok(())
    }

    /// Computes the ranked results, at most once per battle.
    fn finish_results(&mut self) {
        if self.results.is_some() {
            return;
        }
        let results = compute_results(&self.registry, self.tie_break);
        let aborted = self.aborted;
        for robot in self.registry.robots_mut() {
            let result = results
                .iter()
                .find(|r| r.members.iter().any(|m| m == robot.name()))
                .cloned();
            robot.add_event(RobotEvent::BattleEnded { aborted, result });
        }
        for result in &results {
            info!(rank = result.rank, name = %result.name, score = result.total_score(), "result");
        }
        self.results = Some(results);
    }
}
