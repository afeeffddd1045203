//! Score keeping, death handling and final ranking.
//!
//! Scores accumulate per robot in [`RobotStatistics`] and are aggregated per
//! [`Contestant`] when results are built. The driver calls
//! [`handle_death_robots`] once per tick after the physics step, and
//! [`score_round_winners`] / [`compute_results`] from the end-of-round grace
//! ticks.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::{Contestant, RobotId};
use crate::program::RobotEvent;
use crate::registry::Registry;

/// Points each surviving enemy earns when a robot dies.
pub const SURVIVAL_SCORE: f64 = 50.0;
/// Last-survivor bonus per robot on the other contestants.
pub const LAST_SURVIVOR_BONUS: f64 = 10.0;
/// Share of damage dealt to a victim paid out on the kill.
pub const BULLET_KILL_BONUS: f64 = 0.2;

// =============================================================================
// Score Breakdown
// =============================================================================

/// Score components and placement counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Points for outliving other robots
    pub survival: f64,
    /// Bonus for being on the last contestant standing
    pub last_survivor_bonus: f64,
    /// Damage dealt with bullets
    pub bullet_damage: f64,
    /// Bonus for bullet kills
    pub bullet_kill_bonus: f64,
    /// Rounds finished first
    pub firsts: u32,
    /// Rounds finished second
    pub seconds: u32,
    /// Rounds finished third
    pub thirds: u32,
}

impl ScoreBreakdown {
    /// Sum of the point components.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.survival + self.last_survivor_bonus + self.bullet_damage + self.bullet_kill_bonus
    }

    fn accumulate(&mut self, other: &ScoreBreakdown) {
        self.survival += other.survival;
        self.last_survivor_bonus += other.last_survivor_bonus;
        self.bullet_damage += other.bullet_damage;
        self.bullet_kill_bonus += other.bullet_kill_bonus;
        self.firsts += other.firsts;
        self.seconds += other.seconds;
        self.thirds += other.thirds;
    }
}

// =============================================================================
// Robot Statistics
// =============================================================================

/// Per-robot score keeping for the current round and the whole battle.
#[derive(Debug, Clone, Default)]
pub struct RobotStatistics {
    round: ScoreBreakdown,
    total: ScoreBreakdown,
    damage_dealt: BTreeMap<RobotId, f64>,
}

impl RobotStatistics {
    /// Clears round scores; battle totals are kept.
    pub fn reset_round(&mut self) {
        self.round = ScoreBreakdown::default();
        self.damage_dealt.clear();
    }

    fn apply(&mut self, f: impl Fn(&mut ScoreBreakdown)) {
        f(&mut self.round);
        f(&mut self.total);
    }

    /// Another robot died while this one lived.
    pub fn score_survival(&mut self) {
        self.apply(|s| s.survival += SURVIVAL_SCORE);
    }

    /// This robot is on the last contestant standing.
    pub fn score_last_survivor(&mut self, enemy_count: usize, counts_as_first: bool) {
        #[allow(clippy::cast_precision_loss)]
        let bonus = LAST_SURVIVOR_BONUS * enemy_count as f64;
        self.apply(|s| {
            s.last_survivor_bonus += bonus;
            if counts_as_first {
                s.firsts += 1;
            }
        });
    }

    /// Awards a first place without a survivor bonus (team leaders).
    pub fn score_first(&mut self) {
        self.apply(|s| s.firsts += 1);
    }

    /// Records the robot's elimination with `others_active` contestants left.
    pub fn score_robot_death(&mut self, others_active: usize, winner: bool) {
        match others_active {
            0 if !winner => self.apply(|s| s.firsts += 1),
            1 => self.apply(|s| s.seconds += 1),
            2 => self.apply(|s| s.thirds += 1),
            _ => {}
        }
    }

    /// Records bullet damage dealt to `victim`.
    pub fn score_bullet_damage(&mut self, victim: RobotId, damage: f64) {
        *self.damage_dealt.entry(victim).or_insert(0.0) += damage;
        self.apply(|s| s.bullet_damage += damage);
    }

    /// Records a bullet kill. Returns the bonus awarded.
    pub fn score_bullet_kill(&mut self, victim: RobotId) -> f64 {
        let bonus = self.damage_dealt.get(&victim).copied().unwrap_or(0.0) * BULLET_KILL_BONUS;
        self.apply(|s| s.bullet_kill_bonus += bonus);
        bonus
    }

    /// Scores in the current round.
    #[must_use]
    pub const fn round(&self) -> &ScoreBreakdown {
        &self.round
    }

    /// Scores across the battle.
    #[must_use]
    pub const fn total(&self) -> &ScoreBreakdown {
        &self.total
    }
}

// =============================================================================
// Death Handling
// =============================================================================

/// Marks every live robot at or below zero energy as dead.
///
/// Returns the newly dead robots, which are also queued for
/// [`handle_death_robots`].
pub fn detect_deaths(registry: &mut Registry, order: &[RobotId]) -> Vec<RobotId> {
    let mut dead = Vec::new();
    for &id in order {
        let robot = registry.robot_mut(id);
        if robot.is_alive() && robot.energy() <= 0.0 && robot.mark_dead() {
            dead.push(id);
        }
    }
    for &id in &dead {
        registry.queue_death(id);
    }
    dead
}

/// Scores queued deaths and notifies the survivors.
///
/// A robot is placed only when it was its contestant's last living member;
/// every living robot not on the dead robot's team earns survival points.
/// Returns the number of deaths handled.
pub fn handle_death_robots(registry: &mut Registry) -> usize {
    let deaths = registry.take_death_queue();
    for &dead_id in &deaths {
        let dead_team = registry.robot(dead_id).team();
        let dead_name = registry.robot(dead_id).name().to_string();

        let teammates_alive = dead_team.is_some_and(|team| {
            registry
                .robots()
                .iter()
                .any(|r| r.team() == Some(team) && r.is_alive())
        });
        if !teammates_alive {
            let others = registry.active_contestant_count_excluding(dead_id);
            let robot = registry.robot_mut(dead_id);
            let winner = robot.is_winner();
            robot.statistics_mut().score_robot_death(others, winner);
        }

        for robot in registry.robots_mut() {
            if robot.id() == dead_id || !robot.is_alive() {
                continue;
            }
            robot.add_event(RobotEvent::RobotDeath {
                name: dead_name.clone(),
            });
            if dead_team.is_none() || robot.team() != dead_team {
                robot.statistics_mut().score_survival();
            }
        }
        registry.robot_mut(dead_id).add_event(RobotEvent::Death);
        debug!(robot = %dead_name, "robot died");
    }
    registry.recompute_active_robots();
    deaths.len()
}

/// Scores the last contestant standing. Called on the first grace tick.
///
/// Returns the winners in `order`.
pub fn score_round_winners(registry: &mut Registry, order: &[RobotId]) -> Vec<RobotId> {
    let robot_count = registry.robots().len();
    let mut leader_scored_first = false;
    let mut winning_team_leader = None;
    let mut winners = Vec::new();

    for &id in order {
        if !registry.robot(id).is_alive() || registry.robot(id).is_winner() {
            continue;
        }
        let team_size = registry.contestant_of(id).members().len();
        let leader = registry.contestant_of(id).representative();
        let robot = registry.robot_mut(id);
        let is_team = robot.team().is_some();
        let counts_as_first = !is_team || robot.is_team_leader();

        robot
            .statistics_mut()
            .score_last_survivor(robot_count - team_size, counts_as_first);
        robot.set_winner(true);
        robot.println(format!("SYSTEM: {} wins the round.", robot.name()));
        robot.add_event(RobotEvent::Win);
        info!(robot = %robot.name(), "round winner");

        if is_team {
            if robot.is_team_leader() {
                leader_scored_first = true;
            } else {
                winning_team_leader = Some(leader);
            }
        }
        winners.push(id);
    }

    if !leader_scored_first {
        if let Some(leader) = winning_team_leader {
            registry.robot_mut(leader).statistics_mut().score_first();
        }
    }
    winners
}

// =============================================================================
// Results
// =============================================================================

/// Final standing of one contestant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestantResult {
    /// One-based rank
    pub rank: usize,
    /// Contestant name (robot or team)
    pub name: String,
    /// Member names, a single entry for solo robots
    pub members: Vec<String>,
    /// Battle totals summed over members
    pub score: ScoreBreakdown,
}

impl ContestantResult {
    /// Total score.
    #[must_use]
    pub fn total_score(&self) -> f64 {
        self.score.total()
    }
}

/// Orders contestants with equal total score.
pub type TieBreak = fn(&ContestantResult, &ContestantResult) -> Ordering;

/// Default tie-break: more firsts, then more seconds, then more thirds.
#[must_use]
pub fn placement_tie_break(a: &ContestantResult, b: &ContestantResult) -> Ordering {
    b.score
        .firsts
        .cmp(&a.score.firsts)
        .then(b.score.seconds.cmp(&a.score.seconds))
        .then(b.score.thirds.cmp(&a.score.thirds))
}

/// Builds the ranked results list, one entry per contestant.
///
/// Sorted by descending total score; equal scores are ordered by
/// `tie_break` and otherwise keep declaration order.
#[must_use]
pub fn compute_results(registry: &Registry, tie_break: TieBreak) -> Vec<ContestantResult> {
    let mut results: Vec<ContestantResult> = registry
        .contestants()
        .iter()
        .map(|contestant| {
            let mut score = ScoreBreakdown::default();
            let mut members = Vec::new();
            for &id in contestant.members() {
                let robot = registry.robot(id);
                score.accumulate(robot.statistics().total());
                members.push(robot.name().to_string());
            }
            let name = match contestant {
                Contestant::Solo(id) => registry.robot(*id).name().to_string(),
                Contestant::Team(team) => team.name.clone(),
            };
            ContestantResult {
                rank: 0,
                name,
                members,
                score,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.total_score()
            .total_cmp(&a.total_score())
            .then_with(|| tie_break(a, b))
    });
    for (index, result) in results.iter_mut().enumerate() {
        result.rank = index + 1;
    }
    results
}
