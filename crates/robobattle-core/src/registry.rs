//! The entity registry: authoritative robot, bullet and contestant lists.
//!
//! The registry is owned by the driver thread. Robots are stored by
//! [`RobotId`] index in declaration order; contestants reference robots by ID
//! and every robot belongs to exactly one contestant.
//!
//! # Example
//!
//! ```
//! use robobattle_core::registry::{ContestantEntry, Registry};
//!
//! let registry = Registry::new(&[
//!     ContestantEntry::solo("sample.Walls"),
//!     ContestantEntry::solo("sample.Walls"),
//!     ContestantEntry::team("Blue", &["sample.Leader", "sample.Member"]),
//! ]);
//!
//! assert_eq!(registry.robots().len(), 4);
//! assert_eq!(registry.robots()[0].name(), "sample.Walls (1)");
//! assert_eq!(registry.robots()[1].name(), "sample.Walls (2)");
//! assert_eq!(registry.contestants().len(), 3);
//! ```

use std::collections::HashMap;

use glam::DVec2;
use rayon::prelude::*;

use crate::config::BattleRules;
use crate::entity::robot::{ROBOT_HEIGHT, ROBOT_WIDTH};
use crate::entity::{BulletId, BulletPeer, Contestant, RobotId, RobotPeer, TeamId, TeamPeer};
use crate::program::{RobotEvent, RobotSighting, RobotStatus, RobotView};

/// One contestant as declared by the battle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContestantEntry {
    /// A robot on its own.
    Solo(String),
    /// A named team; the first member leads.
    Team {
        /// Team name
        name: String,
        /// Member robot names
        members: Vec<String>,
    },
}

impl ContestantEntry {
    /// Solo robot entry.
    pub fn solo(name: impl Into<String>) -> Self {
        Self::Solo(name.into())
    }

    /// Team entry.
    pub fn team(name: impl Into<String>, members: &[&str]) -> Self {
        Self::Team {
            name: name.into(),
            members: members.iter().map(|m| (*m).to_string()).collect(),
        }
    }
}

/// Appends ` (n)` to every name that occurs more than once.
fn unique_names(names: &[String]) -> Vec<String> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *totals.entry(name.as_str()).or_insert(0) += 1;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|name| {
            if totals[name.as_str()] > 1 {
                let n = seen.entry(name.as_str()).or_insert(0);
                *n += 1;
                format!("{name} ({n})")
            } else {
                name.clone()
            }
        })
        .collect()
}

// =============================================================================
// Registry
// =============================================================================

/// Robots, bullets and contestants for one battle.
#[derive(Debug, Clone)]
pub struct Registry {
    robots: Vec<RobotPeer>,
    contestant_index: Vec<usize>,
    contestants: Vec<Contestant>,
    bullets: Vec<BulletPeer>,
    next_bullet_id: u64,
    active_robots: usize,
    inactive_turn_count: u64,
    inactivity_energy: f64,
    death_queue: Vec<RobotId>,
}

impl Registry {
    /// Builds the registry, assigning robot IDs in declaration order.
    #[must_use]
    pub fn new(entries: &[ContestantEntry]) -> Self {
        let mut robot_names = Vec::new();
        let mut team_names = Vec::new();
        for entry in entries {
            match entry {
                ContestantEntry::Solo(name) => robot_names.push(name.clone()),
                ContestantEntry::Team { name, members } => {
                    team_names.push(name.clone());
                    robot_names.extend(members.iter().cloned());
                }
            }
        }
        let robot_names = unique_names(&robot_names);
        let team_names = unique_names(&team_names);

        let mut robots = Vec::with_capacity(robot_names.len());
        let mut contestant_index = Vec::with_capacity(robot_names.len());
        let mut contestants = Vec::with_capacity(entries.len());
        let mut names = robot_names.into_iter();
        let mut team_names = team_names.into_iter();

        for entry in entries {
            let slot = contestants.len();
            match entry {
                ContestantEntry::Solo(_) => {
                    let id = RobotId::new(robots.len());
                    robots.push(RobotPeer::new(id, names.next().unwrap_or_default()));
                    contestant_index.push(slot);
                    contestants.push(Contestant::Solo(id));
                }
                ContestantEntry::Team { members, .. } => {
                    let team_id = TeamId::new(slot);
                    let first = robots.len();
                    let member_ids: Vec<RobotId> =
                        (first..first + members.len()).map(RobotId::new).collect();
                    for (i, &id) in member_ids.iter().enumerate() {
                        let mut robot = RobotPeer::new(id, names.next().unwrap_or_default());
                        robot.join_team(team_id, i == 0);
                        robots.push(robot);
                        contestant_index.push(slot);
                    }
                    contestants.push(Contestant::Team(TeamPeer {
                        id: team_id,
                        name: team_names.next().unwrap_or_default(),
                        leader: RobotId::new(first),
                        members: member_ids,
                    }));
                }
            }
        }

        let active_robots = robots.len();
        Self {
            robots,
            contestant_index,
            contestants,
            bullets: Vec::new(),
            next_bullet_id: 0,
            active_robots,
            inactive_turn_count: 0,
            inactivity_energy: 0.0,
            death_queue: Vec::new(),
        }
    }

    /// Resets round state for every robot and clears the bullets.
    pub fn reset_for_round(&mut self) {
        for robot in &mut self.robots {
            robot.reset_for_round();
        }
        self.bullets.clear();
        self.inactive_turn_count = 0;
        self.inactivity_energy = 0.0;
        self.death_queue.clear();
        self.recompute_active_robots();
    }

    // -------------------------------------------------------------------------
    // Robots
    // -------------------------------------------------------------------------

    /// All robots in ID order.
    #[must_use]
    pub fn robots(&self) -> &[RobotPeer] {
        &self.robots
    }

    /// Mutable robots in ID order.
    pub fn robots_mut(&mut self) -> &mut [RobotPeer] {
        &mut self.robots
    }

    /// Robot by ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID was not issued by this registry.
    #[must_use]
    pub fn robot(&self, id: RobotId) -> &RobotPeer {
        &self.robots[id.index()]
    }

    /// Mutable robot by ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID was not issued by this registry.
    pub fn robot_mut(&mut self, id: RobotId) -> &mut RobotPeer {
        &mut self.robots[id.index()]
    }

    /// Robot by ID, if it exists.
    #[must_use]
    pub fn get(&self, id: RobotId) -> Option<&RobotPeer> {
        self.robots.get(id.index())
    }

    /// Mutable robot by ID, if it exists.
    pub fn get_mut(&mut self, id: RobotId) -> Option<&mut RobotPeer> {
        self.robots.get_mut(id.index())
    }

    /// Robots whose state is not dead, as last recomputed.
    #[must_use]
    pub const fn active_robots(&self) -> usize {
        self.active_robots
    }

    /// Recounts living robots.
    pub fn recompute_active_robots(&mut self) {
        self.active_robots = self.robots.iter().filter(|r| r.is_alive()).count();
    }

    // -------------------------------------------------------------------------
    // Contestants
    // -------------------------------------------------------------------------

    /// Contestants in declaration order.
    #[must_use]
    pub fn contestants(&self) -> &[Contestant] {
        &self.contestants
    }

    /// Contestant a robot is scored under.
    #[must_use]
    pub fn contestant_of(&self, id: RobotId) -> &Contestant {
        &self.contestants[self.contestant_index[id.index()]]
    }

    fn contestant_alive(&self, contestant: &Contestant) -> bool {
        contestant.members().iter().any(|&id| self.robot(id).is_alive())
    }

    /// Contestants with at least one living member.
    #[must_use]
    pub fn active_contestant_count(&self) -> usize {
        self.contestants
            .iter()
            .filter(|c| self.contestant_alive(c))
            .count()
    }

    /// Living contestants other than the one `id` belongs to.
    #[must_use]
    pub fn active_contestant_count_excluding(&self, id: RobotId) -> usize {
        let own = self.contestant_index[id.index()];
        self.contestants
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != own && self.contestant_alive(c))
            .count()
    }

    /// True when at most one contestant has living members.
    #[must_use]
    pub fn one_team_remaining(&self) -> bool {
        self.active_contestant_count() <= 1
    }

    /// True when both robots are on the same team.
    #[must_use]
    pub fn are_teammates(&self, a: RobotId, b: RobotId) -> bool {
        let team = self.robot(a).team();
        team.is_some() && team == self.robot(b).team()
    }

    // -------------------------------------------------------------------------
    // Bullets
    // -------------------------------------------------------------------------

    /// Bullets in the active set, in firing order.
    #[must_use]
    pub fn bullets(&self) -> &[BulletPeer] {
        &self.bullets
    }

    /// Mutable bullets.
    pub fn bullets_mut(&mut self) -> &mut Vec<BulletPeer> {
        &mut self.bullets
    }

    /// Fires a new bullet and returns its ID.
    pub fn spawn_bullet(
        &mut self,
        owner: RobotId,
        position: DVec2,
        heading: f64,
        power: f64,
    ) -> BulletId {
        let id = BulletId::new(self.next_bullet_id);
        self.next_bullet_id += 1;
        self.bullets
            .push(BulletPeer::new(id, owner, position, heading, power));
        id
    }

    // -------------------------------------------------------------------------
    // Deaths and inactivity
    // -------------------------------------------------------------------------

    /// Queues a robot for death handling.
    pub fn queue_death(&mut self, id: RobotId) {
        if !self.death_queue.contains(&id) {
            self.death_queue.push(id);
        }
    }

    /// Takes the queued deaths in queue order.
    pub fn take_death_queue(&mut self) -> Vec<RobotId> {
        std::mem::take(&mut self.death_queue)
    }

    /// Counts a tick towards inactivity.
    pub fn tick_inactivity(&mut self) {
        self.inactive_turn_count += 1;
    }

    /// Records energy lost to bullets or firing.
    ///
    /// Accumulating a full `reset_energy` resets the inactivity counter; the
    /// remainder carries over. A non-positive `reset_energy` never resets.
    pub fn record_energy_loss(&mut self, amount: f64, reset_energy: f64) {
        if amount <= 0.0 {
            return;
        }
        self.inactivity_energy += amount;
        if reset_energy > 0.0 && self.inactivity_energy >= reset_energy {
            self.inactivity_energy %= reset_energy;
            self.inactive_turn_count = 0;
        }
    }

    /// Ticks since enough energy was last lost.
    #[must_use]
    pub const fn inactive_turn_count(&self) -> u64 {
        self.inactive_turn_count
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    /// Builds every robot's pre-tick view, handing over their queued events.
    ///
    /// Views for different robots are built in parallel from the same
    /// immutable state.
    pub fn build_views(&mut self, round: u32, time: u64, rules: &BattleRules) -> Vec<RobotView> {
        let events: Vec<Vec<RobotEvent>> = self
            .robots
            .iter_mut()
            .map(RobotPeer::take_events)
            .collect();
        let alive = self.active_robots;

        self.robots
            .par_iter()
            .zip(events.into_par_iter())
            .map(|(robot, mut events)| {
                let status = RobotStatus {
                    position: robot.position(),
                    heading: robot.heading(),
                    gun_heading: robot.gun_heading(),
                    radar_heading: robot.radar_heading(),
                    velocity: robot.velocity(),
                    energy: robot.energy(),
                    gun_heat: robot.gun_heat(),
                    others: alive.saturating_sub(usize::from(robot.is_alive())),
                    time,
                    round,
                };
                let sightings = self
                    .robots
                    .iter()
                    .filter(|other| other.id() != robot.id() && other.is_alive())
                    .map(|other| RobotSighting {
                        name: other.name().to_string(),
                        position: other.position(),
                        heading: other.heading(),
                        velocity: other.velocity(),
                        energy: other.energy(),
                        teammate: robot.team().is_some() && robot.team() == other.team(),
                    })
                    .collect();
                events.push(RobotEvent::Status(status.clone()));
                RobotView {
                    name: robot.name().to_string(),
                    status,
                    rounds: rules.rounds,
                    battlefield_width: rules.battlefield_width,
                    battlefield_height: rules.battlefield_height,
                    gun_cooling_rate: rules.gun_cooling_rate,
                    sightings,
                    events,
                }
            })
            .collect()
    }
}

/// Centers a robot can occupy without touching a wall.
#[must_use]
pub fn playable_area(rules: &BattleRules) -> (DVec2, DVec2) {
    let half = DVec2::new(ROBOT_WIDTH / 2.0, ROBOT_HEIGHT / 2.0);
    (
        half,
        DVec2::new(rules.battlefield_width, rules.battlefield_height) - half,
    )
}
