//! Robot simulation state.
//!
//! A [`RobotPeer`] is mutated only by the driver thread while it owns the
//! tick. Robot code never touches it directly: it sees an immutable
//! [`RobotView`](crate::program::RobotView) and answers with a
//! [`RobotCommand`](crate::command::RobotCommand).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use bitflags::bitflags;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::DebugMark;
use crate::geometry::Rect;
use crate::program::RobotEvent;
use crate::scoring::RobotStatistics;

use super::{RobotId, TeamId};

/// Robot bounding box width.
pub const ROBOT_WIDTH: f64 = 36.0;
/// Robot bounding box height.
pub const ROBOT_HEIGHT: f64 = 36.0;
/// Energy at the start of every round.
pub const START_ENERGY: f64 = 100.0;
/// Gun heat at the start of every round.
pub const START_GUN_HEAT: f64 = 3.0;
/// Console lines kept per robot before the oldest are dropped.
pub const MAX_CONSOLE_LINES: usize = 256;

/// Life state of a robot within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotState {
    /// Alive and taking part in the round.
    Active,
    /// Destroyed or disabled; excluded from command collection.
    Dead,
}

bitflags! {
    /// Per-robot painting switches set from the control surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct PaintFlags: u8 {
        /// Robot debug graphics are recorded into snapshots.
        const PAINT = 1;
        /// Debug graphics use the alternate (screen) coordinate system.
        const DEBUG_PAINT = 1 << 1;
    }
}

/// Bounded text console private to one robot.
///
/// Cloning shares the buffer: the robot worker and the driver both write to
/// it, the snapshot step drains it.
#[derive(Debug, Clone, Default)]
pub struct RobotConsole {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl RobotConsole {
    /// Creates an empty console.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line, dropping the oldest once the console is full.
    pub fn println(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == MAX_CONSOLE_LINES {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Removes and returns all buffered lines.
    pub fn drain(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.drain(..).collect()
    }

    /// Number of buffered lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One robot's state for the battle.
///
/// Exactly one peer exists per competing robot for the battle's lifetime.
/// Round-scoped fields are reset by [`RobotPeer::reset_for_round`];
/// statistics totals survive across rounds.
#[derive(Debug, Clone)]
pub struct RobotPeer {
    id: RobotId,
    name: String,
    team: Option<TeamId>,
    team_leader: bool,
    state: RobotState,
    position: DVec2,
    heading: f64,
    gun_heading: f64,
    radar_heading: f64,
    velocity: f64,
    energy: f64,
    gun_heat: f64,
    winner: bool,
    halted: bool,
    running: bool,
    skipped_turns: u32,
    consecutive_skips: u32,
    disabled: Option<String>,
    paint: PaintFlags,
    debug_marks: Vec<DebugMark>,
    pending_events: Vec<RobotEvent>,
    statistics: RobotStatistics,
    console: RobotConsole,
}

impl RobotPeer {
    /// Creates a robot at the origin with full energy.
    #[must_use]
    pub fn new(id: RobotId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            team: None,
            team_leader: false,
            state: RobotState::Active,
            position: DVec2::ZERO,
            heading: 0.0,
            gun_heading: 0.0,
            radar_heading: 0.0,
            velocity: 0.0,
            energy: START_ENERGY,
            gun_heat: START_GUN_HEAT,
            winner: false,
            halted: false,
            running: false,
            skipped_turns: 0,
            consecutive_skips: 0,
            disabled: None,
            paint: PaintFlags::empty(),
            debug_marks: Vec::new(),
            pending_events: Vec::new(),
            statistics: RobotStatistics::default(),
            console: RobotConsole::new(),
        }
    }

    /// Assigns the robot to a team.
    pub fn join_team(&mut self, team: TeamId, leader: bool) {
        self.team = Some(team);
        self.team_leader = leader;
    }

    /// Resets round-scoped state. Disabled robots start the round dead.
    pub fn reset_for_round(&mut self) {
        self.state = RobotState::Active;
        self.velocity = 0.0;
        self.energy = START_ENERGY;
        self.gun_heat = START_GUN_HEAT;
        self.winner = false;
        self.halted = false;
        self.running = false;
        self.skipped_turns = 0;
        self.consecutive_skips = 0;
        self.debug_marks.clear();
        self.pending_events.clear();
        self.statistics.reset_round();
        if self.disabled.is_some() {
            self.energy = 0.0;
        }
    }

    /// Places the robot with all three headings aligned.
    pub fn place(&mut self, position: DVec2, heading: f64) {
        self.position = position;
        self.heading = heading;
        self.gun_heading = heading;
        self.radar_heading = heading;
    }

    /// Bounding box at the current position.
    #[must_use]
    pub fn bounding_box(&self) -> Rect {
        Rect::centered(self.position, ROBOT_WIDTH, ROBOT_HEIGHT)
    }

    /// Permanently disables the robot for the battle (configuration fault).
    pub fn disable(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.console.println(format!("SYSTEM: {reason}"));
        self.console.println("SYSTEM: Robot disabled.");
        debug!(robot = %self.name, %reason, "robot disabled");
        self.disabled = Some(reason);
        self.energy = 0.0;
    }

    /// Forces energy to zero for this round (load fault, kill command).
    pub fn zero_energy(&mut self) {
        self.energy = 0.0;
    }

    /// Marks the robot dead. Returns `true` on the transition.
    pub fn mark_dead(&mut self) -> bool {
        if self.state == RobotState::Dead {
            return false;
        }
        self.state = RobotState::Dead;
        self.energy = 0.0;
        self.velocity = 0.0;
        true
    }

    /// Records a skipped turn.
    pub fn record_skip(&mut self) {
        self.skipped_turns += 1;
        self.consecutive_skips += 1;
    }

    /// Records a turn answered in time.
    pub fn record_answer(&mut self) {
        self.consecutive_skips = 0;
    }

    /// Queues an event for the robot's next turn.
    pub fn add_event(&mut self, event: RobotEvent) {
        if self.state == RobotState::Active || event.is_terminal() {
            self.pending_events.push(event);
        }
    }

    /// Takes the queued events.
    pub fn take_events(&mut self) -> Vec<RobotEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Puts taken but undelivered events back in front of the queue.
    pub fn restore_events(&mut self, mut events: Vec<RobotEvent>) {
        events.append(&mut self.pending_events);
        self.pending_events = events;
    }

    /// Queued events not yet delivered.
    #[must_use]
    pub fn pending_events(&self) -> &[RobotEvent] {
        &self.pending_events
    }

    /// Writes a line to the robot console.
    pub fn println(&self, line: impl Into<String>) {
        self.console.println(line);
    }

    /// Robot ID.
    #[must_use]
    pub const fn id(&self) -> RobotId {
        self.id
    }

    /// Unique display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning team, if any.
    #[must_use]
    pub const fn team(&self) -> Option<TeamId> {
        self.team
    }

    /// True for the leader of a team.
    #[must_use]
    pub const fn is_team_leader(&self) -> bool {
        self.team_leader
    }

    /// Life state.
    #[must_use]
    pub const fn state(&self) -> RobotState {
        self.state
    }

    /// True unless dead.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state != RobotState::Dead
    }

    /// True when dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.state == RobotState::Dead
    }

    /// Center position.
    #[must_use]
    pub const fn position(&self) -> DVec2 {
        self.position
    }

    /// Sets the center position.
    pub fn set_position(&mut self, position: DVec2) {
        self.position = position;
    }

    /// Body heading in radians.
    #[must_use]
    pub const fn heading(&self) -> f64 {
        self.heading
    }

    /// Sets the body heading.
    pub fn set_heading(&mut self, heading: f64) {
        self.heading = heading;
    }

    /// Gun heading in radians.
    #[must_use]
    pub const fn gun_heading(&self) -> f64 {
        self.gun_heading
    }

    /// Sets the gun heading.
    pub fn set_gun_heading(&mut self, heading: f64) {
        self.gun_heading = heading;
    }

    /// Radar heading in radians.
    #[must_use]
    pub const fn radar_heading(&self) -> f64 {
        self.radar_heading
    }

    /// Sets the radar heading.
    pub fn set_radar_heading(&mut self, heading: f64) {
        self.radar_heading = heading;
    }

    /// Signed speed along the body heading.
    #[must_use]
    pub const fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Sets the speed.
    pub fn set_velocity(&mut self, velocity: f64) {
        self.velocity = velocity;
    }

    /// Remaining energy.
    #[must_use]
    pub const fn energy(&self) -> f64 {
        self.energy
    }

    /// Sets energy, clamped at zero.
    pub fn set_energy(&mut self, energy: f64) {
        self.energy = energy.max(0.0);
    }

    /// Current gun heat.
    #[must_use]
    pub const fn gun_heat(&self) -> f64 {
        self.gun_heat
    }

    /// Sets gun heat, clamped at zero.
    pub fn set_gun_heat(&mut self, heat: f64) {
        self.gun_heat = heat.max(0.0);
    }

    /// True once the robot has won the round.
    #[must_use]
    pub const fn is_winner(&self) -> bool {
        self.winner
    }

    /// Sets the winner flag.
    pub fn set_winner(&mut self, winner: bool) {
        self.winner = winner;
    }

    /// True when frozen for the end-of-round grace ticks.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Freezes or unfreezes the robot.
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// True while a worker runs this robot's program.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Sets the running flag.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Turns skipped this round.
    #[must_use]
    pub const fn skipped_turns(&self) -> u32 {
        self.skipped_turns
    }

    /// Skips in a row since the last answered turn.
    #[must_use]
    pub const fn consecutive_skips(&self) -> u32 {
        self.consecutive_skips
    }

    /// Reason the robot was disabled for the battle, if any.
    #[must_use]
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled.as_deref()
    }

    /// Paint switches.
    #[must_use]
    pub const fn paint(&self) -> PaintFlags {
        self.paint
    }

    /// Turns a paint switch on or off.
    pub fn set_paint_flag(&mut self, flag: PaintFlags, enabled: bool) {
        self.paint.set(flag, enabled);
        if !self.paint.contains(PaintFlags::PAINT) {
            self.debug_marks.clear();
        }
    }

    /// Debug graphics from the last command, kept only while painting.
    #[must_use]
    pub fn debug_marks(&self) -> &[DebugMark] {
        &self.debug_marks
    }

    /// Stores debug graphics if painting is enabled.
    pub fn set_debug_marks(&mut self, marks: Vec<DebugMark>) {
        if self.paint.contains(PaintFlags::PAINT) {
            self.debug_marks = marks;
        } else {
            self.debug_marks.clear();
        }
    }

    /// Score keeping.
    #[must_use]
    pub const fn statistics(&self) -> &RobotStatistics {
        &self.statistics
    }

    /// Mutable score keeping.
    pub fn statistics_mut(&mut self) -> &mut RobotStatistics {
        &mut self.statistics
    }

    /// Shared console handle.
    #[must_use]
    pub fn console(&self) -> &RobotConsole {
        &self.console
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod console_tests {
        use super::*;

        #[test]
        fn println_and_drain() {
            let console = RobotConsole::new();
            console.println("one");
            console.println(String::from("two"));
            assert_eq!(console.len(), 2);
            assert_eq!(console.drain(), vec!["one", "two"]);
            assert!(console.is_empty());
        }

        #[test]
        fn clones_share_buffer() {
            let console = RobotConsole::new();
            let other = console.clone();
            other.println("shared");
            assert_eq!(console.drain(), vec!["shared"]);
        }

        #[test]
        fn oldest_lines_dropped_when_full() {
            let console = RobotConsole::new();
            for i in 0..MAX_CONSOLE_LINES + 5 {
                console.println(format!("line {i}"));
            }
            let lines = console.drain();
            assert_eq!(lines.len(), MAX_CONSOLE_LINES);
            assert_eq!(lines[0], "line 5");
        }
    }

    mod peer_tests {
        use super::*;

        #[test]
        fn new_robot_is_active_with_full_energy() {
            let robot = RobotPeer::new(RobotId::new(0), "a");
            assert!(robot.is_alive());
            assert_eq!(robot.energy(), START_ENERGY);
            assert_eq!(robot.gun_heat(), START_GUN_HEAT);
            assert!(!robot.is_running());
        }

        #[test]
        fn mark_dead_transitions_once() {
            let mut robot = RobotPeer::new(RobotId::new(0), "a");
            assert!(robot.mark_dead());
            assert!(!robot.mark_dead());
            assert!(robot.is_dead());
            assert_eq!(robot.energy(), 0.0);
        }

        #[test]
        fn disabled_robot_starts_rounds_without_energy() {
            let mut robot = RobotPeer::new(RobotId::new(0), "a");
            robot.disable("Your classname is too long.");
            robot.reset_for_round();
            assert_eq!(robot.energy(), 0.0);
            assert!(robot.disabled_reason().is_some());
            let lines = robot.console().drain();
            assert_eq!(lines.last().map(String::as_str), Some("SYSTEM: Robot disabled."));
        }

        #[test]
        fn skips_are_counted() {
            let mut robot = RobotPeer::new(RobotId::new(0), "a");
            robot.record_skip();
            robot.record_skip();
            assert_eq!(robot.skipped_turns(), 2);
            assert_eq!(robot.consecutive_skips(), 2);
            robot.record_answer();
            assert_eq!(robot.consecutive_skips(), 0);
            assert_eq!(robot.skipped_turns(), 2);
        }

        #[test]
        fn debug_marks_require_paint() {
            let mut robot = RobotPeer::new(RobotId::new(0), "a");
            let mark = DebugMark::Text {
                at: DVec2::ZERO,
                text: "hi".into(),
            };
            robot.set_debug_marks(vec![mark.clone()]);
            assert!(robot.debug_marks().is_empty());

            robot.set_paint_flag(PaintFlags::PAINT, true);
            robot.set_debug_marks(vec![mark]);
            assert_eq!(robot.debug_marks().len(), 1);

            robot.set_paint_flag(PaintFlags::PAINT, false);
            assert!(robot.debug_marks().is_empty());
        }

        #[test]
        fn dead_robots_only_receive_terminal_events() {
            let mut robot = RobotPeer::new(RobotId::new(0), "a");
            robot.mark_dead();
            robot.add_event(RobotEvent::HitWall);
            assert!(robot.pending_events().is_empty());
            robot.add_event(RobotEvent::RoundEnded { round: 0, turns: 1 });
            assert_eq!(robot.pending_events().len(), 1);
        }

        #[test]
        fn restored_events_keep_their_place_in_line() {
            let mut robot = RobotPeer::new(RobotId::new(0), "a");
            robot.add_event(RobotEvent::HitWall);
            let taken = robot.take_events();
            robot.add_event(RobotEvent::SkippedTurn { time: 4 });
            robot.restore_events(taken);
            assert!(matches!(
                robot.pending_events(),
                [RobotEvent::HitWall, RobotEvent::SkippedTurn { time: 4 }]
            ));
        }
    }
}
