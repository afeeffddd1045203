//! Windowed per-robot telemetry.
//!
//! [`TelemetryObserver`] samples every robot after each tick into
//! fixed-capacity ring buffers and periodically reduces each window to
//! min / average / max / max-delta. Max-delta is the largest absolute
//! difference between two consecutive samples inside the window.
//!
//! Reports are logged through `tracing` and kept in a shared sink; nothing
//! is published over the network.
//!
//! # Example
//!
//! ```
//! use robobattle_core::telemetry::RingBuffer;
//!
//! let mut buffer = RingBuffer::new(3);
//! for value in [1.0, 4.0, 2.0, 8.0] {
//!     buffer.push(value);
//! }
//!
//! let stats = buffer.stats().unwrap();
//! assert_eq!(stats.min, 2.0);
//! assert_eq!(stats.max, 8.0);
//! assert_eq!(stats.max_delta, 6.0);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entity::RobotState;
use crate::observer::BattleObserver;
use crate::snapshot::{RobotSnapshot, TurnSnapshot};

// =============================================================================
// Ring Buffer
// =============================================================================

/// Summary of one window of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    /// Smallest sample
    pub min: f64,
    /// Mean of the samples
    pub average: f64,
    /// Largest sample
    pub max: f64,
    /// Largest absolute change between consecutive samples
    pub max_delta: f64,
}

/// Fixed-capacity sample window; the oldest sample is evicted when full.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    /// Creates an empty buffer holding at most `capacity` samples (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a sample.
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Samples currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window statistics, `None` when empty.
    #[must_use]
    pub fn stats(&self) -> Option<WindowStats> {
        let first = *self.samples.front()?;
        let mut min = first;
        let mut max = first;
        let mut sum = 0.0;
        let mut max_delta = 0.0_f64;
        let mut previous = first;
        for &value in &self.samples {
            min = min.min(value);
            max = max.max(value);
            sum += value;
            max_delta = max_delta.max((value - previous).abs());
            previous = value;
        }
        #[allow(clippy::cast_precision_loss)]
        let average = sum / self.samples.len() as f64;
        Some(WindowStats {
            min,
            average: average.clamp(min, max),
            max,
            max_delta,
        })
    }
}

// =============================================================================
// Series
// =============================================================================

/// A sampled robot quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    /// Energy
    Energy,
    /// Gun heat
    GunHeat,
    /// Velocity
    Velocity,
    /// X coordinate
    X,
    /// Y coordinate
    Y,
    /// Body heading
    Heading,
    /// Gun heading
    GunHeading,
    /// Radar heading
    RadarHeading,
}

impl Series {
    /// Every series, in report order.
    pub const ALL: [Series; 8] = [
        Series::Energy,
        Series::GunHeat,
        Series::Velocity,
        Series::X,
        Series::Y,
        Series::Heading,
        Series::GunHeading,
        Series::RadarHeading,
    ];

    fn sample(self, robot: &RobotSnapshot) -> f64 {
        match self {
            Series::Energy => robot.energy,
            Series::GunHeat => robot.gun_heat,
            Series::Velocity => robot.velocity,
            Series::X => robot.position.x,
            Series::Y => robot.position.y,
            Series::Heading => robot.heading,
            Series::GunHeading => robot.gun_heading,
            Series::RadarHeading => robot.radar_heading,
        }
    }
}

#[derive(Debug, Clone)]
struct RobotSeries {
    name: String,
    alive: bool,
    buffers: Vec<RingBuffer>,
}

impl RobotSeries {
    fn new(name: String, window: usize) -> Self {
        Self {
            name,
            alive: true,
            buffers: Series::ALL.iter().map(|_| RingBuffer::new(window)).collect(),
        }
    }

    fn record(&mut self, robot: &RobotSnapshot) {
        for (series, buffer) in Series::ALL.iter().zip(&mut self.buffers) {
            buffer.push(series.sample(robot));
        }
    }

    fn report(&self) -> RobotReport {
        RobotReport {
            name: self.name.clone(),
            alive: self.alive,
            series: Series::ALL
                .iter()
                .zip(&self.buffers)
                .filter_map(|(series, buffer)| buffer.stats().map(|stats| (*series, stats)))
                .collect(),
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Why a report was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    /// Battle started
    BattleStarted,
    /// Regular interval elapsed
    Periodic,
    /// A robot died this tick
    RobotDied(String),
    /// A round finished
    RoundEnded,
}

/// One robot's windowed statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotReport {
    /// Robot name
    pub name: String,
    /// Alive at the time of the report
    pub alive: bool,
    /// Statistics per series, in [`Series::ALL`] order
    pub series: Vec<(Series, WindowStats)>,
}

impl RobotReport {
    /// Statistics of one series.
    #[must_use]
    pub fn get(&self, series: Series) -> Option<&WindowStats> {
        self.series.iter().find(|(s, _)| *s == series).map(|(_, stats)| stats)
    }
}

/// Battle-level turn statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStats {
    /// Zero-based round
    pub round: u32,
    /// Tick within the round
    pub time: u64,
    /// Robots in the battle
    pub robots: usize,
    /// Most bullets in flight since the previous report
    pub max_bullets: usize,
    /// Ticks since the previous report
    pub turns_since_last_report: u64,
}

/// A telemetry report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// Trigger
    pub kind: ReportKind,
    /// Turn statistics
    pub turn: TurnStats,
    /// Per-robot statistics
    pub robots: Vec<RobotReport>,
}

/// Shared list of produced reports.
pub type ReportSink = Arc<Mutex<Vec<TelemetryReport>>>;

// =============================================================================
// Observer
// =============================================================================

/// Telemetry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Samples kept per series
    pub window: usize,
    /// Ticks between periodic reports
    pub report_every: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            window: 30,
            report_every: 30,
        }
    }
}

/// Observer producing windowed telemetry reports.
#[derive(Debug)]
pub struct TelemetryObserver {
    config: TelemetryConfig,
    robots: Vec<RobotSeries>,
    round: u32,
    time: u64,
    max_bullets: usize,
    turns_since_report: u64,
    sink: ReportSink,
}

impl TelemetryObserver {
    /// Creates an observer with its own report sink.
    #[must_use]
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            robots: Vec::new(),
            round: 0,
            time: 0,
            max_bullets: 0,
            turns_since_report: 0,
            sink: ReportSink::default(),
        }
    }

    /// Handle to the reports produced so far.
    #[must_use]
    pub fn sink(&self) -> ReportSink {
        Arc::clone(&self.sink)
    }

    fn emit(&mut self, kind: ReportKind) {
        let report = TelemetryReport {
            kind,
            turn: TurnStats {
                round: self.round,
                time: self.time,
                robots: self.robots.len(),
                max_bullets: self.max_bullets,
                turns_since_last_report: self.turns_since_report,
            },
            robots: self.robots.iter().map(RobotSeries::report).collect(),
        };
        info!(
            kind = ?report.kind,
            round = report.turn.round,
            time = report.turn.time,
            max_bullets = report.turn.max_bullets,
            turns = report.turn.turns_since_last_report,
            alive = report.robots.iter().filter(|r| r.alive).count(),
            "telemetry report"
        );
        self.max_bullets = 0;
        self.turns_since_report = 0;
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }
}

impl BattleObserver for TelemetryObserver {
    fn on_battle_started(&mut self, _rounds: u32, _robots: usize) {
        self.emit(ReportKind::BattleStarted);
    }

    fn on_round_started(&mut self, round: u32) {
        self.round = round;
        for robot in &mut self.robots {
            robot.alive = true;
        }
    }

    fn on_turn_ended(&mut self, snapshot: &TurnSnapshot) {
        if self.robots.len() != snapshot.robots.len() {
            self.robots = snapshot
                .robots
                .iter()
                .map(|r| RobotSeries::new(r.name.clone(), self.config.window))
                .collect();
        }
        self.time = snapshot.time;
        self.turns_since_report += 1;
        self.max_bullets = self.max_bullets.max(snapshot.bullets.len());

        let mut died = Vec::new();
        for (series, robot) in self.robots.iter_mut().zip(&snapshot.robots) {
            series.record(robot);
            let alive = robot.state == RobotState::Active;
            if series.alive && !alive {
                died.push(robot.name.clone());
            }
            series.alive = alive;
        }
        for name in died {
            self.emit(ReportKind::RobotDied(name));
        }
        if self.turns_since_report >= self.config.report_every.max(1) {
            self.emit(ReportKind::Periodic);
        }
    }

    fn on_round_ended(&mut self, _round: u32, _turns: u64) {
        self.emit(ReportKind::RoundEnded);
    }
}
