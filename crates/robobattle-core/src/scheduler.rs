//! Robot scheduler: the per-tick turn barrier.
//!
//! Every running robot is a long-lived worker thread with a single-slot
//! inbox (the wake-up carrying its view) and a single-slot outbox (its
//! command). The driver is the only writer to inboxes and the only reader of
//! outboxes.
//!
//! Each tick the scheduler:
//!
//! 1. Takes the tick's wake order, a uniformly random permutation drawn by
//!    the driver
//! 2. Wakes robots in that order, serially or all at once per
//!    [`WakePolicy`]
//! 3. Waits for each reply until the robot's deadline; a robot that misses
//!    it is skipped for the tick
//!
//! A robot still busy with an earlier tick is given one budget to finish
//! before it is woken again; otherwise it is skipped without a wake-up and
//! the events in its view go back on its queue. Panics inside robot code are
//! caught on the worker and turned into an empty command.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::command::RobotCommand;
use crate::config::{TimeBudget, WakePolicy};
use crate::entity::{RobotConsole, RobotId};
use crate::error::{panic_message, BattleError};
use crate::program::{RobotEvent, RobotProgram, RobotView};
use crate::registry::Registry;
use crate::resolver::TurnInput;

/// How long stopped workers get to exit before they are abandoned.
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Worker
// =============================================================================

struct WakeUp {
    tick: u64,
    view: RobotView,
}

struct Reply {
    tick: u64,
    command: RobotCommand,
}

struct RobotWorker {
    name: String,
    inbox: Sender<WakeUp>,
    outbox: Receiver<Reply>,
    pending: Option<u64>,
    first_turn: bool,
    handle: JoinHandle<()>,
}

fn worker_loop(
    mut program: Box<dyn RobotProgram>,
    console: RobotConsole,
    inbox: &Receiver<WakeUp>,
    outbox: &Sender<Reply>,
) {
    for WakeUp { tick, view } in inbox {
        let command = match catch_unwind(AssertUnwindSafe(|| program.run(&view, &console))) {
            Ok(command) => command,
            Err(payload) => {
                console.println(format!(
                    "SYSTEM: An error occurred during the turn: {}",
                    panic_message(payload.as_ref())
                ));
                RobotCommand::default()
            }
        };
        if outbox.send(Reply { tick, command }).is_err() {
            break;
        }
    }
}

/// Result of one robot's turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Command delivered within the budget.
    Answered(RobotCommand),
    /// Budget exceeded, or still busy with an earlier tick.
    Skipped,
    /// Dead or not running; nothing was woken.
    Idle,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Drives robot workers through the turn barrier.
pub struct Scheduler {
    budget: TimeBudget,
    parallelism: usize,
    workers: Vec<Option<RobotWorker>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("budget", &self.budget)
            .field("parallelism", &self.parallelism)
            .field("running", &self.running_count())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler using the machine's available parallelism.
    #[must_use]
    pub fn new(budget: TimeBudget) -> Self {
        let parallelism = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::with_parallelism(budget, parallelism)
    }

    /// Creates a scheduler assuming `parallelism` execution units.
    #[must_use]
    pub fn with_parallelism(budget: TimeBudget, parallelism: usize) -> Self {
        Self {
            budget,
            parallelism: parallelism.max(1),
            workers: Vec::new(),
        }
    }

    /// A uniformly random permutation of `count` robots.
    pub fn wake_order<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<RobotId> {
        let mut order: Vec<RobotId> = (0..count).map(RobotId::new).collect();
        order.shuffle(rng);
        order
    }

    /// Robots per execution unit, at least 1.
    #[must_use]
    pub fn contention_factor(&self, robots: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let factor = robots as f64 / self.parallelism as f64;
        factor.max(1.0)
    }

    /// Wait allowed for one robot this tick.
    #[must_use]
    pub fn robot_budget(&self, first_turn: bool, robots: usize) -> Duration {
        let base = if first_turn {
            self.budget.startup_budget()
        } else {
            self.budget.turn_budget()
        };
        match self.budget.policy {
            WakePolicy::Serial => base,
            WakePolicy::Parallel => base.div_f64(self.contention_factor(robots)),
        }
    }

    /// Starts a worker thread running `program` for robot `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::Spawn`] if the thread cannot be created.
    pub fn start_robot(
        &mut self,
        id: RobotId,
        name: &str,
        program: Box<dyn RobotProgram>,
        console: RobotConsole,
    ) -> Result<(), BattleError> {
        let (inbox_tx, inbox_rx) = bounded::<WakeUp>(1);
        let (outbox_tx, outbox_rx) = bounded::<Reply>(1);
        let handle = thread::Builder::new()
            .name(format!("robot-{}", id.index()))
            .spawn(move || worker_loop(program, console, &inbox_rx, &outbox_tx))
            .map_err(|source| BattleError::Spawn {
                what: "robot",
                source,
            })?;

        if self.workers.len() <= id.index() {
            self.workers.resize_with(id.index() + 1, || None);
        }
        self.workers[id.index()] = Some(RobotWorker {
            name: name.to_string(),
            inbox: inbox_tx,
            outbox: outbox_rx,
            pending: None,
            first_turn: true,
            handle,
        });
        Ok(())
    }

    /// True when a worker is running for `id`.
    #[must_use]
    pub fn is_started(&self, id: RobotId) -> bool {
        self.workers.get(id.index()).is_some_and(Option::is_some)
    }

    /// Number of running workers.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.workers.iter().flatten().count()
    }

    /// Waits for a reply to `tick` until `deadline`, discarding replies to
    /// earlier ticks.
    fn await_reply(worker: &mut RobotWorker, tick: u64, deadline: Instant) -> Option<RobotCommand> {
        loop {
            match worker.outbox.recv_deadline(deadline) {
                Ok(reply) if reply.tick == tick => {
                    worker.pending = None;
                    return Some(reply.command);
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    worker.pending = None;
                    return None;
                }
            }
        }
    }

    /// Lets a worker still busy with an earlier tick finish. Returns `true`
    /// when the worker is free to be woken.
    fn settle(worker: &mut RobotWorker, budget: Duration) -> bool {
        let Some(stale) = worker.pending else {
            return true;
        };
        match worker.outbox.recv_timeout(budget) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                debug!(robot = %worker.name, stale, "discarded late command");
                worker.pending = None;
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Hands `view` to the worker. The view comes back when the inbox is
    /// unavailable.
    fn wake(worker: &mut RobotWorker, tick: u64, view: RobotView) -> Result<(), RobotView> {
        match worker.inbox.try_send(WakeUp { tick, view }) {
            Ok(()) => {
                worker.pending = Some(tick);
                worker.first_turn = false;
                Ok(())
            }
            Err(TrySendError::Full(wake_up) | TrySendError::Disconnected(wake_up)) => {
                Err(wake_up.view)
            }
        }
    }

    /// Runs the turn barrier for one tick.
    ///
    /// Robots are woken in `wake_order`; `views` holds one view per robot
    /// index. Commands of robots that answered in time are written into
    /// `input.commands` and skips are recorded on the robots. Events in the
    /// views of robots that were not woken are queued again.
    pub fn collect(
        &mut self,
        input: &mut TurnInput,
        wake_order: &[RobotId],
        views: Vec<RobotView>,
        registry: &mut Registry,
    ) -> Vec<(RobotId, TurnOutcome)> {
        let robots = registry.robots().len();
        let tick = input.time;
        input.commands = vec![None; robots];
        let mut views: Vec<Option<RobotView>> = views.into_iter().map(Some).collect();
        let mut outcomes = Vec::with_capacity(wake_order.len());

        match self.budget.policy {
            WakePolicy::Serial => {
                for &id in wake_order {
                    let outcome = self.turn(id, tick, &mut views, registry, robots);
                    outcomes.push((id, outcome));
                }
            }
            WakePolicy::Parallel => {
                let mut woken = Vec::new();
                for &id in wake_order {
                    match self.wake_one(id, tick, &mut views, registry, robots) {
                        Some(deadline) => woken.push((id, deadline)),
                        None if self.eligible(id, registry) => {
                            outcomes.push((id, TurnOutcome::Skipped));
                        }
                        None => outcomes.push((id, TurnOutcome::Idle)),
                    }
                }
                for (id, deadline) in woken {
                    let outcome = self.finish_one(id, tick, deadline);
                    outcomes.push((id, outcome));
                }
            }
        }

        for (index, view) in views.into_iter().enumerate() {
            if let Some(view) = view {
                requeue_events(registry, RobotId::new(index), view);
            }
        }

        for (id, outcome) in &outcomes {
            match outcome {
                TurnOutcome::Answered(command) => {
                    registry.robot_mut(*id).record_answer();
                    input.commands[id.index()] = Some(command.clone());
                }
                TurnOutcome::Skipped => {
                    let robot = registry.robot_mut(*id);
                    robot.record_skip();
                    robot.add_event(RobotEvent::SkippedTurn { time: tick });
                    robot.println(format!("SYSTEM: {} skipped turn {tick}", robot.name()));
                    warn!(
                        robot = %robot.name(),
                        tick,
                        skipped = robot.skipped_turns(),
                        "robot skipped turn"
                    );
                }
                TurnOutcome::Idle => {}
            }
        }
        outcomes
    }

    fn eligible(&self, id: RobotId, registry: &Registry) -> bool {
        registry
            .get(id)
            .is_some_and(|r| r.is_alive() && !r.is_halted())
            && self.is_started(id)
    }

    /// Wakes one robot. Returns its reply deadline, or `None` if it was not
    /// woken.
    fn wake_one(
        &mut self,
        id: RobotId,
        tick: u64,
        views: &mut [Option<RobotView>],
        registry: &Registry,
        robots: usize,
    ) -> Option<Instant> {
        if !self.eligible(id, registry) {
            return None;
        }
        let startup_budget = self.robot_budget(true, robots);
        let turn_budget = self.robot_budget(false, robots);
        let worker = self.workers[id.index()].as_mut()?;
        if !Self::settle(worker, turn_budget) {
            return None;
        }
        let budget = if worker.first_turn {
            startup_budget
        } else {
            turn_budget
        };
        let slot = views.get_mut(id.index())?;
        let view = slot.take()?;
        match Self::wake(worker, tick, view) {
            Ok(()) => Some(Instant::now() + budget),
            Err(view) => {
                *slot = Some(view);
                None
            }
        }
    }

    fn finish_one(&mut self, id: RobotId, tick: u64, deadline: Instant) -> TurnOutcome {
        let Some(worker) = self.workers.get_mut(id.index()).and_then(Option::as_mut) else {
            return TurnOutcome::Skipped;
        };
        match Self::await_reply(worker, tick, deadline) {
            Some(command) => TurnOutcome::Answered(command),
            None => TurnOutcome::Skipped,
        }
    }

    fn turn(
        &mut self,
        id: RobotId,
        tick: u64,
        views: &mut [Option<RobotView>],
        registry: &Registry,
        robots: usize,
    ) -> TurnOutcome {
        if !self.eligible(id, registry) {
            return TurnOutcome::Idle;
        }
        match self.wake_one(id, tick, views, registry, robots) {
            Some(deadline) => self.finish_one(id, tick, deadline),
            None => TurnOutcome::Skipped,
        }
    }

    /// Stops every worker, waiting a bounded time for them to exit.
    ///
    /// Returns the number of workers abandoned because they did not stop.
    pub fn stop_all(&mut self) -> usize {
        let handles: Vec<(String, JoinHandle<()>)> = self
            .workers
            .drain(..)
            .flatten()
            .map(|worker| (worker.name, worker.handle))
            .collect();
        join_with_timeout(handles, WORKER_JOIN_TIMEOUT)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Puts the events of an undelivered view back on the robot's queue. The
/// status event is rebuilt every tick and is dropped.
fn requeue_events(registry: &mut Registry, id: RobotId, view: RobotView) {
    let events: Vec<RobotEvent> = view
        .events
        .into_iter()
        .filter(|event| !matches!(event, RobotEvent::Status(_)))
        .collect();
    if !events.is_empty() {
        registry.robot_mut(id).restore_events(events);
    }
}

/// Joins threads until `timeout` runs out; the rest are detached.
///
/// Returns the number of threads abandoned.
pub(crate) fn join_with_timeout(
    handles: Vec<(String, JoinHandle<()>)>,
    timeout: Duration,
) -> usize {
    let deadline = Instant::now() + timeout;
    let mut pending = handles;
    while !pending.is_empty() && Instant::now() < deadline {
        let (finished, running): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|(_, handle)| handle.is_finished());
        for (name, handle) in finished {
            if handle.join().is_err() {
                warn!(thread = %name, "thread panicked during shutdown");
            }
        }
        pending = running;
        if !pending.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
    }
    for (name, _) in &pending {
        warn!(thread = %name, "thread did not stop in time; abandoning it");
    }
    pending.len()
}
