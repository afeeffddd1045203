//! Command bridge from control threads into the simulation thread.
//!
//! Any thread holding a [`BattleControl`] may enqueue [`ControlCommand`]s.
//! The driver drains the queue exactly once per tick, after scoring and
//! before the snapshot, and applies commands in enqueue order. Abort, pause
//! and single-step are shared flags checked at tick boundaries.
//!
//! # Example
//!
//! ```
//! use robobattle_core::bridge::CommandBridge;
//! use robobattle_core::entity::RobotId;
//! use robobattle_core::registry::{ContestantEntry, Registry};
//!
//! let mut registry = Registry::new(&[ContestantEntry::solo("a"), ContestantEntry::solo("b")]);
//! let bridge = CommandBridge::new();
//! let control = bridge.control();
//!
//! control.kill_robot(RobotId::new(1));
//! assert_eq!(bridge.drain(&mut registry), 1);
//! assert!(registry.robot(RobotId::new(1)).is_dead());
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entity::{PaintFlags, RobotId};
use crate::program::{InputEvent, RobotEvent};
use crate::registry::Registry;

/// An action requested from outside the simulation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Kill a robot immediately.
    Kill(RobotId),
    /// Turn a robot's painting on or off.
    SetPaint {
        /// Target robot
        robot: RobotId,
        /// New state
        enabled: bool,
    },
    /// Turn a robot's debug painting on or off.
    SetDebugPaint {
        /// Target robot
        robot: RobotId,
        /// New state
        enabled: bool,
    },
    /// Deliver an input event to every live robot.
    InjectEvent(InputEvent),
}

/// Flags shared by every control handle and the driver.
#[derive(Debug, Default)]
struct SharedControl {
    aborted: AtomicBool,
    paused: AtomicBool,
    closed: AtomicBool,
    steps: AtomicU32,
}

// =============================================================================
// Control Handle
// =============================================================================

/// Cloneable, thread-safe control surface for a running battle.
///
/// All calls are fire-and-forget: queued commands apply at the next tick
/// boundary. Once the battle has finished, commands are refused and
/// [`BattleControl::submit`] returns `false`.
#[derive(Debug, Clone)]
pub struct BattleControl {
    sender: Sender<ControlCommand>,
    wake: Sender<()>,
    shared: Arc<SharedControl>,
}

impl BattleControl {
    /// Enqueues a command. Returns `false` once the battle has finished.
    pub fn submit(&self, command: ControlCommand) -> bool {
        if self.shared.closed.load(Ordering::SeqCst) {
            warn!(?command, "battle finished; dropping control command");
            return false;
        }
        match self.sender.send(command) {
            Ok(()) => true,
            Err(err) => {
                warn!(command = ?err.into_inner(), "battle gone; dropping control command");
                false
            }
        }
    }

    /// Kills a robot at the next tick boundary.
    pub fn kill_robot(&self, robot: RobotId) {
        self.submit(ControlCommand::Kill(robot));
    }

    /// Enables or disables painting for a robot.
    pub fn set_paint_enabled(&self, robot: RobotId, enabled: bool) {
        self.submit(ControlCommand::SetPaint { robot, enabled });
    }

    /// Enables or disables debug painting for a robot.
    pub fn set_debug_paint_enabled(&self, robot: RobotId, enabled: bool) {
        self.submit(ControlCommand::SetDebugPaint { robot, enabled });
    }

    /// Forwards an input event to every live robot.
    pub fn inject_event(&self, event: InputEvent) {
        self.submit(ControlCommand::InjectEvent(event));
    }

    /// Stops the battle at the next tick boundary.
    pub fn abort(&self) {
        debug!("abort requested");
        self.shared.aborted.store(true, Ordering::SeqCst);
        self.notify();
    }

    /// Holds the driver at the next tick boundary.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        self.notify();
    }

    /// Lets a paused driver continue.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.steps.store(0, Ordering::SeqCst);
        self.notify();
    }

    /// Runs exactly one more tick while paused.
    pub fn step(&self) {
        self.shared.steps.fetch_add(1, Ordering::SeqCst);
        self.notify();
    }

    /// True once abort was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// True while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// True once the battle has finished.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Wakes a driver blocked in [`CommandBridge::wait_while_paused`]. A full
    /// slot already holds a pending wake-up.
    fn notify(&self) {
        let _ = self.wake.try_send(());
    }
}

// =============================================================================
// Bridge
// =============================================================================

/// Driver-side end of the command queue.
#[derive(Debug)]
pub struct CommandBridge {
    receiver: Receiver<ControlCommand>,
    woken: Receiver<()>,
    control: BattleControl,
}

impl Default for CommandBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBridge {
    /// Creates an empty bridge.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        let (wake, woken) = bounded(1);
        Self {
            receiver,
            woken,
            control: BattleControl {
                sender,
                wake,
                shared: Arc::new(SharedControl::default()),
            },
        }
    }

    /// A new control handle for this bridge.
    #[must_use]
    pub fn control(&self) -> BattleControl {
        self.control.clone()
    }

    /// Applies every queued command in enqueue order.
    ///
    /// Returns the number of commands applied. Draining an empty queue
    /// changes nothing.
    pub fn drain(&self, registry: &mut Registry) -> usize {
        let mut applied = 0;
        for command in self.receiver.try_iter() {
            debug!(?command, "applying control command");
            apply_control_command(registry, command);
            applied += 1;
        }
        applied
    }

    /// Refuses further commands and discards the ones still queued.
    ///
    /// Returns the number of commands discarded.
    pub fn close(&self) -> usize {
        self.control.shared.closed.store(true, Ordering::SeqCst);
        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            debug!(discarded, "discarded control commands after the battle");
        }
        discarded
    }

    /// True once abort was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.control.is_aborted()
    }

    /// Blocks while paused, letting one tick through per `step`.
    ///
    /// Returns immediately on abort.
    pub fn wait_while_paused(&self) {
        let shared = &self.control.shared;
        loop {
            if shared.aborted.load(Ordering::SeqCst) || !shared.paused.load(Ordering::SeqCst) {
                return;
            }
            if shared
                .steps
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| s.checked_sub(1))
                .is_ok()
            {
                return;
            }
            if self.woken.recv().is_err() {
                return;
            }
        }
    }
}

/// Executes one command against the registry.
pub fn apply_control_command(registry: &mut Registry, command: ControlCommand) {
    match command {
        ControlCommand::Kill(id) => {
            let Some(robot) = registry.get_mut(id) else {
                warn!(robot = ?id, "kill for unknown robot");
                return;
            };
            robot.zero_energy();
            if robot.mark_dead() {
                robot.println("SYSTEM: Robot killed by controller.");
                registry.queue_death(id);
                registry.recompute_active_robots();
            }
        }
        ControlCommand::SetPaint { robot, enabled } => {
            set_flag(registry, robot, PaintFlags::PAINT, enabled);
        }
        ControlCommand::SetDebugPaint { robot, enabled } => {
            set_flag(registry, robot, PaintFlags::DEBUG_PAINT, enabled);
        }
        ControlCommand::InjectEvent(event) => {
            for robot in registry.robots_mut() {
                if robot.is_alive() {
                    robot.add_event(RobotEvent::Interactive(event.clone()));
                }
            }
        }
    }
}

fn set_flag(registry: &mut Registry, id: RobotId, flag: PaintFlags, enabled: bool) {
    match registry.get_mut(id) {
        Some(robot) => robot.set_paint_flag(flag, enabled),
        None => warn!(robot = ?id, "paint toggle for unknown robot"),
    }
}
