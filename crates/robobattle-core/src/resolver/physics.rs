//! Physics resolver for robot commands.
//!
//! For each live robot, in the tick's permutation order:
//!
//! 1. Fire, if requested and the gun is cold
//! 2. Turn body, gun and radar within their rate limits
//! 3. Accelerate towards the requested velocity and move
//! 4. Clamp to the battlefield (wall bump) and undo overlaps (robot bump)
//! 5. Cool the gun
//!
//! Bumps stop the robot without damage. A robot without a command for the
//! tick (skipped, or not running) holds its position.
//!
//! After every robot has moved the inactivity counter advances; once it is
//! past the rules' inactivity time, every live robot is drained.

use glam::DVec2;
use tracing::trace;

use crate::command::RobotCommand;
use crate::config::BattleRules;
use crate::entity::bullet::{MAX_BULLET_POWER, MIN_BULLET_POWER};
use crate::entity::RobotId;
use crate::geometry::{heading_vector, normal_absolute_angle};
use crate::program::RobotEvent;
use crate::registry::{playable_area, Registry};

use super::{Resolver, TurnInput};

/// Top speed in units per tick.
pub const MAX_VELOCITY: f64 = 8.0;
/// Speed gained per tick.
pub const ACCELERATION: f64 = 1.0;
/// Speed lost per tick when braking.
pub const DECELERATION: f64 = 2.0;
/// Gun turn limit in degrees per tick.
pub const MAX_GUN_TURN_DEGREES: f64 = 20.0;
/// Radar turn limit in degrees per tick.
pub const MAX_RADAR_TURN_DEGREES: f64 = 45.0;

/// Body turn limit at the given speed, in radians.
#[must_use]
pub fn max_body_turn(velocity: f64) -> f64 {
    (10.0 - 0.75 * velocity.abs()).to_radians()
}

/// Velocity after one tick of accelerating towards `target`.
///
/// Speeding up gains [`ACCELERATION`]; slowing down, including through zero,
/// loses [`DECELERATION`].
#[must_use]
pub fn next_velocity(current: f64, target: f64) -> f64 {
    let target = target.clamp(-MAX_VELOCITY, MAX_VELOCITY);
    if target > current {
        let step = if current >= 0.0 { ACCELERATION } else { DECELERATION };
        (current + step).min(target)
    } else if target < current {
        let step = if current <= 0.0 { ACCELERATION } else { DECELERATION };
        (current - step).max(target)
    } else {
        current
    }
}

/// Resolver for robot movement, firing and inactivity.
///
/// # Example
///
/// ```
/// use robobattle_core::resolver::{next_velocity, PhysicsResolver, Resolver};
///
/// assert_eq!(PhysicsResolver::new().name(), "physics");
/// assert_eq!(next_velocity(0.0, 8.0), 1.0);
/// assert_eq!(next_velocity(8.0, 0.0), 6.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PhysicsResolver;

impl PhysicsResolver {
    /// Creates a physics resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn fire(registry: &mut Registry, id: RobotId, requested: f64, rules: &BattleRules) {
        let robot = registry.robot(id);
        if robot.gun_heat() > 0.0 || robot.energy() <= 0.0 {
            return;
        }
        let power = requested
            .clamp(MIN_BULLET_POWER, MAX_BULLET_POWER)
            .min(robot.energy());
        let (position, heading) = (robot.position(), robot.gun_heading());

        let robot = registry.robot_mut(id);
        robot.set_energy(robot.energy() - power);
        robot.set_gun_heat(1.0 + power / 5.0);
        registry.record_energy_loss(power, rules.inactivity_reset_energy);
        let bullet = registry.spawn_bullet(id, position, heading, power);
        trace!(robot = ?id, %bullet, power, "fired");
    }

    fn turn_and_move(
        registry: &mut Registry,
        id: RobotId,
        command: &RobotCommand,
        rules: &BattleRules,
    ) {
        let robot = registry.robot_mut(id);

        let body_limit = max_body_turn(robot.velocity());
        let body = command.body_turn.clamp(-body_limit, body_limit);
        let gun_limit = MAX_GUN_TURN_DEGREES.to_radians();
        let gun = command.gun_turn.clamp(-gun_limit, gun_limit);
        let radar_limit = MAX_RADAR_TURN_DEGREES.to_radians();
        let radar = command.radar_turn.clamp(-radar_limit, radar_limit);

        robot.set_heading(normal_absolute_angle(robot.heading() + body));
        robot.set_gun_heading(normal_absolute_angle(robot.gun_heading() + body + gun));
        robot.set_radar_heading(normal_absolute_angle(robot.radar_heading() + body + gun + radar));

        let velocity = next_velocity(robot.velocity(), command.velocity);
        robot.set_velocity(velocity);
        let moved = robot.position() + heading_vector(robot.heading()) * velocity;

        let (min, max) = playable_area(rules);
        let clamped = moved.clamp(min, max);
        robot.set_position(clamped);
        if clamped != moved {
            robot.set_velocity(0.0);
            robot.add_event(RobotEvent::HitWall);
        }
        robot.set_debug_marks(command.debug_marks.clone());
    }

    /// Undoes the move of `id` if it now overlaps another live robot.
    fn resolve_bumps(registry: &mut Registry, id: RobotId, previous: DVec2) {
        let mover = registry.robot(id).bounding_box();
        let hit: Vec<RobotId> = registry
            .robots()
            .iter()
            .filter(|other| other.id() != id && other.is_alive())
            .filter(|other| other.bounding_box().intersects(&mover))
            .map(|other| other.id())
            .collect();
        if hit.is_empty() {
            return;
        }

        let mover_name = registry.robot(id).name().to_string();
        for &other in &hit {
            let other_name = registry.robot(other).name().to_string();
            registry.robot_mut(id).add_event(RobotEvent::HitRobot {
                name: other_name,
                at_fault: true,
            });
            registry.robot_mut(other).add_event(RobotEvent::HitRobot {
                name: mover_name.clone(),
                at_fault: false,
            });
        }
        let robot = registry.robot_mut(id);
        robot.set_position(previous);
        robot.set_velocity(0.0);
    }

    fn drain_inactive(registry: &mut Registry, rules: &BattleRules) {
        registry.tick_inactivity();
        if registry.inactive_turn_count() <= rules.inactivity_time {
            return;
        }
        for robot in registry.robots_mut() {
            if robot.is_alive() {
                robot.set_energy(robot.energy() - rules.inactivity_drain);
            }
        }
    }
}

impl Resolver for PhysicsResolver {
    fn name(&self) -> &'static str {
        "physics"
    }

    fn resolve(&self, input: &TurnInput, rules: &BattleRules, registry: &mut Registry) {
        for &id in &input.order {
            let robot = registry.robot(id);
            if !robot.is_alive() || robot.is_halted() {
                continue;
            }
            let previous = robot.position();

            match input.command(id) {
                Some(command) => {
                    if let Some(power) = command.fire {
                        Self::fire(registry, id, power, rules);
                    }
                    Self::turn_and_move(registry, id, command, rules);
                    Self::resolve_bumps(registry, id, previous);
                }
                None => registry.robot_mut(id).set_velocity(0.0),
            }

            let robot = registry.robot_mut(id);
            robot.set_gun_heat(robot.gun_heat() - rules.gun_cooling_rate);
        }
        Self::drain_inactive(registry, rules);
    }
}
