//! Bullet resolver: bullet movement and every bullet contact.
//!
//! Processing order within a tick:
//!
//! 1. Bullets that were in a hit state for the last snapshot become
//!    `Inactive` and leave the active set
//! 2. Every flying bullet advances one step
//! 3. Bullet vs robot: the travelled segment is tested against live robot
//!    boxes; the closest robot other than the shooter is hit
//! 4. Bullet vs bullet: crossing segments hit each other, no damage
//! 5. Bullets outside the battlefield hit the wall

use tracing::trace;

use crate::config::BattleRules;
use crate::entity::{BulletPeer, BulletState, RobotId};
use crate::geometry::segments_intersect;
use crate::program::RobotEvent;
use crate::registry::Registry;

use super::{Resolver, TurnInput};

/// Resolver for bullet flight and collisions.
///
/// # Example
///
/// ```
/// use robobattle_core::resolver::{BulletResolver, Resolver};
///
/// assert_eq!(BulletResolver::new().name(), "bullets");
/// ```
#[derive(Debug, Clone, Default)]
pub struct BulletResolver;

impl BulletResolver {
    /// Creates a bullet resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Removes bullets whose hit was shown in the previous snapshot.
    ///
    /// Returns the number of bullets removed.
    pub fn retire_finished(registry: &mut Registry) -> usize {
        let bullets = registry.bullets_mut();
        let before = bullets.len();
        for bullet in bullets.iter_mut() {
            if bullet.state().is_hit() {
                bullet.deactivate();
            }
        }
        bullets.retain(|b| b.state() != BulletState::Inactive);
        before - bullets.len()
    }

    fn advance_all(registry: &mut Registry) {
        for bullet in registry.bullets_mut().iter_mut() {
            if bullet.state().is_flying() {
                bullet.advance();
            }
        }
    }

    fn find_victim(registry: &Registry, bullet: &BulletPeer) -> Option<RobotId> {
        let (from, to) = bullet.path();
        registry
            .robots()
            .iter()
            .filter(|r| r.is_alive() && r.id() != bullet.owner())
            .filter(|r| r.bounding_box().intersects_segment(from, to))
            .min_by(|a, b| {
                from.distance_squared(a.position())
                    .total_cmp(&from.distance_squared(b.position()))
            })
            .map(|r| r.id())
    }

    fn robot_collisions(registry: &mut Registry, rules: &BattleRules) {
        for index in 0..registry.bullets().len() {
            let bullet = &registry.bullets()[index];
            if !bullet.state().is_flying() {
                continue;
            }
            if let Some(victim) = Self::find_victim(registry, bullet) {
                Self::apply_hit(registry, index, victim, rules);
            }
        }
    }

    fn apply_hit(registry: &mut Registry, index: usize, victim: RobotId, rules: &BattleRules) {
        let bullet = &mut registry.bullets_mut()[index];
        bullet.hit_victim(victim);
        let (bullet_id, owner, power) = (bullet.id(), bullet.owner(), bullet.power());

        let damage = BulletPeer::damage_for(power);
        let team_fire = registry.are_teammates(owner, victim);
        let shooter_name = registry.robot(owner).name().to_string();
        let victim_name = registry.robot(victim).name().to_string();

        let victim_robot = registry.robot_mut(victim);
        let scored = damage.min(victim_robot.energy());
        victim_robot.set_energy(victim_robot.energy() - damage);
        let victim_energy = victim_robot.energy();
        let killed = victim_energy <= 0.0 && victim_robot.mark_dead();
        victim_robot.add_event(RobotEvent::HitByBullet {
            bullet: bullet_id,
            shooter: shooter_name,
            power,
        });
        registry.record_energy_loss(damage, rules.inactivity_reset_energy);
        if killed {
            registry.queue_death(victim);
        }

        let shooter = registry.robot_mut(owner);
        if !team_fire {
            shooter.statistics_mut().score_bullet_damage(victim, scored);
            if killed {
                shooter.statistics_mut().score_bullet_kill(victim);
            }
        }
        if shooter.is_alive() {
            shooter.set_energy(shooter.energy() + BulletPeer::refund_for(power));
        }
        shooter.add_event(RobotEvent::BulletHit {
            bullet: bullet_id,
            victim: victim_name,
            victim_energy,
        });
        trace!(%bullet_id, ?owner, ?victim, damage, killed, "bullet hit robot");
    }

    fn bullet_collisions(registry: &mut Registry) {
        let count = registry.bullets().len();
        for i in 0..count {
            for j in (i + 1)..count {
                let bullets = registry.bullets();
                let (a, b) = (&bullets[i], &bullets[j]);
                if !a.state().is_flying() || !b.state().is_flying() {
                    continue;
                }
                let (a1, a2) = a.path();
                let (b1, b2) = b.path();
                if !segments_intersect(a1, a2, b1, b2) {
                    continue;
                }
                let (a_id, a_owner, b_id, b_owner) = (a.id(), a.owner(), b.id(), b.owner());
                let bullets = registry.bullets_mut();
                bullets[i].hit_bullet();
                bullets[j].hit_bullet();
                registry.robot_mut(a_owner).add_event(RobotEvent::BulletHitBullet {
                    bullet: a_id,
                    other: b_id,
                });
                registry.robot_mut(b_owner).add_event(RobotEvent::BulletHitBullet {
                    bullet: b_id,
                    other: a_id,
                });
                trace!(%a_id, %b_id, "bullets collided");
            }
        }
    }

    fn wall_collisions(registry: &mut Registry, rules: &BattleRules) {
        let mut missed = Vec::new();
        for bullet in registry.bullets_mut().iter_mut() {
            if !bullet.state().is_flying() {
                continue;
            }
            let p = bullet.position();
            if p.x < 0.0
                || p.y < 0.0
                || p.x > rules.battlefield_width
                || p.y > rules.battlefield_height
            {
                bullet.hit_wall();
                missed.push((bullet.owner(), bullet.id()));
            }
        }
        for (owner, bullet) in missed {
            registry
                .robot_mut(owner)
                .add_event(RobotEvent::BulletMissed { bullet });
        }
    }
}

impl Resolver for BulletResolver {
    fn name(&self) -> &'static str {
        "bullets"
    }

    fn resolve(&self, _input: &TurnInput, rules: &BattleRules, registry: &mut Registry) {
        Self::retire_finished(registry);
        Self::advance_all(registry);
        Self::robot_collisions(registry, rules);
        Self::bullet_collisions(registry);
        Self::wall_collisions(registry, rules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContestantEntry;
    use glam::DVec2;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn duel(a: DVec2, b: DVec2) -> Registry {
        let mut registry = Registry::new(&[
            ContestantEntry::solo("a.A"),
            ContestantEntry::solo("b.B"),
        ]);
        registry.robot_mut(RobotId::new(0)).place(a, 0.0);
        registry.robot_mut(RobotId::new(1)).place(b, 0.0);
        registry
    }

    fn rules() -> BattleRules {
        BattleRules {
            battlefield_width: 400.0,
            battlefield_height: 400.0,
            ..BattleRules::default()
        }
    }

    fn step(registry: &mut Registry) {
        BulletResolver::new().resolve(&TurnInput::default(), &rules(), registry);
    }

    mod hit_tests {
        use super::*;

        #[test]
        fn power_three_bullet_hits_after_eight_steps() {
            let a = RobotId::new(0);
            let b = RobotId::new(1);
            let mut registry = duel(DVec2::new(100.0, 200.0), DVec2::new(200.0, 200.0));
            registry.spawn_bullet(a, DVec2::new(100.0, 200.0), FRAC_PI_2, 3.0);

            for _ in 0..7 {
                step(&mut registry);
                assert_eq!(registry.bullets()[0].state(), BulletState::Moving);
            }
            step(&mut registry);
            assert_eq!(registry.bullets()[0].state(), BulletState::HitVictim);
            assert_eq!(registry.bullets()[0].victim(), Some(b));
            assert!((registry.robot(b).energy() - 84.0).abs() < 1e-9);
            assert!((registry.robot(a).energy() - 109.0).abs() < 1e-9);
            assert!((registry.robot(a).statistics().total().bullet_damage - 16.0).abs() < 1e-9);

            step(&mut registry);
            assert!(registry.bullets().is_empty());
        }

        #[test]
        fn shooter_is_never_hit_by_own_bullet() {
            let a = RobotId::new(0);
            let mut registry = duel(DVec2::new(100.0, 200.0), DVec2::new(300.0, 300.0));
            registry.spawn_bullet(a, DVec2::new(100.0, 200.0), FRAC_PI_2, 1.0);
            step(&mut registry);
            assert_eq!(registry.bullets()[0].state(), BulletState::Moving);
            assert_eq!(registry.robot(a).energy(), 100.0);
        }

        #[test]
        fn lethal_hit_kills_and_awards_bonus() {
            let a = RobotId::new(0);
            let b = RobotId::new(1);
            let mut registry = duel(DVec2::new(100.0, 200.0), DVec2::new(125.0, 200.0));
            registry.robot_mut(b).set_energy(16.0);
            registry.spawn_bullet(a, DVec2::new(100.0, 200.0), FRAC_PI_2, 3.0);
            step(&mut registry);

            assert!(registry.robot(b).is_dead());
            assert_eq!(registry.robot(b).energy(), 0.0);
            assert_eq!(registry.take_death_queue(), vec![b]);
            let stats = registry.robot(a).statistics().total();
            assert!((stats.bullet_damage - 16.0).abs() < 1e-9);
            assert!((stats.bullet_kill_bonus - 3.2).abs() < 1e-9);
        }

        #[test]
        fn teammate_hits_do_not_score() {
            let mut registry = Registry::new(&[
                ContestantEntry::team("Blue", &["t.A", "t.B"]),
                ContestantEntry::solo("s.C"),
            ]);
            let a = RobotId::new(0);
            let b = RobotId::new(1);
            registry.robot_mut(a).place(DVec2::new(100.0, 200.0), 0.0);
            registry.robot_mut(b).place(DVec2::new(125.0, 200.0), 0.0);
            registry
                .robot_mut(RobotId::new(2))
                .place(DVec2::new(300.0, 50.0), 0.0);
            registry.spawn_bullet(a, DVec2::new(100.0, 200.0), FRAC_PI_2, 1.0);
            step(&mut registry);

            assert!((registry.robot(b).energy() - 96.0).abs() < 1e-9);
            assert_eq!(registry.robot(a).statistics().total().bullet_damage, 0.0);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn bullet_leaving_field_hits_wall_then_retires() {
            let a = RobotId::new(0);
            let mut registry = duel(DVec2::new(100.0, 390.0), DVec2::new(300.0, 50.0));
            registry.spawn_bullet(a, DVec2::new(100.0, 390.0), 0.0, 3.0);
            step(&mut registry);
            assert_eq!(registry.bullets()[0].state(), BulletState::HitWall);
            assert!(matches!(
                registry.robot(a).pending_events(),
                [RobotEvent::BulletMissed { .. }]
            ));
            step(&mut registry);
            assert!(registry.bullets().is_empty());
        }

        #[test]
        fn crossing_bullets_destroy_each_other() {
            let a = RobotId::new(0);
            let b = RobotId::new(1);
            let mut registry = duel(DVec2::new(20.0, 20.0), DVec2::new(380.0, 20.0));
            registry.spawn_bullet(a, DVec2::new(195.0, 200.0), FRAC_PI_2, 3.0);
            registry.spawn_bullet(b, DVec2::new(200.0, 205.0), PI, 3.0);
            step(&mut registry);

            assert!(registry
                .bullets()
                .iter()
                .all(|bullet| bullet.state() == BulletState::HitBullet));
            assert_eq!(registry.robot(a).energy(), 100.0);
            assert_eq!(registry.robot(b).energy(), 100.0);
        }

        #[test]
        fn retire_counts_removed_bullets() {
            let a = RobotId::new(0);
            let mut registry = duel(DVec2::new(100.0, 200.0), DVec2::new(300.0, 300.0));
            registry.spawn_bullet(a, DVec2::ZERO, 0.0, 1.0);
            registry.spawn_bullet(a, DVec2::ZERO, 0.0, 1.0);
            registry.bullets_mut()[0].hit_wall();
            assert_eq!(BulletResolver::retire_finished(&mut registry), 1);
            assert_eq!(registry.bullets().len(), 1);
        }
    }
}
