//! Bullets in flight.
//!
//! Lifecycle: `Fired` on the tick the gun goes off, `Moving` while travelling,
//! then exactly one snapshot in a hit state before turning `Inactive` and
//! leaving the active set.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::geometry::heading_vector;

use super::{BulletId, RobotId};

/// Smallest accepted fire power.
pub const MIN_BULLET_POWER: f64 = 0.1;
/// Largest accepted fire power.
pub const MAX_BULLET_POWER: f64 = 3.0;

/// Bullet lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulletState {
    /// Created this tick, still at the gun.
    Fired,
    /// Travelling.
    Moving,
    /// Struck a robot this tick.
    HitVictim,
    /// Collided with another bullet this tick.
    HitBullet,
    /// Left the battlefield this tick.
    HitWall,
    /// Finished; removed from the active set.
    Inactive,
}

impl BulletState {
    /// True for the three hit states.
    #[must_use]
    pub const fn is_hit(self) -> bool {
        matches!(self, Self::HitVictim | Self::HitBullet | Self::HitWall)
    }

    /// True while the bullet can still collide.
    #[must_use]
    pub const fn is_flying(self) -> bool {
        matches!(self, Self::Fired | Self::Moving)
    }
}

/// One projectile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletPeer {
    id: BulletId,
    owner: RobotId,
    victim: Option<RobotId>,
    position: DVec2,
    last_position: DVec2,
    heading: f64,
    power: f64,
    state: BulletState,
}

impl BulletPeer {
    /// Creates a freshly fired bullet at the gun.
    #[must_use]
    pub fn new(id: BulletId, owner: RobotId, position: DVec2, heading: f64, power: f64) -> Self {
        Self {
            id,
            owner,
            victim: None,
            position,
            last_position: position,
            heading,
            power: power.clamp(MIN_BULLET_POWER, MAX_BULLET_POWER),
            state: BulletState::Fired,
        }
    }

    /// Speed for a given power.
    #[must_use]
    pub fn speed_for(power: f64) -> f64 {
        20.0 - 3.0 * power
    }

    /// Damage dealt to a robot for a given power.
    #[must_use]
    pub fn damage_for(power: f64) -> f64 {
        let mut damage = 4.0 * power;
        if power > 1.0 {
            damage += 2.0 * (power - 1.0);
        }
        damage
    }

    /// Energy returned to the shooter on a hit.
    #[must_use]
    pub fn refund_for(power: f64) -> f64 {
        3.0 * power
    }

    /// Advances one tick along the heading and marks the bullet as moving.
    pub fn advance(&mut self) {
        self.last_position = self.position;
        self.position += heading_vector(self.heading) * self.speed();
        self.state = BulletState::Moving;
    }

    /// Segment travelled during the last advance.
    #[must_use]
    pub const fn path(&self) -> (DVec2, DVec2) {
        (self.last_position, self.position)
    }

    /// Records a hit on a robot.
    pub fn hit_victim(&mut self, victim: RobotId) {
        self.state = BulletState::HitVictim;
        self.victim = Some(victim);
    }

    /// Records a collision with another bullet.
    pub fn hit_bullet(&mut self) {
        self.state = BulletState::HitBullet;
    }

    /// Records leaving the battlefield.
    pub fn hit_wall(&mut self) {
        self.state = BulletState::HitWall;
    }

    /// Retires the bullet.
    pub fn deactivate(&mut self) {
        self.state = BulletState::Inactive;
    }

    /// Bullet ID.
    #[must_use]
    pub const fn id(&self) -> BulletId {
        self.id
    }

    /// Robot that fired the bullet.
    #[must_use]
    pub const fn owner(&self) -> RobotId {
        self.owner
    }

    /// Robot hit, if any.
    #[must_use]
    pub const fn victim(&self) -> Option<RobotId> {
        self.victim
    }

    /// Current position.
    #[must_use]
    pub const fn position(&self) -> DVec2 {
        self.position
    }

    /// Travel heading in radians.
    #[must_use]
    pub const fn heading(&self) -> f64 {
        self.heading
    }

    /// Fire power.
    #[must_use]
    pub const fn power(&self) -> f64 {
        self.power
    }

    /// Units travelled per tick.
    #[must_use]
    pub fn speed(&self) -> f64 {
        Self::speed_for(self.power)
    }

    /// Damage on impact.
    #[must_use]
    pub fn damage(&self) -> f64 {
        Self::damage_for(self.power)
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> BulletState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn power_three_formulas() {
        assert!((BulletPeer::damage_for(3.0) - 16.0).abs() < 1e-12);
        assert!((BulletPeer::speed_for(3.0) - 11.0).abs() < 1e-12);
        assert!((BulletPeer::refund_for(3.0) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn low_power_damage_has_no_bonus() {
        assert!((BulletPeer::damage_for(1.0) - 4.0).abs() < 1e-12);
        assert!((BulletPeer::damage_for(0.5) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn power_is_clamped() {
        let b = BulletPeer::new(BulletId::new(0), RobotId::new(0), DVec2::ZERO, 0.0, 10.0);
        assert_eq!(b.power(), MAX_BULLET_POWER);
        let b = BulletPeer::new(BulletId::new(1), RobotId::new(0), DVec2::ZERO, 0.0, 0.0);
        assert_eq!(b.power(), MIN_BULLET_POWER);
    }

    #[test]
    fn advance_moves_along_heading() {
        let mut b = BulletPeer::new(
            BulletId::new(0),
            RobotId::new(0),
            DVec2::new(100.0, 200.0),
            FRAC_PI_2,
            3.0,
        );
        assert_eq!(b.state(), BulletState::Fired);
        b.advance();
        assert_eq!(b.state(), BulletState::Moving);
        assert!((b.position().x - 111.0).abs() < 1e-9);
        assert!((b.position().y - 200.0).abs() < 1e-9);
        assert_eq!(b.path().0, DVec2::new(100.0, 200.0));
    }

    #[test]
    fn state_predicates() {
        assert!(BulletState::HitVictim.is_hit());
        assert!(BulletState::HitWall.is_hit());
        assert!(!BulletState::Moving.is_hit());
        assert!(BulletState::Fired.is_flying());
        assert!(!BulletState::Inactive.is_flying());
    }
}
