//! Bounded, tick-driven timers.
//!
//! Every "wait" in the game (return-to-rest, lift window, orientation
//! restore, wing check, boost) is one of these, stored in an `Option` on the
//! owning state.  Starting a new one overwrites the slot, so a restart
//! replaces the running instance instead of stacking a second writer.

use bevy::prelude::*;

/// Elapsed-time accumulator with a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedTimer {
    elapsed: f32,
    duration: f32,
}

impl BoundedTimer {
    pub fn new(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration: duration.max(0.0),
        }
    }

    /// Advance by `dt` seconds (negative steps are ignored) and return the new progress.
    pub fn tick(&mut self, dt: f32) -> f32 {
        self.elapsed = (self.elapsed + dt.max(0.0)).min(self.duration);
        self.progress()
    }

    /// Fraction complete in `[0, 1]`; a zero-length timer is always complete.
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            self.elapsed / self.duration
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn finished(&self) -> bool {
        self.progress() >= 1.0
    }
}

/// Linear position animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTween {
    pub from: Vec3,
    pub to: Vec3,
    pub timer: BoundedTimer,
}

impl PositionTween {
    pub fn new(from: Vec3, to: Vec3, duration: f32) -> Self {
        Self {
            from,
            to,
            timer: BoundedTimer::new(duration),
        }
    }

    /// Advance and return the interpolated position.
    pub fn tick(&mut self, dt: f32) -> Vec3 {
        let t = self.timer.tick(dt);
        self.from.lerp(self.to, t)
    }
}

/// Spherical rotation animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationTween {
    pub from: Quat,
    pub to: Quat,
    pub timer: BoundedTimer,
}

impl RotationTween {
    pub fn new(from: Quat, to: Quat, duration: f32) -> Self {
        Self {
            from,
            to,
            timer: BoundedTimer::new(duration),
        }
    }

    pub fn tick(&mut self, dt: f32) -> Quat {
        let t = self.timer.tick(dt);
        if t >= 1.0 {
            self.to
        } else {
            self.from.slerp(self.to, t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_clamps_at_duration() {
        let mut timer = BoundedTimer::new(1.0);
        assert_eq!(timer.tick(0.25), 0.25);
        assert!(!timer.finished());
        timer.tick(5.0);
        assert!(timer.finished());
        assert_eq!(timer.elapsed(), 1.0);
    }

    #[test]
    fn zero_duration_is_immediately_finished() {
        let timer = BoundedTimer::new(0.0);
        assert!(timer.finished());
    }

    #[test]
    fn position_tween_is_linear_and_lands_exactly() {
        let mut tween = PositionTween::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0), 0.5);
        assert_eq!(tween.tick(0.25), Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(tween.tick(1.0), Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn restarting_replaces_the_running_tween() {
        let mut slot = Some(PositionTween::new(Vec3::ZERO, Vec3::X, 1.0));
        if let Some(t) = slot.as_mut() {
            t.tick(0.9);
        }
        slot = Some(PositionTween::new(Vec3::ZERO, Vec3::Y, 1.0));
        let tween = slot.expect("slot refilled");
        assert_eq!(tween.timer.elapsed(), 0.0);
        assert_eq!(tween.to, Vec3::Y);
    }

    #[test]
    fn rotation_tween_ends_on_target() {
        let target = Quat::from_rotation_y(1.0);
        let mut tween = RotationTween::new(Quat::IDENTITY, target, 2.5);
        tween.tick(1.0);
        assert_eq!(tween.tick(2.0), target);
    }
}
