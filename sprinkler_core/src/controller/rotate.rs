use super::{SprinklerHead, no_reading};
use crate::error::Result;
use crate::motor::MotorDirection;
use crate::scheduler::Completion;
use crate::sensor::{ANGLE_RANGE, forward_distance, shortest_diff};
use crate::status::HwStatus;

/// Coast allowance for a move of `distance`: scaled by duty, never more than
/// half the move and never less than `epsilon`.
pub fn inertia_offset(constant: i32, duty: u8, distance: i32, epsilon: i32) -> i32 {
    (constant * i32::from(duty) / 100)
        .min(distance / 2)
        .max(epsilon)
}

/// Acceptance window around a target angle, open on the side the nozzle
/// approaches from by the inertia offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngleWindow {
    min: i32,
    max: i32,
}

impl AngleWindow {
    pub fn new(target: i32, direction: MotorDirection, inertia: i32, epsilon: i32) -> Self {
        let (min, max) = if direction == MotorDirection::RIGHT {
            (target - inertia, target + epsilon)
        } else {
            (target - epsilon, target + inertia)
        };
        Self {
            min: min.rem_euclid(ANGLE_RANGE),
            max: max.rem_euclid(ANGLE_RANGE),
        }
    }

    /// Bounds are exclusive. A window with `max < min` wraps through zero.
    pub fn contains(&self, angle: i32) -> bool {
        if self.max > self.min {
            angle > self.min && angle < self.max
        } else {
            angle > self.min || angle < self.max
        }
    }

    pub fn bounds(&self) -> (i32, i32) {
        (self.min, self.max)
    }
}

impl SprinklerHead {
    /// Rotate the shorter way to `target`.
    pub fn rotate_to(&self, target: i32, duty: u8) -> Result<Completion> {
        let Some(current) = self.angle.fetch_if_stale() else {
            return Ok(no_reading("angle"));
        };
        let diff = shortest_diff(current, target);
        let direction = if diff > 0 {
            MotorDirection::RIGHT
        } else {
            MotorDirection::LEFT
        };
        self.rotate_to_direction(direction, target, duty)
    }

    /// Rotate by a signed number of counts; positive turns right.
    pub fn rotate_by(&self, diff: i32, duty: u8) -> Result<Completion> {
        let Some(current) = self.angle.fetch_if_stale() else {
            return Ok(no_reading("angle"));
        };
        let direction = if diff > 0 {
            MotorDirection::RIGHT
        } else {
            MotorDirection::LEFT
        };
        let target = (current + diff).rem_euclid(ANGLE_RANGE);
        self.rotate_to_direction(direction, target, duty)
    }

    /// Rotate in `direction` until the nozzle reaches `target`, passing
    /// through zero if needed.
    pub fn rotate_to_direction(
        &self,
        direction: MotorDirection,
        target: i32,
        duty: u8,
    ) -> Result<Completion> {
        let Some(start) = self.angle.fetch_if_stale() else {
            return Ok(no_reading("angle"));
        };
        let target = target.rem_euclid(ANGLE_RANGE);
        let cfg = &self.cfg.rotation;
        let distance = forward_distance(start, target, direction);
        if distance <= cfg.epsilon {
            return Ok(Completion::ready(HwStatus::Success));
        }

        self.nozzle.run(direction, duty)?;

        let inertia = inertia_offset(cfg.inertia_full_duty, duty, distance, cfg.epsilon);
        let window = AngleWindow::new(target, direction, inertia, cfg.epsilon);
        tracing::debug!(
            start,
            target,
            distance,
            ?direction,
            window = ?window.bounds(),
            "rotating"
        );

        let nozzle = self.nozzle.clone();
        Ok(self.angle.notify_when(
            move |r| {
                if window.contains(r.value()) {
                    HwStatus::Success
                } else {
                    HwStatus::Repeat
                }
            },
            move |_| nozzle.stop_logged(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(100, 3, 1000, 30)]
    #[case(100, 3, 20, 10)]
    #[case(100, 3, 4, 3)]
    #[case(20, 3, 1000, 6)]
    fn offset(#[case] duty: u8, #[case] eps: i32, #[case] distance: i32, #[case] expected: i32) {
        assert_eq!(inertia_offset(30, duty, distance, eps), expected);
    }

    #[test]
    fn right_window_opens_behind_the_target() {
        let w = AngleWindow::new(1000, MotorDirection::RIGHT, 30, 3);
        assert_eq!(w.bounds(), (970, 1003));
        assert!(w.contains(975));
        assert!(w.contains(1002));
        assert!(!w.contains(1003));
        assert!(!w.contains(970));
    }

    #[test]
    fn left_window_opens_above_the_target() {
        let w = AngleWindow::new(1000, MotorDirection::LEFT, 30, 3);
        assert_eq!(w.bounds(), (997, 1030));
        assert!(w.contains(1029));
        assert!(!w.contains(996));
    }

    #[test]
    fn window_wraps_through_zero() {
        let w = AngleWindow::new(10, MotorDirection::RIGHT, 30, 3);
        assert_eq!(w.bounds(), (4076, 13));
        assert!(w.contains(4090));
        assert!(w.contains(0));
        assert!(w.contains(12));
        assert!(!w.contains(13));
        assert!(!w.contains(2000));
    }
}
