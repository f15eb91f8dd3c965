use proptest::prelude::*;
use sprinkler_core::MotorDirection;
use sprinkler_core::controller::AngleWindow;
use sprinkler_core::overshoot::OvershootModel;
use sprinkler_core::sensor::{ANGLE_RANGE, forward_distance, shortest_diff};
use sprinkler_core::trend::TrendAnalyzer;

proptest! {
    #[test]
    fn forward_distance_is_complementary(from in 0..ANGLE_RANGE, to in 0..ANGLE_RANGE) {
        let right = forward_distance(from, to, MotorDirection::RIGHT);
        let left = forward_distance(from, to, MotorDirection::LEFT);
        prop_assert!((0..ANGLE_RANGE).contains(&right));
        prop_assert!((0..ANGLE_RANGE).contains(&left));
        if from == to {
            prop_assert_eq!(right, 0);
            prop_assert_eq!(left, 0);
        } else {
            prop_assert_eq!(right, ANGLE_RANGE - left);
        }
    }

    #[test]
    fn shortest_diff_lands_on_target(from in 0..ANGLE_RANGE, to in 0..ANGLE_RANGE) {
        let d = shortest_diff(from, to);
        prop_assert!(d > -ANGLE_RANGE / 2 && d <= ANGLE_RANGE / 2);
        prop_assert_eq!((from + d).rem_euclid(ANGLE_RANGE), to);
    }

    #[test]
    fn window_holds_the_target(
        target in 0..ANGLE_RANGE,
        inertia in 3..200i32,
        right in any::<bool>(),
    ) {
        let direction = if right { MotorDirection::RIGHT } else { MotorDirection::LEFT };
        let w = AngleWindow::new(target, direction, inertia, 3);
        prop_assert!(w.contains(target));
        prop_assert!(!w.contains((target + ANGLE_RANGE / 2) % ANGLE_RANGE));
    }

    #[test]
    fn monotonic_sequences_have_signed_trend(
        start in -10_000..10_000i32,
        steps in prop::collection::vec(1..50i32, 16..40),
    ) {
        let mut up = TrendAnalyzer::new(16);
        let mut down = TrendAnalyzer::new(16);
        let mut v = start;
        for s in &steps {
            v += s;
            up.push(v);
            down.push(-v);
        }
        prop_assert!(up.is_full());
        prop_assert!(up.trend(8) > 0);
        prop_assert!(down.trend(8) < 0);
        up.clear();
        prop_assert_eq!(up.len(), 0);
    }

    #[test]
    fn zero_rate_predicts_zero(
        obs in prop::collection::vec((-2000..2000i32, 0..5000i32), 0..30),
    ) {
        let mut m = OvershootModel::new(20, 1000);
        for (rate, v) in obs {
            m.set_overshoot(rate, v);
        }
        prop_assert_eq!(m.predict(0), 0);
    }

    #[test]
    fn single_observation_scales_quadratically(
        rate in 100..500i32,
        v in 10..2000i32,
        negative in any::<bool>(),
    ) {
        // Rates on bucket centres so the observation and both queries bracket exactly.
        let rate = rate / 100 * 100;
        let rate = if negative { -rate } else { rate };
        let mut m = OvershootModel::new(10, 1000);
        m.set_overshoot(rate, v);
        prop_assert!((m.predict(rate) - v).abs() <= v / 10 + 1);
        let quad = m.predict(2 * rate);
        prop_assert!((quad - 4 * v).abs() <= (4 * v) / 10 + 1);
    }
}
