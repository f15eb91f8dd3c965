//! Piecewise-linear lookup over calibration samples.

/// Sorted `(x, y)` samples. Queries outside the sampled range extrapolate
/// along the nearest segment; a single sample extrapolates through the origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpolator {
    points: Vec<(i64, i64)>,
}

impl Interpolator {
    pub fn new(mut points: Vec<(i64, i64)>) -> Self {
        points.sort_by_key(|p| p.0);
        points.dedup_by_key(|p| p.0);
        Self { points }
    }

    pub fn points(&self) -> &[(i64, i64)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn predict(&self, x: i64) -> i64 {
        match self.points.as_slice() {
            [] => 0,
            [(x0, y0)] => {
                if *x0 == 0 {
                    *y0
                } else {
                    x * y0 / x0
                }
            }
            pts => {
                let i = pts.partition_point(|p| p.0 <= x);
                // Segment containing x, or the end segment for out-of-range x.
                let hi = i.clamp(1, pts.len() - 1);
                line(pts[hi - 1], pts[hi], x)
            }
        }
    }
}

fn line((x0, y0): (i64, i64), (x1, y1): (i64, i64), x: i64) -> i64 {
    if x1 == x0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn table() -> Interpolator {
        Interpolator::new(vec![(50, 12_000), (10, 4_000), (100, 20_000)])
    }

    #[test]
    fn empty_predicts_zero() {
        assert_eq!(Interpolator::default().predict(123), 0);
    }

    #[test]
    fn single_point_goes_through_origin() {
        let i = Interpolator::new(vec![(10, 100)]);
        assert_eq!(i.predict(20), 200);
        assert_eq!(i.predict(5), 50);
    }

    #[rstest]
    #[case(10, 4_000)]
    #[case(30, 8_000)]
    #[case(50, 12_000)]
    #[case(75, 16_000)]
    #[case(100, 20_000)]
    #[case(150, 28_000)]
    #[case(0, 2_000)]
    fn piecewise_and_extrapolated(#[case] x: i64, #[case] expected: i64) {
        assert_eq!(table().predict(x), expected);
    }

    #[test]
    fn points_are_sorted() {
        let xs: Vec<i64> = table().points().iter().map(|p| p.0).collect();
        assert_eq!(xs, vec![10, 50, 100]);
    }
}
