//! Online model of pressure drift after the valve motor stops.
//!
//! Observations are `(rate at stop, drift after stop)` pairs. Rates are
//! bucketed over `[-max_rate, max_rate]`; drift is assumed to grow with the
//! square of the rate, so every stored sample is rescaled quadratically to the
//! rate being predicted.

use crate::config::OvershootCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sample {
    rate: i32,
    overshoot: i32,
}

impl Sample {
    fn merge(slot: &mut Option<Self>, new: Self) {
        *slot = Some(match *slot {
            None => new,
            Some(old) => Self {
                rate: avg(old.rate, new.rate),
                overshoot: avg(old.overshoot, new.overshoot),
            },
        });
    }

    /// Drift this sample implies at `rate`. `None` for a zero-rate sample.
    fn scaled_to(self, rate: i32) -> Option<i64> {
        if self.rate == 0 {
            return None;
        }
        let r = i128::from(rate);
        let s = i128::from(self.rate);
        let v = i128::from(self.overshoot) * r * r / (s * s);
        Some(v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }
}

fn avg(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)) / 2) as i32
}

#[derive(Debug, Clone)]
pub struct OvershootModel {
    n: i32,
    max_rate: i32,
    step: i32,
    buckets: Vec<Option<Sample>>,
    below: Option<Sample>,
    above: Option<Sample>,
}

impl OvershootModel {
    /// `n` buckets on each side of zero over `[-max_rate, max_rate]`.
    pub fn new(n: usize, max_rate: i32) -> Self {
        let n = i32::try_from(n.max(1)).unwrap_or(i32::MAX / 2);
        let max_rate = max_rate.max(n);
        Self {
            n,
            max_rate,
            step: max_rate / n,
            buckets: vec![None; (2 * n + 1) as usize],
            below: None,
            above: None,
        }
    }

    pub fn from_config(cfg: &OvershootCfg) -> Self {
        Self::new(cfg.buckets, cfg.max_rate)
    }

    pub fn max_rate(&self) -> i32 {
        self.max_rate
    }

    /// Number of populated buckets, extrapolation buckets included.
    pub fn populated(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
            + usize::from(self.below.is_some())
            + usize::from(self.above.is_some())
    }

    pub fn clear(&mut self) {
        self.buckets.fill(None);
        self.below = None;
        self.above = None;
    }

    fn clamp_index(&self, i: i64) -> usize {
        i.clamp(0, i64::from(2 * self.n)) as usize
    }

    pub fn set_overshoot(&mut self, rate: i32, overshoot: i32) {
        if rate == 0 {
            return;
        }
        if rate.abs() > self.max_rate {
            let edge = self.max_rate * rate.signum();
            let sample = Sample {
                rate: edge,
                overshoot: Sample { rate, overshoot }
                    .scaled_to(edge)
                    .map_or(overshoot, |v| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32),
            };
            let slot = if rate > 0 { &mut self.above } else { &mut self.below };
            Sample::merge(slot, sample);
            return;
        }
        let q = (rate.abs() + self.step / 2) / self.step * rate.signum();
        let i = self.clamp_index(i64::from(self.n + q));
        Sample::merge(&mut self.buckets[i], Sample { rate, overshoot });
    }

    pub fn predict(&self, rate: i32) -> i32 {
        if rate == 0 {
            return 0;
        }
        let r = i64::from(rate);
        let step = i64::from(self.step);
        let n = i64::from(self.n);
        let floor = self.clamp_index(n + r.div_euclid(step));
        let ceil = self.clamp_index(n - (-r).div_euclid(step));

        let lower = self.buckets[..=floor]
            .iter()
            .rev()
            .flatten()
            .chain(self.below.iter())
            .find_map(|s| s.scaled_to(rate));
        let upper = self.buckets[ceil..]
            .iter()
            .flatten()
            .chain(self.above.iter())
            .find_map(|s| s.scaled_to(rate));

        let v = match (lower, upper) {
            (Some(a), Some(b)) => (a + b) / 2,
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => 0,
        };
        v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

impl Default for OvershootModel {
    fn default() -> Self {
        Self::from_config(&OvershootCfg::default())
    }
}
