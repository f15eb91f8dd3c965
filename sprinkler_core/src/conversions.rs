//! `From` implementations bridging `sprinkler_config` types to `sprinkler_core` types.

use crate::calibration::CalibrationTables;
use crate::config::{
    CalibrationCfg, HeadConfig, HoldCfg, OvershootCfg, PressureCfg, RotationCfg, SensorCfg,
    ValveCfg,
};
use crate::interpolator::Interpolator;

// ── RotationCfg ──────────────────────────────────────────────────────────────

impl From<&sprinkler_config::Rotation> for RotationCfg {
    fn from(c: &sprinkler_config::Rotation) -> Self {
        Self {
            epsilon: i32::from(c.epsilon),
            inertia_full_duty: i32::from(c.inertia_full_duty),
            default_duty: c.default_duty,
        }
    }
}

// ── PressureCfg ──────────────────────────────────────────────────────────────

impl From<&sprinkler_config::Pressure> for PressureCfg {
    fn from(c: &sprinkler_config::Pressure) -> Self {
        Self {
            epsilon: c.epsilon,
            inertia: c.inertia,
            trend_window: c.trend_window,
            default_duty: c.default_duty,
        }
    }
}

// ── ValveCfg ─────────────────────────────────────────────────────────────────

impl From<&sprinkler_config::Valve> for ValveCfg {
    fn from(c: &sprinkler_config::Valve) -> Self {
        Self {
            water_pressure_threshold: c.water_pressure_threshold,
            open_timeout_ms: c.open_timeout_ms,
            close_tight_ms: c.close_tight_ms,
            close_on_exit: c.close_on_exit,
        }
    }
}

// ── SensorCfg / OvershootCfg / HoldCfg ───────────────────────────────────────

impl From<&sprinkler_config::Sensors> for SensorCfg {
    fn from(c: &sprinkler_config::Sensors) -> Self {
        Self {
            stale_ms: c.stale_ms,
            notify_interval_ms: c.notify_interval_ms,
        }
    }
}

impl From<&sprinkler_config::Overshoot> for OvershootCfg {
    fn from(c: &sprinkler_config::Overshoot) -> Self {
        Self {
            buckets: c.buckets,
            max_rate: c.max_rate,
        }
    }
}

impl From<&sprinkler_config::Hold> for HoldCfg {
    fn from(c: &sprinkler_config::Hold) -> Self {
        Self {
            tolerance: c.tolerance,
            min_samples: c.min_samples,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&sprinkler_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &sprinkler_config::CalibrationCfg) -> Self {
        Self {
            settle_ms: c.settle_ms,
            pre_run_ms: c.pre_run_ms,
        }
    }
}

// ── HeadConfig ───────────────────────────────────────────────────────────────

impl From<&sprinkler_config::Config> for HeadConfig {
    fn from(c: &sprinkler_config::Config) -> Self {
        Self {
            rotation: (&c.rotation).into(),
            pressure: (&c.pressure).into(),
            valve: (&c.valve).into(),
            sensors: (&c.sensors).into(),
            overshoot: (&c.overshoot).into(),
            hold: (&c.hold).into(),
            calibration: (&c.calibration).into(),
        }
    }
}

// ── Calibration tables ───────────────────────────────────────────────────────

impl From<&sprinkler_config::CalibrationTables> for CalibrationTables {
    fn from(t: &sprinkler_config::CalibrationTables) -> Self {
        Self {
            nozzle_right: Interpolator::new(t.nozzle_right.clone()),
            nozzle_left: Interpolator::new(t.nozzle_left.clone()),
            valve: Interpolator::new(t.valve.clone()),
        }
    }
}

impl From<&CalibrationTables> for sprinkler_config::CalibrationTables {
    fn from(t: &CalibrationTables) -> Self {
        Self {
            nozzle_right: t.nozzle_right.points().to_vec(),
            nozzle_left: t.nozzle_left.points().to_vec(),
            valve: t.valve.points().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_config_follows_toml() {
        let toml = r#"
[pins]
nozzle_pwm_channel = 0
nozzle_dir = 17
valve_pwm_channel = 1
valve_dir = 6

[rotation]
epsilon = 5

[hold]
tolerance = 35
"#;
        let cfg = sprinkler_config::load_toml(toml).unwrap();
        let head = HeadConfig::from(&cfg);
        assert_eq!(head.rotation.epsilon, 5);
        assert_eq!(head.rotation.inertia_full_duty, 30);
        assert_eq!(head.hold.tolerance, 35);
        assert_eq!(head.valve.open_timeout_ms, 3000);
    }

    #[test]
    fn calibration_tables_convert_both_ways() {
        let persisted = sprinkler_config::CalibrationTables {
            nozzle_right: vec![(10, 4000), (50, 12000)],
            nozzle_left: vec![],
            valve: vec![(0, 0), (300, 90)],
        };
        let core = CalibrationTables::from(&persisted);
        assert_eq!(core.nozzle_right.predict(30), 8000);
        let back = sprinkler_config::CalibrationTables::from(&core);
        assert_eq!(back, persisted);
    }
}
