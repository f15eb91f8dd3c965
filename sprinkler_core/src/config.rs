//! Runtime configuration of the sprinkler head.
//!
//! These are the structs the controllers read. They are separate from the
//! TOML-deserialized config in `sprinkler_config`; see `conversions`.

/// Nozzle angle seek.
#[derive(Debug, Clone)]
pub struct RotationCfg {
    /// Half-width of the acceptance window, in angle counts.
    pub epsilon: i32,
    /// Coast distance in counts after stopping from 100 % duty.
    pub inertia_full_duty: i32,
    pub default_duty: u8,
}

impl Default for RotationCfg {
    fn default() -> Self {
        Self {
            epsilon: 3,
            inertia_full_duty: 30,
            default_duty: 100,
        }
    }
}

/// Closed-loop pressure seek.
#[derive(Debug, Clone)]
pub struct PressureCfg {
    /// Targets this close (truncated units) are already reached.
    pub epsilon: i32,
    /// Pressure coast after stopping from 100 % duty.
    pub inertia: i32,
    /// Samples in the stall detector window; the slope uses half of it.
    pub trend_window: usize,
    pub default_duty: u8,
}

impl Default for PressureCfg {
    fn default() -> Self {
        Self {
            epsilon: 10,
            inertia: 50,
            trend_window: 16,
            default_duty: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValveCfg {
    /// Margin above ambient that counts as water pressure.
    pub water_pressure_threshold: i32,
    pub open_timeout_ms: u64,
    /// Width of the closed band in ms of motor travel; close-tight runs half of it.
    pub close_tight_ms: u64,
    pub close_on_exit: bool,
}

impl Default for ValveCfg {
    fn default() -> Self {
        Self {
            water_pressure_threshold: 10,
            open_timeout_ms: 3_000,
            close_tight_ms: 200,
            close_on_exit: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorCfg {
    pub stale_ms: u64,
    pub notify_interval_ms: u64,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            stale_ms: 50,
            notify_interval_ms: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OvershootCfg {
    /// Buckets on each side of zero.
    pub buckets: usize,
    pub max_rate: i32,
}

impl Default for OvershootCfg {
    fn default() -> Self {
        Self {
            buckets: 20,
            max_rate: 1000,
        }
    }
}

/// Continuous pressure hold.
#[derive(Debug, Clone)]
pub struct HoldCfg {
    pub tolerance: i32,
    pub min_samples: u32,
}

impl Default for HoldCfg {
    fn default() -> Self {
        Self {
            tolerance: 20,
            min_samples: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    pub settle_ms: u64,
    pub pre_run_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            settle_ms: 300,
            pre_run_ms: 50,
        }
    }
}

/// Everything a [`SprinklerHead`](crate::controller::SprinklerHead) is tuned by.
#[derive(Debug, Clone, Default)]
pub struct HeadConfig {
    pub rotation: RotationCfg,
    pub pressure: PressureCfg,
    pub valve: ValveCfg,
    pub sensors: SensorCfg,
    pub overshoot: OvershootCfg,
    pub hold: HoldCfg,
    pub calibration: CalibrationCfg,
}
