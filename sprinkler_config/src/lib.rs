#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration-table persistence for the sprinkler head.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and per-curve sample ordering;
//!   the saver writes the same format back.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Bus {
    /// Linux I²C bus number (`/dev/i2c-N`).
    pub i2c_bus: u8,
}

impl Default for Bus {
    fn default() -> Self {
        Self { i2c_bus: 1 }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub nozzle_pwm_channel: u8,
    pub nozzle_dir: u8,
    pub valve_pwm_channel: u8,
    pub valve_dir: u8,
    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency_hz: f64,
}

fn default_pwm_frequency() -> f64 {
    10_000.0
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rotation {
    /// Acceptance window half-width in angle counts.
    pub epsilon: u16,
    /// Coast distance in counts when stopping from 100 % duty.
    pub inertia_full_duty: u16,
    pub default_duty: u8,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            epsilon: 3,
            inertia_full_duty: 30,
            default_duty: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pressure {
    /// Targets within this many (truncated) units count as reached.
    pub epsilon: i32,
    /// Stop this far before the target to absorb valve coast.
    pub inertia: i32,
    /// Samples kept for the stall/trend detector.
    pub trend_window: usize,
    pub default_duty: u8,
}

impl Default for Pressure {
    fn default() -> Self {
        Self {
            epsilon: 10,
            inertia: 50,
            trend_window: 16,
            default_duty: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Valve {
    /// Water counts as present once pressure exceeds ambient by this much.
    pub water_pressure_threshold: i32,
    pub open_timeout_ms: u64,
    /// Extra closing run after the pressure has gone; halved when closing tight.
    pub close_tight_ms: u64,
    /// Close the valve when the head is dropped.
    pub close_on_exit: bool,
}

impl Default for Valve {
    fn default() -> Self {
        Self {
            water_pressure_threshold: 10,
            open_timeout_ms: 3_000,
            close_tight_ms: 200,
            close_on_exit: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sensors {
    /// Readings older than this are considered stale.
    pub stale_ms: u64,
    /// Delay between iterations of a continuous notification.
    pub notify_interval_ms: u64,
}

impl Default for Sensors {
    fn default() -> Self {
        Self {
            stale_ms: 50,
            notify_interval_ms: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Overshoot {
    /// Buckets per side of zero.
    pub buckets: usize,
    /// Largest rate covered by the bucket grid; beyond it the model extrapolates.
    pub max_rate: i32,
}

impl Default for Overshoot {
    fn default() -> Self {
        Self {
            buckets: 20,
            max_rate: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hold {
    /// Deviation from target that restarts the valve motor.
    pub tolerance: i32,
    /// Samples after motor start before the threshold is evaluated.
    pub min_samples: u32,
}

impl Default for Hold {
    fn default() -> Self {
        Self {
            tolerance: 20,
            min_samples: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// CSV with learned tables (`curve,x,y`); loaded at startup when present.
    pub file: Option<String>,
    /// Wait after each calibration move before reading the sensor (ms).
    pub settle_ms: u64,
    /// Short run before each sweep to take up gear backlash (ms).
    pub pre_run_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            file: None,
            settle_ms: 300,
            pre_run_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bus: Bus,
    pub pins: Pins,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub pressure: Pressure,
    #[serde(default)]
    pub valve: Valve,
    #[serde(default)]
    pub sensors: Sensors,
    #[serde(default)]
    pub overshoot: Overshoot,
    #[serde(default)]
    pub hold: Hold,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.nozzle_pwm_channel > 1 || self.pins.valve_pwm_channel > 1 {
            eyre::bail!("pins.*_pwm_channel must be 0 or 1");
        }
        if self.pins.nozzle_pwm_channel == self.pins.valve_pwm_channel {
            eyre::bail!("pins.nozzle_pwm_channel and pins.valve_pwm_channel must differ");
        }
        if self.pins.nozzle_dir == self.pins.valve_dir {
            eyre::bail!("pins.nozzle_dir and pins.valve_dir must differ");
        }
        if !(self.pins.pwm_frequency_hz > 0.0 && self.pins.pwm_frequency_hz <= 100_000.0) {
            eyre::bail!("pins.pwm_frequency_hz must be in (0, 100000]");
        }

        // Rotation
        if self.rotation.epsilon == 0 {
            eyre::bail!("rotation.epsilon must be >= 1");
        }
        if self.rotation.epsilon >= 2048 || self.rotation.inertia_full_duty >= 2048 {
            eyre::bail!("rotation.epsilon and rotation.inertia_full_duty must be < 2048");
        }
        if self.rotation.default_duty == 0 || self.rotation.default_duty > 100 {
            eyre::bail!("rotation.default_duty must be in [1, 100]");
        }

        // Pressure
        if self.pressure.epsilon <= 0 {
            eyre::bail!("pressure.epsilon must be > 0");
        }
        if self.pressure.inertia < 0 {
            eyre::bail!("pressure.inertia must be >= 0");
        }
        if self.pressure.trend_window < 2 {
            eyre::bail!("pressure.trend_window must be >= 2");
        }
        if self.pressure.default_duty == 0 || self.pressure.default_duty > 100 {
            eyre::bail!("pressure.default_duty must be in [1, 100]");
        }

        // Valve
        if self.valve.water_pressure_threshold < 0 {
            eyre::bail!("valve.water_pressure_threshold must be >= 0");
        }
        if self.valve.open_timeout_ms == 0 {
            eyre::bail!("valve.open_timeout_ms must be >= 1");
        }
        if self.valve.open_timeout_ms > 5 * 60 * 1000 {
            eyre::bail!("valve.open_timeout_ms is unreasonably large (>5min)");
        }

        // Sensors
        if self.sensors.stale_ms == 0 {
            eyre::bail!("sensors.stale_ms must be >= 1");
        }

        // Overshoot
        if self.overshoot.buckets == 0 {
            eyre::bail!("overshoot.buckets must be >= 1");
        }
        if self.overshoot.max_rate <= 0 {
            eyre::bail!("overshoot.max_rate must be > 0");
        }

        // Hold
        if self.hold.tolerance < 0 {
            eyre::bail!("hold.tolerance must be >= 0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}

/// Which learned curve a CSV row belongs to.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    /// Nozzle rotating toward increasing angle: distance (counts) → duration (µs).
    NozzleRight,
    /// Nozzle rotating toward decreasing angle: distance (counts) → duration (µs).
    NozzleLeft,
    /// Valve opening: pressure gain → duration (ms).
    Valve,
}

/// Calibration CSV schema.
///
/// Expected headers:
/// curve,x,y
///
/// Example:
/// curve,x,y
/// nozzle_right,12,5000
/// valve,180,60
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRow {
    pub curve: Curve,
    pub x: i64,
    pub y: i64,
}

/// Learned calibration tables, one `(x, y)` list per curve.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CalibrationTables {
    pub nozzle_right: Vec<(i64, i64)>,
    pub nozzle_left: Vec<(i64, i64)>,
    pub valve: Vec<(i64, i64)>,
}

impl CalibrationTables {
    pub fn is_empty(&self) -> bool {
        self.nozzle_right.is_empty() && self.nozzle_left.is_empty() && self.valve.is_empty()
    }

    fn curve_mut(&mut self, curve: Curve) -> &mut Vec<(i64, i64)> {
        match curve {
            Curve::NozzleRight => &mut self.nozzle_right,
            Curve::NozzleLeft => &mut self.nozzle_left,
            Curve::Valve => &mut self.valve,
        }
    }

    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        let mut seen: BTreeSet<(Curve, i64)> = BTreeSet::new();
        let mut out = Self::default();
        for (idx, row) in rows.into_iter().enumerate() {
            if !seen.insert((row.curve, row.x)) {
                eyre::bail!(
                    "calibration row {} repeats x={} for curve {:?}",
                    idx + 2,
                    row.x,
                    row.curve
                );
            }
            out.curve_mut(row.curve).push((row.x, row.y));
        }
        for c in [Curve::NozzleRight, Curve::NozzleLeft, Curve::Valve] {
            out.curve_mut(c).sort_unstable_by_key(|p| p.0);
        }
        Ok(out)
    }

    pub fn rows(&self) -> Vec<CalibrationRow> {
        let mut out = Vec::new();
        for (curve, pts) in [
            (Curve::NozzleRight, &self.nozzle_right),
            (Curve::NozzleLeft, &self.nozzle_left),
            (Curve::Valve, &self.valve),
        ] {
            out.extend(pts.iter().map(|&(x, y)| CalibrationRow { curve, x, y }));
        }
        out
    }
}

/// Parse calibration tables from any CSV source.
pub fn read_calibration_csv<R: std::io::Read>(src: R) -> eyre::Result<CalibrationTables> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(src);

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let expected = ["curve", "x", "y"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'curve,x,y', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    CalibrationTables::from_rows(rows)
}

pub fn load_calibration_csv(path: &Path) -> eyre::Result<CalibrationTables> {
    let f = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;
    read_calibration_csv(f).map_err(|e| eyre::eyre!("{:?}: {}", path, e))
}

pub fn save_calibration_csv(path: &Path, tables: &CalibrationTables) -> eyre::Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| eyre::eyre!("create calibration CSV {:?}: {}", path, e))?;
    let rows = tables.rows();
    if rows.is_empty() {
        wtr.write_record(["curve", "x", "y"])
            .map_err(|e| eyre::eyre!("write CSV headers {:?}: {}", path, e))?;
    }
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| eyre::eyre!("write CSV row {:?}: {}", path, e))?;
    }
    wtr.flush()
        .map_err(|e| eyre::eyre!("flush calibration CSV {:?}: {}", path, e))?;
    Ok(())
}
