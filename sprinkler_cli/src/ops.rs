//! Hardware assembly and command execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use eyre::WrapErr;
use serde_json::json;
use sprinkler_config::Config;
use sprinkler_core::sensor::{psi_from_value, value_from_psi};
use sprinkler_core::{
    CalibrationTables, Completion, HeadConfig, HwStatus, SprinklerError, SprinklerHead,
};

use crate::cli::Commands;

const POLL: Duration = Duration::from_millis(20);

/// Resolved command plus what it needs from the environment.
pub struct RunCtx<'a> {
    pub cfg: &'a Config,
    pub calibration_path: Option<PathBuf>,
    pub json: bool,
    pub shutdown: Arc<AtomicBool>,
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn build_head(cfg: &Config, head_cfg: HeadConfig, tables: CalibrationTables) -> eyre::Result<SprinklerHead> {
    use sprinkler_hardware::{PwmMotorPins, RppalI2cBus};
    let bus = RppalI2cBus::open(cfg.bus.i2c_bus).wrap_err("open i2c bus")?;
    let nozzle = PwmMotorPins::new(
        cfg.pins.nozzle_pwm_channel,
        cfg.pins.nozzle_dir,
        cfg.pins.pwm_frequency_hz,
    )
    .wrap_err("open nozzle motor pins")?;
    let valve = PwmMotorPins::new(
        cfg.pins.valve_pwm_channel,
        cfg.pins.valve_dir,
        cfg.pins.pwm_frequency_hz,
    )
    .wrap_err("open valve motor pins")?;
    SprinklerHead::builder()
        .with_bus(bus)
        .with_nozzle_motor(nozzle)
        .with_valve_motor(valve)
        .with_config(head_cfg)
        .with_calibration(tables)
        .build()
}

/// Simulator head. `SPRINKLER_SIM_*` variables shape the rig for tests.
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn build_head(_cfg: &Config, head_cfg: HeadConfig, tables: CalibrationTables) -> eyre::Result<SprinklerHead> {
    use sprinkler_hardware::SimRig;
    let rig = SimRig::new();
    if let Ok(v) = std::env::var("SPRINKLER_SIM_ANGLE")
        && let Ok(angle) = v.parse::<u16>()
    {
        rig.set_angle(angle);
    }
    if std::env::var("SPRINKLER_SIM_NO_SUPPLY").is_ok_and(|v| v == "1") {
        rig.set_supply(false);
    }
    if std::env::var("SPRINKLER_SIM_SENSOR_FAULT").is_ok_and(|v| v == "1") {
        rig.inject_integrity_fault(true);
    }
    tracing::debug!("using simulated sprinkler head");
    SprinklerHead::builder()
        .with_bus(rig.bus())
        .with_nozzle_motor(rig.nozzle_pins())
        .with_valve_motor(rig.valve_pins())
        .with_config(head_cfg)
        .with_calibration(tables)
        .build()
}

fn load_tables(path: Option<&Path>) -> eyre::Result<CalibrationTables> {
    let Some(path) = path else {
        return Ok(CalibrationTables::default());
    };
    if !path.exists() {
        tracing::warn!(?path, "calibration file not found; running uncalibrated");
        return Ok(CalibrationTables::default());
    }
    let persisted = sprinkler_config::load_calibration_csv(path)?;
    Ok(CalibrationTables::from(&persisted))
}

fn save_tables(head: &SprinklerHead, path: Option<&Path>) -> eyre::Result<()> {
    let Some(path) = path else {
        tracing::warn!("no calibration output path; tables not saved");
        return Ok(());
    };
    let persisted = sprinkler_config::CalibrationTables::from(&head.calibration());
    sprinkler_config::save_calibration_csv(path, &persisted)?;
    tracing::info!(?path, "calibration saved");
    Ok(())
}

/// Wait for `c`, giving up when Ctrl-C is pressed or `deadline` passes.
fn wait_interruptible(c: &Completion, shutdown: &AtomicBool, deadline: Option<Instant>) -> Option<HwStatus> {
    loop {
        if let Some(status) = c.wait_timeout(POLL) {
            return Some(status);
        }
        if shutdown.load(Ordering::Relaxed) || deadline.is_some_and(|d| Instant::now() >= d) {
            return None;
        }
    }
}

fn check(op: &'static str, status: HwStatus) -> eyre::Result<HwStatus> {
    status
        .into_result()
        .map(|()| status)
        .wrap_err_with(|| format!("{op} did not succeed"))
}

fn target_value(target: Option<i32>, psi: Option<f32>) -> eyre::Result<i32> {
    match (target, psi) {
        (Some(t), _) => Ok(t),
        (None, Some(p)) => Ok(value_from_psi(p)),
        (None, None) => Err(eyre::Report::new(SprinklerError::Config(
            "give --target or --psi".into(),
        ))),
    }
}

fn print_result(ctx: &RunCtx<'_>, head: &SprinklerHead, op: &str, status: HwStatus, started: Instant) {
    let angle = head.position();
    let pressure = head.pressure();
    if ctx.json {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64);
        let line = json!({
            "timestamp": timestamp,
            "op": op,
            "status": status.as_str(),
            "duration_ms": started.elapsed().as_millis() as u64,
            "angle": angle,
            "pressure": pressure,
            "psi": psi_from_value(pressure),
        });
        println!("{line}");
    } else {
        println!(
            "{op}: {status} (angle {angle}, pressure {pressure} = {:.2} psi, {} ms)",
            psi_from_value(pressure),
            started.elapsed().as_millis()
        );
    }
}

fn print_status(ctx: &RunCtx<'_>, head: &SprinklerHead) -> eyre::Result<()> {
    let angle = head.position_fetch();
    let pressure = head.pressure_fetch();
    let ambient = head.ambient_pressure();
    let water = head.is_water_pressure_present();
    let cal = head.calibration();
    if ctx.json {
        let line = json!({
            "angle": angle,
            "pressure": pressure,
            "psi": pressure.map(psi_from_value),
            "ambient": ambient,
            "water": water,
            "close_tight_ms": head.close_tight_ms(),
            "nozzle_calibrated": cal.is_nozzle_calibrated(),
            "valve_calibrated": cal.is_valve_calibrated(),
        });
        println!("{line}");
    } else {
        let show = |v: Option<i32>| v.map_or_else(|| "n/a".to_string(), |v| v.to_string());
        println!("angle:            {}", show(angle));
        println!(
            "pressure:         {} ({})",
            show(pressure),
            pressure.map_or_else(|| "n/a".to_string(), |p| format!("{:.2} psi", psi_from_value(p)))
        );
        println!("ambient:          {}", show(ambient));
        println!("water pressure:   {}", if water { "yes" } else { "no" });
        println!("close tight ms:   {}", head.close_tight_ms());
        println!(
            "calibrated:       nozzle={} valve={}",
            cal.is_nozzle_calibrated(),
            cal.is_valve_calibrated()
        );
    }
    if angle.is_none() || pressure.is_none() {
        return Err(eyre::Report::new(SprinklerError::Status(HwStatus::CommFailure)))
            .wrap_err("status read");
    }
    Ok(())
}

fn run_hold(ctx: &RunCtx<'_>, head: &SprinklerHead, target: i32, seconds: Option<u64>) -> eyre::Result<HwStatus> {
    check("open valve", head.open_valve()?)?;
    let hold = head.start_pressure_hold(target)?;
    tracing::info!(target, psi = psi_from_value(target), "holding; Ctrl-C to stop");
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let status = match wait_interruptible(&hold, &ctx.shutdown, deadline) {
        Some(status) => status,
        None => {
            head.stop_pressure_hold();
            hold.wait()
        }
    };
    // Stopping the hold on request is the normal way out.
    if status == HwStatus::Abort {
        return Ok(HwStatus::Success);
    }
    check("pressure hold", status)
}

/// Execute one CLI command against a freshly built head.
pub fn run_command(ctx: &RunCtx<'_>, cmd: &Commands) -> eyre::Result<()> {
    let head_cfg = HeadConfig::from(ctx.cfg);
    let tables = load_tables(ctx.calibration_path.as_deref())?;
    let head = build_head(ctx.cfg, head_cfg, tables)?;
    let defaults = head.config().clone();
    let started = Instant::now();

    let (op, status) = match cmd {
        Commands::Status => return print_status(ctx, &head),
        Commands::SelfCheck => {
            let angle = head.position_fetch();
            let pressure = head.pressure_fetch();
            tracing::info!(?angle, ?pressure, "self-check");
            if angle.is_none() || pressure.is_none() {
                return Err(eyre::Report::new(SprinklerError::Status(HwStatus::CommFailure)))
                    .wrap_err("self-check");
            }
            ("self-check", HwStatus::Success)
        }
        Commands::Rotate { to, duty, timed } => {
            let status = if *timed {
                let current = head
                    .position_fetch()
                    .ok_or_else(|| eyre::Report::new(SprinklerError::Status(HwStatus::CommFailure)))?;
                head.rotate_by_duration(sprinkler_core::sensor::shortest_diff(current, *to))?;
                HwStatus::Success
            } else {
                let c = head.rotate_to(*to, duty.unwrap_or(defaults.rotation.default_duty))?;
                wait_interruptible(&c, &ctx.shutdown, None).unwrap_or(HwStatus::Abort)
            };
            ("rotate", status)
        }
        Commands::RotateBy { by, duty, timed } => {
            let status = if *timed {
                head.rotate_by_duration(*by)?;
                HwStatus::Success
            } else {
                let c = head.rotate_by(*by, duty.unwrap_or(defaults.rotation.default_duty))?;
                wait_interruptible(&c, &ctx.shutdown, None).unwrap_or(HwStatus::Abort)
            };
            ("rotate-by", status)
        }
        Commands::Pressure {
            target,
            psi,
            duty,
            timed,
        } => {
            let target = target_value(*target, *psi)?;
            let status = if *timed {
                head.set_pressure_by_duration(target)?
            } else {
                let c = head.set_pressure(target, duty.unwrap_or(defaults.pressure.default_duty))?;
                wait_interruptible(&c, &ctx.shutdown, None).unwrap_or(HwStatus::Abort)
            };
            ("pressure", status)
        }
        Commands::OpenValve => ("open-valve", head.open_valve()?),
        Commands::CloseValve { tight } => ("close-valve", head.close_valve(*tight)?),
        Commands::Hold {
            target,
            psi,
            seconds,
        } => {
            let target = target_value(*target, *psi)?;
            ("hold", run_hold(ctx, &head, target, *seconds)?)
        }
        Commands::CalibrateNozzle {
            min_us,
            max_us,
            multiplier,
            out,
        } => {
            let status = head.calibrate_nozzle(*min_us, *max_us, *multiplier)?;
            if status.is_success() {
                save_tables(&head, out.as_deref().or(ctx.calibration_path.as_deref()))?;
            }
            ("calibrate-nozzle", status)
        }
        Commands::CalibrateValve { step_ms, out } => {
            let status = head.calibrate_valve(*step_ms)?;
            if status.is_success() {
                save_tables(&head, out.as_deref().or(ctx.calibration_path.as_deref()))?;
            }
            ("calibrate-valve", status)
        }
        Commands::FindCloseTight => {
            let status = head.find_close_tight_position()?;
            if status.is_success() {
                tracing::info!(close_tight_ms = head.close_tight_ms(), "set valve.close_tight_ms to keep it");
            }
            ("find-close-tight", status)
        }
    };

    print_result(ctx, &head, op, status, started);
    check(op, status).map(drop)
}
