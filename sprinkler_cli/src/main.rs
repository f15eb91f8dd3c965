#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `sprinkler`: operator CLI for the sprinkler head.

mod cli;
mod error_fmt;
mod ops;
mod rt;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use cli::{Cli, FILE_GUARD, JSON_MODE, RtLock};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use ops::RunCtx;

fn load_config(path: &Path) -> eyre::Result<sprinkler_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = sprinkler_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn init_tracing(json: bool, level: &str, logging: &sprinkler_config::Logging) -> eyre::Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    // Console logs go to stderr so stdout stays clean for results.
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {path:?} has no file name"))?;
            let rotation = match logging.rotation.as_deref() {
                Some("daily") => Rotation::DAILY,
                Some("hourly") => Rotation::HOURLY,
                _ => Rotation::NEVER,
            };
            let (writer, guard) =
                tracing_appender::non_blocking(RollingFileAppender::new(rotation, dir, name));
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}

fn run(cli: Cli, shutdown: Arc<AtomicBool>) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    init_tracing(cli.json, &level, &cfg.logging)?;

    if cli.rt {
        rt::setup_rt_once(rt::RtOptions {
            prio: cli.rt_prio,
            lock: cli.rt_lock.unwrap_or_else(RtLock::os_default),
            cpu: cli.rt_cpu,
        });
    }

    let calibration_path = cli
        .calibration
        .clone()
        .or_else(|| cfg.calibration.file.as_ref().map(PathBuf::from));
    if let Some(path) = cli.calibration.as_deref() {
        // An explicit file must parse even if the command never uses it.
        sprinkler_config::load_calibration_csv(path)?;
    }

    let ctx = RunCtx {
        cfg: &cfg,
        calibration_path,
        json: cli.json,
        shutdown,
    };
    tracing::debug!(cmd = ?cli.cmd, config = %cli.config.display(), "running");
    ops::run_command(&ctx, &cli.cmd)
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        eprintln!("Warning: Ctrl-C handler not installed: {e}");
    }

    if let Err(err) = run(cli, shutdown) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::debug!(error = ?err, "exiting with error");
        std::process::exit(exit_code_for_error(&err));
    }
}
