//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "sprinkler", version, about = "Sprinkler head CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/sprinkler.toml")]
    pub config: PathBuf,

    /// Calibration CSV (strict `curve,x,y` header); overrides calibration.file
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Emit results and errors as JSON lines; logs go to stderr as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to logging.level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: locks memory, raises the process to SCHED_FIFO and pins it to one CPU so the bus worker sees less jitter. Needs CAP_SYS_NICE / CAP_IPC_LOCK or root; failures are logged as warnings and the run continues.\n\nmacOS: only mlockall is applied."
    )]
    pub rt: bool,

    /// SCHED_FIFO priority for --rt (Linux); defaults to the system maximum
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,

    /// Memory locking mode for --rt
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,

    /// CPU index to pin to with --rt (Linux); defaults to 0
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Current
        } else {
            Self::None
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print nozzle angle, line pressure and calibration state
    Status,
    /// Rotate the nozzle the shorter way to an absolute angle
    Rotate {
        /// Target angle in sensor counts (0..4096)
        #[arg(long, value_parser = clap::value_parser!(i32).range(0..4096))]
        to: i32,
        /// Motor duty in percent; defaults to rotation.default_duty
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        duty: Option<u8>,
        /// Use the calibrated duration table instead of the angle sensor loop
        #[arg(long, action = ArgAction::SetTrue)]
        timed: bool,
    },
    /// Rotate the nozzle by a signed number of counts (positive turns right)
    RotateBy {
        #[arg(long, allow_hyphen_values = true)]
        by: i32,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        duty: Option<u8>,
        #[arg(long, action = ArgAction::SetTrue)]
        timed: bool,
    },
    /// Drive the valve to a target pressure
    Pressure {
        /// Target in sensor units (12 noise bits dropped)
        #[arg(long, conflicts_with = "psi", required_unless_present = "psi")]
        target: Option<i32>,
        /// Target in psi
        #[arg(long)]
        psi: Option<f32>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        duty: Option<u8>,
        /// Use the calibrated duration table instead of the pressure loop
        #[arg(long, action = ArgAction::SetTrue)]
        timed: bool,
    },
    /// Open the valve until water pressure appears
    OpenValve,
    /// Close the valve
    CloseValve {
        /// Continue into the middle of the closed band
        #[arg(long, action = ArgAction::SetTrue)]
        tight: bool,
    },
    /// Open the valve and hold a pressure until Ctrl-C or --seconds elapse
    Hold {
        #[arg(long, conflicts_with = "psi", required_unless_present = "psi")]
        target: Option<i32>,
        #[arg(long)]
        psi: Option<f32>,
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        seconds: Option<u64>,
    },
    /// Sweep nozzle pulses and learn the distance/duration tables
    CalibrateNozzle {
        #[arg(long, default_value_t = 2_000)]
        min_us: u64,
        #[arg(long, default_value_t = 200_000)]
        max_us: u64,
        #[arg(long, default_value_t = 1.5)]
        multiplier: f64,
        /// Where to write the tables; defaults to --calibration, then calibration.file
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Step the valve open and learn the pressure/duration table
    CalibrateValve {
        #[arg(long, default_value_t = 20)]
        step_ms: u64,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Measure the closed band of the valve and park it in the middle
    FindCloseTight,
    /// Quick health check (both sensors answer)
    SelfCheck,
}
