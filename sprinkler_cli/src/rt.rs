//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall; macOS mlockall).
//!
//! Everything here is best effort: a failed step is logged and the run goes on
//! with normal scheduling.

use crate::cli::RtLock;

#[derive(Debug, Clone, Copy)]
pub struct RtOptions {
    pub prio: Option<i32>,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

#[cfg(unix)]
fn mem_lock(lock: RtLock) -> std::io::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};
    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => MCL_CURRENT,
        RtLock::All => MCL_CURRENT | MCL_FUTURE,
    };
    let rc = unsafe { mlockall(flags) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn memlock_limit_hint() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    if cur == libc::RLIM_INFINITY {
        Some("memlock limit: unlimited".to_string())
    } else {
        Some(format!("memlock limit: {} KiB", cur / 1024))
    }
}

#[cfg(target_os = "linux")]
fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};
    let (min, max) = unsafe { (sched_get_priority_min(SCHED_FIFO), sched_get_priority_max(SCHED_FIFO)) };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let prio = prio.unwrap_or(max).clamp(min, max);
    let param = sched_param {
        sched_priority: prio,
    };
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        eyre::bail!("sched_setscheduler(SCHED_FIFO, {prio}): {err}; needs CAP_SYS_NICE or root");
    }
    Ok(prio)
}

#[cfg(target_os = "linux")]
fn pin_cpu(cpu: usize) -> eyre::Result<()> {
    let bits = std::mem::size_of::<libc::cpu_set_t>() * 8;
    if cpu >= bits {
        eyre::bail!("CPU {cpu} exceeds cpu_set_t capacity {bits}");
    }
    let size = std::mem::size_of::<libc::cpu_set_t>();
    let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::sched_getaffinity(0, size, &mut allowed) };
    if rc != 0 {
        eyre::bail!("sched_getaffinity: {}", std::io::Error::last_os_error());
    }
    if !unsafe { libc::CPU_ISSET(cpu, &allowed) } {
        eyre::bail!("CPU {cpu} not permitted by current affinity mask");
    }
    let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::CPU_ZERO(&mut desired);
        libc::CPU_SET(cpu, &mut desired);
    }
    let rc = unsafe { libc::sched_setaffinity(0, size, &desired) };
    if rc != 0 {
        eyre::bail!("sched_setaffinity: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

/// Apply real-time settings once per process.
pub fn setup_rt_once(opts: RtOptions) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        #[cfg(unix)]
        match mem_lock(opts.lock) {
            Ok(()) => tracing::info!(lock = ?opts.lock, "rt: memory locked"),
            Err(e) => {
                #[cfg(target_os = "linux")]
                let hint = memlock_limit_hint().unwrap_or_default();
                #[cfg(not(target_os = "linux"))]
                let hint = String::new();
                tracing::warn!(error = %e, %hint, "rt: mlockall failed; needs CAP_IPC_LOCK and enough 'ulimit -l'");
            }
        }

        #[cfg(target_os = "linux")]
        {
            match fifo_priority(opts.prio) {
                Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO"),
                Err(e) => tracing::warn!(error = %e, "rt: priority not applied"),
            }
            let cpu = opts.cpu.unwrap_or(0);
            match pin_cpu(cpu) {
                Ok(()) => tracing::info!(cpu, "rt: pinned"),
                Err(e) => tracing::warn!(error = %e, "rt: affinity not applied"),
            }
        }

        #[cfg(not(target_os = "linux"))]
        tracing::warn!(
            prio = ?opts.prio,
            cpu = ?opts.cpu,
            "rt: SCHED_FIFO and affinity are Linux only; only mlockall applied"
        );
    });
}
