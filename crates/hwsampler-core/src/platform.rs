//! Platform helpers for the sampling worker.

/// Nice value the worker thread asks for when elevating its priority.
pub const WORKER_NICE: i32 = -10;

/// Set the nice value of the calling thread only.
///
/// On Linux each thread has its own nice value, so calling this from the
/// worker leaves the caller's threads untouched. Lowering the nice value
/// needs `CAP_SYS_NICE`; without it this returns the `EACCES`/`EPERM` error.
#[cfg(target_os = "linux")]
pub fn set_current_thread_nice(nice: i32) -> std::io::Result<()> {
    // SAFETY: gettid takes no arguments and cannot fail.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;
    // SAFETY: setpriority only reads its scalar arguments.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, nice) };
    if rc == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Per-thread priority is not isolated from the caller on this platform,
/// so the worker leaves scheduling alone.
#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_nice(_nice: i32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "per-thread priority is only supported on linux",
    ))
}

/// Current process id and thread name, for worker start-up logging.
pub fn worker_identity() -> (u32, String) {
    let name = std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string();
    (std::process::id(), name)
}
