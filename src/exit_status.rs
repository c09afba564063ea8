//! Child reaping and the wait-status → exit-code convention the adapter exits with.

use anyhow::{anyhow, Result};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Offset added to a terminating signal number, as shells report it.
const SIGNAL_EXIT_BASE: i32 = 128;

/// Convert a wait status into a single exit code: `exit(n)` ⇒ `n`, signal `s` ⇒ `128 + s`.
///
/// # Errors
///
/// Returns an error for statuses that describe neither an exit nor a terminating signal.
pub fn exit_code_from_status(status: ExitStatus) -> Result<i32> {
    if let Some(code) = status.code() {
        return Ok(code);
    }
    if let Some(signal) = status.signal() {
        return Ok(SIGNAL_EXIT_BASE + signal);
    }
    Err(anyhow!("child did not terminate: {status:?}"))
}

/// Block until `child_pid` has fully terminated and translate its status.
///
/// # Errors
///
/// Returns an error if `waitpid` fails (for example the pid is not our child).
pub fn wait_for_exit_code(child_pid: i32) -> Result<i32> {
    let mut status = 0;
    loop {
        // SAFETY: status is a live stack local; waitpid blocks on one specific child.
        let ret = unsafe { libc::waitpid(child_pid, &mut status, 0) };
        if ret == child_pid {
            break;
        }
        let err = io::Error::last_os_error();
        if ret < 0 && err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(anyhow!("waitpid({child_pid}) failed: {err}"));
    }
    let code = exit_code_from_status(ExitStatus::from_raw(status))?;
    tracing::debug!(child_pid, code, "child terminated");
    Ok(code)
}
