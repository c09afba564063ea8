//! ptyshim: host a program on a pseudo-terminal and relay it over stdio.
//!
//! The caller talks to the hosted program through a fixed descriptor contract:
//! bytes on fd 0 go to the program, program output comes back on fd 1, and an
//! optional fd 3 carries `"<cols>x<rows>"` resize lines. The adapter exits with
//! the program's own exit code (`128 + n` when it was killed by signal `n`).

pub mod config;
pub mod error;
#[cfg(unix)]
pub mod event_loop;
#[cfg(unix)]
pub mod exit_status;
#[cfg(unix)]
pub mod pty_session;
#[cfg(unix)]
pub mod relay;
#[cfg(unix)]
pub mod resize;
mod telemetry;

#[cfg(all(test, unix))]
mod test_support;

pub use config::AppConfig;
pub use error::AdapterError;
pub use telemetry::{init_tracing, tracing_log_path};

#[cfg(unix)]
pub use unix::{probe_control_fd, run};

#[cfg(unix)]
mod unix {
    use crate::config::AppConfig;
    use crate::event_loop::EventLoop;
    use crate::exit_status::wait_for_exit_code;
    use crate::pty_session::{fd_is_open, set_cloexec, PtySession};
    use crate::relay::Pump;
    use crate::resize::{ResizeControl, CONTROL_FD};
    use anyhow::Result;
    use std::os::unix::io::RawFd;

    /// Check for the optional resize channel and keep it out of the hosted program.
    ///
    /// Call before creating any descriptor of our own, or fd 3 may already be
    /// taken by something that is not the caller's control pipe.
    #[must_use]
    pub fn probe_control_fd() -> Option<RawFd> {
        if !fd_is_open(CONTROL_FD) {
            return None;
        }
        if let Err(err) = set_cloexec(CONTROL_FD) {
            tracing::warn!("could not mark control fd close-on-exec: {err:#}");
        }
        Some(CONTROL_FD)
    }

    /// Spawn the configured program, relay until its pty closes, and return its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing program, spawn failures, fatal relay I/O
    /// errors, undecodable control input, or a failed wait on the child.
    pub fn run(config: &AppConfig, control_fd: Option<RawFd>) -> Result<i32> {
        let (program, argv) = config.program_and_args()?;
        let session = PtySession::spawn(program, argv)?;

        {
            let mut event_loop = EventLoop::new();
            event_loop.register(
                session.master_fd(),
                Pump::pty_to_output(&session, libc::STDOUT_FILENO),
            );
            event_loop.register(
                libc::STDIN_FILENO,
                Pump::input_to_pty(libc::STDIN_FILENO, &session),
            );
            if let Some(fd) = control_fd {
                event_loop.register(fd, ResizeControl::new(fd, &session));
            } else {
                tracing::debug!("no control channel; resize disabled");
            }
            event_loop.run()?;
        }

        let code = wait_for_exit_code(session.child_pid())?;
        drop(session);
        Ok(code)
    }
}

/// Platforms without pty/fork support fail before doing anything else.
///
/// # Errors
///
/// Always returns [`AdapterError::UnsupportedPlatform`].
#[cfg(not(unix))]
pub fn run(_config: &AppConfig, _control_fd: Option<i32>) -> anyhow::Result<i32> {
    Err(AdapterError::UnsupportedPlatform(std::env::consts::OS).into())
}

#[cfg(not(unix))]
#[must_use]
pub fn probe_control_fd() -> Option<i32> {
    None
}
