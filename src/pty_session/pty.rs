//! PTY allocation and child spawn so the hosted program sees a real controlling terminal.

use crate::error::AdapterError;
use anyhow::{anyhow, Result};
use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

/// A child process running under a pseudo-terminal, plus the master side we drive.
///
/// The pid and master descriptor are produced together by [`PtySession::spawn`] and
/// owned together; dropping the session closes the master.
#[derive(Debug)]
pub struct PtySession {
    master_fd: RawFd,
    child_pid: i32,
}

impl PtySession {
    /// Allocate a pty and run `program` on it with `argv` passed verbatim.
    ///
    /// `argv[0]` is conventionally the program itself. The child inherits the
    /// environment and working directory; `execvp` performs the PATH lookup.
    /// A failed exec is not reported here: the child exits with status 1 and the
    /// caller sees the pty close like any other exit.
    ///
    /// # Errors
    ///
    /// Returns an error if an argument contains a NUL byte or if PTY allocation
    /// or fork fails.
    pub fn spawn(program: &str, argv: &[String]) -> Result<Self> {
        let program_cstr = to_cstring(program)?;
        let mut argv_cstr = Vec::with_capacity(argv.len().max(1));
        for arg in argv {
            argv_cstr.push(to_cstring(arg)?);
        }
        if argv_cstr.is_empty() {
            argv_cstr.push(program_cstr.clone());
        }

        // SAFETY: both inputs are valid CStrings; spawn_pty_child returns an owned master fd.
        let (master_fd, child_pid) = unsafe { spawn_pty_child(&program_cstr, &argv_cstr)? };
        tracing::debug!(child_pid, master_fd, program, "spawned program under pty");
        Ok(Self {
            master_fd,
            child_pid,
        })
    }

    #[must_use]
    pub fn master_fd(&self) -> RawFd {
        self.master_fd
    }

    #[must_use]
    pub fn child_pid(&self) -> i32 {
        self.child_pid
    }

    /// Update the pty window size; the kernel notifies the foreground process group.
    ///
    /// # Errors
    ///
    /// Returns an error if the window-size ioctl fails.
    pub fn set_winsize(&self, cols: u16, rows: u16) -> Result<()> {
        let ws = libc::winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: ioctl reads ws, which is initialized, and targets our master fd.
        let result = unsafe { libc::ioctl(self.master_fd, libc::TIOCSWINSZ, &ws) };
        if result != 0 {
            return Err(errno_error("ioctl(TIOCSWINSZ) failed"));
        }
        Ok(())
    }

    /// Query the current pty window size as `(cols, rows)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the window-size ioctl fails.
    pub fn current_winsize(&self) -> Result<(u16, u16)> {
        let mut ws = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: ioctl writes into ws, a live stack local.
        let result = unsafe { libc::ioctl(self.master_fd, libc::TIOCGWINSZ, &mut ws) };
        if result != 0 {
            return Err(errno_error("ioctl(TIOCGWINSZ) failed"));
        }
        Ok((ws.ws_col, ws.ws_row))
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        // SAFETY: master_fd is owned by this session and closed exactly once.
        unsafe { close_fd(self.master_fd) };
    }
}

#[cfg(test)]
pub(crate) fn test_pty_session(master_fd: RawFd, child_pid: i32) -> PtySession {
    PtySession {
        master_fd,
        child_pid,
    }
}

fn to_cstring(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| AdapterError::InvalidArgument(value.to_string()).into())
}

/// Open a pty pair and fork; the child execs `program` on the slave side.
///
/// # Safety
///
/// The caller must close the returned master fd. The child calls `_exit(1)` on
/// any setup failure so it never returns into Rust code after `fork()`.
unsafe fn spawn_pty_child(program: &CString, argv: &[CString]) -> Result<(RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;

    // SAFETY: openpty expects valid pointers for master/slave; name, termios and winsize are optional.
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        ptr::null_mut(),
    ) != 0
    {
        return Err(errno_error("openpty failed"));
    }

    if let Err(err) = set_cloexec(master_fd).and_then(|()| set_cloexec(slave_fd)) {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(err);
    }

    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());

    let pid = libc::fork();
    if pid < 0 {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(errno_error("fork failed"));
    }

    if pid == 0 {
        child_exec(master_fd, slave_fd, program, &argv_ptrs);
    }

    close_fd(slave_fd);
    Ok((master_fd, pid))
}

/// Child process setup after fork: make the slave our controlling terminal and exec.
///
/// # Safety
///
/// Must only be called in the child after `fork()`. Never returns: it either
/// replaces the process image or calls `_exit(1)`.
unsafe fn child_exec(
    master_fd: RawFd,
    slave_fd: RawFd,
    program: &CString,
    argv_ptrs: &[*const libc::c_char],
) -> ! {
    let fail = |context: &str| -> ! {
        let err = io::Error::last_os_error();
        let msg = format!("ptyshim: {context} failed: {err}\r\n");
        // SAFETY: write is async-signal-safe and stderr is a valid fd in the child.
        let _ = libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
        libc::_exit(1);
    };

    close_fd(master_fd);

    if libc::setsid() == -1 {
        fail("setsid");
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0) == -1 {
        fail("ioctl(TIOCSCTTY)");
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail("dup2");
    }
    if slave_fd > libc::STDERR_FILENO {
        close_fd(slave_fd);
    }

    // The Rust runtime ignores SIGPIPE; the hosted program expects the default.
    if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
        fail("signal(SIGPIPE)");
    }

    libc::execvp(program.as_ptr(), argv_ptrs.as_ptr());
    fail("execvp");
}

/// Mark a descriptor close-on-exec so it does not leak into the hosted program.
pub(crate) fn set_cloexec(fd: RawFd) -> Result<()> {
    if fd < 0 {
        return Ok(());
    }

    // SAFETY: fcntl only inspects and updates descriptor flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(errno_error("fcntl(F_GETFD) failed"));
    }
    // SAFETY: see above.
    let result = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if result < 0 {
        return Err(errno_error("fcntl(F_SETFD, FD_CLOEXEC) failed"));
    }
    Ok(())
}

/// Whether `fd` refers to an open descriptor in this process.
pub(crate) fn fd_is_open(fd: RawFd) -> bool {
    // SAFETY: F_GETFD has no side effects; EBADF just means the slot is empty.
    fd >= 0 && unsafe { libc::fcntl(fd, libc::F_GETFD) } != -1
}

/// Helper that formats OS errors with additional context.
pub(crate) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be owned by the caller (or -1 to ignore).
unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}
