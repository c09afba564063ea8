//! Descriptor fixtures for unit tests: pipes and real pty pairs.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

pub(crate) fn pipe() -> (RawFd, RawFd) {
    let mut fds = [-1; 2];
    // SAFETY: fds is a two-element array as pipe(2) requires.
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(ret, 0, "pipe failed: {}", io::Error::last_os_error());
    (fds[0], fds[1])
}

/// Returns `(master, slave)` of a fresh pty pair.
pub(crate) fn openpty_pair() -> (RawFd, RawFd) {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;
    // SAFETY: openpty writes only the two fd out-params; the optional pointers are null.
    let ret = unsafe {
        libc::openpty(
            &mut master_fd,
            &mut slave_fd,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    assert_eq!(ret, 0, "openpty failed: {}", io::Error::last_os_error());
    (master_fd, slave_fd)
}

pub(crate) fn close_fd(fd: RawFd) {
    if fd >= 0 {
        // SAFETY: tests only close descriptors they created.
        unsafe {
            libc::close(fd);
        }
    }
}

pub(crate) fn set_nonblocking(fd: RawFd) {
    // SAFETY: fcntl on a descriptor the test owns.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        assert!(flags >= 0);
        assert!(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) >= 0);
    }
}

/// Drain `fd` until EOF.
pub(crate) fn read_to_end(fd: RawFd) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buffer = [0u8; 4096];
    loop {
        // SAFETY: buffer is writable for its full length.
        let n = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut libc::c_void, buffer.len()) };
        if n > 0 {
            out.extend_from_slice(&buffer[..n as usize]);
            continue;
        }
        if n == 0 {
            return out;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        panic!("read_to_end failed: {err}");
    }
}
