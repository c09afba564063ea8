//! Raw descriptor reads and write-all loops shared by the relay pumps.

use anyhow::{anyhow, Result};
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

/// Largest slice moved per readiness event on any descriptor.
pub const CHUNK_SIZE: usize = 1024;

/// Result of one read attempt on a ready descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// `n` bytes were placed at the front of the buffer.
    Data(usize),
    /// The peer closed its end.
    Eof,
    /// Spurious readiness on a non-blocking descriptor; nothing to do yet.
    Pending,
}

pub(crate) fn should_retry_read_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted
}

/// Read once from `fd`, retrying only interrupted calls.
pub fn read_chunk(fd: RawFd, buffer: &mut [u8]) -> io::Result<Chunk> {
    loop {
        // SAFETY: buffer is a live, writable slice and read never writes past buffer.len().
        let n = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut libc::c_void, buffer.len()) };
        if n > 0 {
            return Ok(Chunk::Data(n as usize));
        }
        if n == 0 {
            return Ok(Chunk::Eof);
        }
        let err = io::Error::last_os_error();
        if should_retry_read_error(&err) {
            continue;
        }
        if err.kind() == ErrorKind::WouldBlock {
            return Ok(Chunk::Pending);
        }
        return Err(err);
    }
}

/// Attempt a single write without retry loops.
pub(crate) fn try_write(fd: RawFd, data: &[u8]) -> io::Result<usize> {
    if data.is_empty() {
        return Ok(0);
    }
    // SAFETY: data is a live slice and write only reads data.len() bytes from it.
    let written = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
    if written < 0 {
        return Err(io::Error::last_os_error());
    }
    if written == 0 {
        return Err(io::Error::new(ErrorKind::WriteZero, "write returned 0"));
    }
    Ok(written as usize)
}

/// Write the entire buffer, re-issuing short writes on the unwritten remainder.
pub fn write_all(fd: RawFd, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        let written = match try_write(fd, data) {
            Ok(written) => written,
            Err(err) => {
                if err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
                if err.kind() == ErrorKind::WriteZero {
                    return Err(anyhow!("write to fd {fd} returned 0"));
                }
                return Err(anyhow!("write to fd {fd} failed: {err}"));
            }
        };
        data = data.get(written..).unwrap_or(&[]);
    }
    Ok(())
}
