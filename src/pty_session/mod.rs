//! Minimal PTY wrapper: spawn a program on a pseudo-terminal and move raw bytes on descriptors.

mod io;
mod pty;

pub use io::{read_chunk, write_all, Chunk, CHUNK_SIZE};
pub use pty::PtySession;

pub(crate) use pty::{fd_is_open, set_cloexec};

#[cfg(test)]
pub(crate) use pty::test_pty_session;
