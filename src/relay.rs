//! Unbuffered byte pumps between the pty master and the caller's stdin/stdout.
//!
//! Each direction is its own handler and moves at most one chunk per readiness
//! event. Writes block until the whole chunk is accepted, so a slow reader on
//! either side stalls the loop instead of growing a buffer.

use crate::event_loop::{LoopControl, ReadyHandler};
use crate::pty_session::{read_chunk, write_all, Chunk, PtySession, CHUNK_SIZE};
use anyhow::{Context, Result};
use std::os::unix::io::RawFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Shell output toward the caller. EOF or a read error ends the session.
    PtyToOutput,
    /// Caller input toward the shell. EOF only stops watching the input.
    InputToPty,
}

pub struct Pump {
    direction: Direction,
    source: RawFd,
    sink: RawFd,
    buffer: [u8; CHUNK_SIZE],
}

impl Pump {
    #[must_use]
    pub fn pty_to_output(session: &PtySession, output_fd: RawFd) -> Self {
        Self::new(Direction::PtyToOutput, session.master_fd(), output_fd)
    }

    #[must_use]
    pub fn input_to_pty(input_fd: RawFd, session: &PtySession) -> Self {
        Self::new(Direction::InputToPty, input_fd, session.master_fd())
    }

    fn new(direction: Direction, source: RawFd, sink: RawFd) -> Self {
        Self {
            direction,
            source,
            sink,
            buffer: [0u8; CHUNK_SIZE],
        }
    }

    fn read(&mut self) -> Result<Chunk> {
        match read_chunk(self.source, &mut self.buffer) {
            Ok(chunk) => Ok(chunk),
            Err(err) if self.direction == Direction::PtyToOutput => {
                // EIO once the slave side is gone; same as a clean close.
                tracing::debug!(fd = self.source, "pty read error treated as EOF: {err}");
                Ok(Chunk::Eof)
            }
            Err(err) => Err(err).with_context(|| format!("read from input fd {}", self.source)),
        }
    }
}

impl ReadyHandler for Pump {
    fn on_ready(&mut self, control: &mut LoopControl) -> Result<()> {
        match self.read()? {
            Chunk::Data(n) => {
                let data = self.buffer.get(..n).unwrap_or(&[]);
                write_all(self.sink, data).with_context(|| match self.direction {
                    Direction::PtyToOutput => "relay pty output",
                    Direction::InputToPty => "relay input to pty",
                })?;
            }
            Chunk::Eof => {
                control.deregister(self.source);
                match self.direction {
                    Direction::PtyToOutput => {
                        tracing::debug!(fd = self.source, "pty master closed");
                        control.stop();
                    }
                    Direction::InputToPty => {
                        tracing::debug!(fd = self.source, "input closed; session continues");
                    }
                }
            }
            Chunk::Pending => {}
        }
        Ok(())
    }
}
