//! Resize control channel: `"<cols>x<rows>"` lines applied straight to the pty window size.

use crate::error::AdapterError;
use crate::event_loop::{LoopControl, ReadyHandler};
use crate::pty_session::{read_chunk, Chunk, PtySession, CHUNK_SIZE};
use crate::telemetry::content_logging_enabled;
use anyhow::{Context, Result};
use std::os::unix::io::RawFd;

/// Descriptor the caller may leave open to send resize lines.
pub const CONTROL_FD: RawFd = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeCommand {
    pub cols: u16,
    pub rows: u16,
}

impl ResizeCommand {
    /// Parse one control line. Anything but exactly one `'x'` between two integers is `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, 'x');
        let cols = parts.next()?;
        let rows = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            cols: cols.trim().parse().ok()?,
            rows: rows.trim().parse().ok()?,
        })
    }

    pub fn apply(&self, session: &PtySession) -> Result<()> {
        session.set_winsize(self.cols, self.rows)
    }
}

/// Decode one control chunk and parse its lines in order, skipping malformed ones.
///
/// # Errors
///
/// Returns [`AdapterError::ControlDecode`] if the chunk is not valid UTF-8.
pub fn parse_control_chunk(bytes: &[u8]) -> Result<Vec<ResizeCommand>, AdapterError> {
    let text = std::str::from_utf8(bytes).map_err(AdapterError::ControlDecode)?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let command = ResizeCommand::parse(line);
            if command.is_none() {
                if content_logging_enabled() {
                    tracing::trace!(line, "ignoring malformed resize line");
                } else {
                    tracing::trace!("ignoring malformed resize line");
                }
            }
            command
        })
        .collect())
}

/// Handler for the control descriptor; borrows the session whose window it resizes.
pub struct ResizeControl<'a> {
    fd: RawFd,
    session: &'a PtySession,
    buffer: [u8; CHUNK_SIZE],
}

impl<'a> ResizeControl<'a> {
    #[must_use]
    pub fn new(fd: RawFd, session: &'a PtySession) -> Self {
        Self {
            fd,
            session,
            buffer: [0u8; CHUNK_SIZE],
        }
    }
}

impl ReadyHandler for ResizeControl<'_> {
    fn on_ready(&mut self, control: &mut LoopControl) -> Result<()> {
        let n = match read_chunk(self.fd, &mut self.buffer)
            .with_context(|| format!("read from control fd {}", self.fd))?
        {
            Chunk::Data(n) => n,
            Chunk::Eof => {
                tracing::debug!(fd = self.fd, "control channel closed");
                control.deregister(self.fd);
                return Ok(());
            }
            Chunk::Pending => return Ok(()),
        };
        for command in parse_control_chunk(self.buffer.get(..n).unwrap_or(&[]))? {
            command.apply(self.session)?;
            tracing::debug!(cols = command.cols, rows = command.rows, "applied window size");
        }
        Ok(())
    }
}
