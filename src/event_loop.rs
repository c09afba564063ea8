//! Single-threaded readiness loop that multiplexes the pty master, stdin and the control channel.
//!
//! Each registered descriptor owns one handler. Every iteration blocks in `poll(2)`
//! until something is readable, then runs the ready handlers one at a time in
//! registration order. Handlers talk back to the loop only through [`LoopControl`].

use anyhow::{anyhow, Result};
use std::io;
use std::os::unix::io::RawFd;

/// Uniform "on-ready" capability implemented by every registered handler.
pub trait ReadyHandler {
    /// Called once per loop iteration in which the descriptor is readable, hung up or errored.
    ///
    /// # Errors
    ///
    /// Any error is fatal and ends [`EventLoop::run`].
    fn on_ready(&mut self, control: &mut LoopControl) -> Result<()>;
}

/// Loop state handed to handlers: the one-way running flag and pending deregistrations.
#[derive(Debug)]
pub struct LoopControl {
    running: bool,
    deregistered: Vec<RawFd>,
}

impl LoopControl {
    pub(crate) fn new() -> Self {
        Self {
            running: true,
            deregistered: Vec::new(),
        }
    }

    /// Stop polling `fd` after the current batch. The descriptor stays open.
    pub fn deregister(&mut self, fd: RawFd) {
        if !self.deregistered.contains(&fd) {
            self.deregistered.push(fd);
        }
    }

    /// End the loop after the current batch. There is no way back to running.
    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!("event loop stop requested");
        }
        self.running = false;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }
}

struct Registration<'a> {
    fd: RawFd,
    handler: Box<dyn ReadyHandler + 'a>,
}

pub struct EventLoop<'a> {
    registrations: Vec<Registration<'a>>,
    control: LoopControl,
}

impl<'a> EventLoop<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            control: LoopControl::new(),
        }
    }

    /// Watch `fd` for read readiness and dispatch to `handler`.
    ///
    /// Registering a descriptor twice replaces the earlier handler.
    pub fn register(&mut self, fd: RawFd, handler: impl ReadyHandler + 'a) {
        self.registrations.retain(|registration| registration.fd != fd);
        self.registrations.push(Registration {
            fd,
            handler: Box::new(handler),
        });
        tracing::debug!(fd, "registered descriptor");
    }

    #[must_use]
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.registrations
            .iter()
            .any(|registration| registration.fd == fd)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Poll and dispatch until a handler stops the loop or nothing is left to watch.
    ///
    /// # Errors
    ///
    /// Returns the first handler error, or a `poll` failure other than `EINTR`.
    pub fn run(&mut self) -> Result<()> {
        while self.control.is_running() {
            if self.registrations.is_empty() {
                tracing::debug!("no descriptors left to watch; leaving event loop");
                break;
            }
            self.run_once()?;
        }
        Ok(())
    }

    /// One blocking poll plus dispatch of every ready handler.
    pub(crate) fn run_once(&mut self) -> Result<()> {
        let ready = self.wait_ready()?;
        for index in ready {
            let Some(registration) = self.registrations.get_mut(index) else {
                continue;
            };
            registration.handler.on_ready(&mut self.control)?;
        }
        self.apply_deregistrations();
        Ok(())
    }

    /// Block until at least one registered descriptor is ready; return their indices.
    fn wait_ready(&self) -> Result<Vec<usize>> {
        let mut poll_fds: Vec<libc::pollfd> = self
            .registrations
            .iter()
            .map(|registration| libc::pollfd {
                fd: registration.fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        loop {
            // SAFETY: poll_fds is a live, correctly sized array of pollfd structs.
            let ret = unsafe {
                libc::poll(
                    poll_fds.as_mut_ptr(),
                    poll_fds.len() as libc::nfds_t,
                    -1,
                )
            };
            if ret >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(anyhow!("poll failed: {err}"));
        }
        Ok(poll_fds
            .iter()
            .enumerate()
            .filter(|(_, poll_fd)| poll_fd.revents != 0)
            .map(|(index, _)| index)
            .collect())
    }

    fn apply_deregistrations(&mut self) {
        if self.control.deregistered.is_empty() {
            return;
        }
        let removed = std::mem::take(&mut self.control.deregistered);
        self.registrations
            .retain(|registration| !removed.contains(&registration.fd));
        for fd in removed {
            tracing::debug!(fd, "deregistered descriptor");
        }
    }
}

impl Default for EventLoop<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty_session::{read_chunk, write_all, Chunk, CHUNK_SIZE};
    use crate::test_support::{close_fd, pipe};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every chunk it reads; on EOF either deregisters or stops the loop.
    struct Recorder {
        fd: RawFd,
        stop_on_eof: bool,
        seen: Rc<RefCell<Vec<u8>>>,
    }

    impl ReadyHandler for Recorder {
        fn on_ready(&mut self, control: &mut LoopControl) -> Result<()> {
            let mut buffer = [0u8; CHUNK_SIZE];
            match read_chunk(self.fd, &mut buffer)? {
                Chunk::Data(n) => self.seen.borrow_mut().extend_from_slice(&buffer[..n]),
                Chunk::Eof => {
                    control.deregister(self.fd);
                    if self.stop_on_eof {
                        control.stop();
                    }
                }
                Chunk::Pending => {}
            }
            Ok(())
        }
    }

    struct Failing;

    impl ReadyHandler for Failing {
        fn on_ready(&mut self, _control: &mut LoopControl) -> Result<()> {
            Err(anyhow!("handler failed"))
        }
    }

    fn recorder(fd: RawFd, stop_on_eof: bool) -> (Recorder, Rc<RefCell<Vec<u8>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (
            Recorder {
                fd,
                stop_on_eof,
                seen: Rc::clone(&seen),
            },
            seen,
        )
    }

    #[test]
    fn loop_control_stop_is_one_way() {
        let mut control = LoopControl::new();
        assert!(control.is_running());
        control.stop();
        control.stop();
        assert!(!control.is_running());
    }

    #[test]
    fn deregistering_a_side_channel_keeps_the_loop_running() {
        let (main_read, main_write) = pipe();
        let (side_read, side_write) = pipe();
        let (main_handler, main_seen) = recorder(main_read, true);
        let (side_handler, _) = recorder(side_read, false);

        let mut event_loop = EventLoop::new();
        event_loop.register(main_read, main_handler);
        event_loop.register(side_read, side_handler);

        close_fd(side_write);
        event_loop.run_once().expect("dispatch side EOF");
        assert!(event_loop.is_running());
        assert!(!event_loop.is_registered(side_read));
        assert!(event_loop.is_registered(main_read));

        write_all(main_write, b"still relaying").expect("write");
        event_loop.run_once().expect("dispatch main data");
        assert_eq!(main_seen.borrow().as_slice(), b"still relaying");

        close_fd(main_write);
        event_loop.run().expect("run to main EOF");
        assert!(!event_loop.is_running());
        close_fd(main_read);
        close_fd(side_read);
    }

    #[test]
    fn main_eof_stops_the_loop_while_others_stay_open() {
        let (main_read, main_write) = pipe();
        let (side_read, side_write) = pipe();
        let (main_handler, _) = recorder(main_read, true);
        let (side_handler, side_seen) = recorder(side_read, false);

        let mut event_loop = EventLoop::new();
        event_loop.register(main_read, main_handler);
        event_loop.register(side_read, side_handler);

        close_fd(main_write);
        event_loop.run().expect("run");
        assert!(!event_loop.is_running());
        assert!(event_loop.is_registered(side_read));
        assert!(side_seen.borrow().is_empty());

        close_fd(main_read);
        close_fd(side_read);
        close_fd(side_write);
    }

    #[test]
    fn ready_handlers_run_in_registration_order_within_a_batch() {
        let (first_read, first_write) = pipe();
        let (second_read, second_write) = pipe();
        let (first, first_seen) = recorder(first_read, false);
        let (second, second_seen) = recorder(second_read, false);

        let mut event_loop = EventLoop::new();
        event_loop.register(first_read, first);
        event_loop.register(second_read, second);

        write_all(first_write, b"one").expect("write");
        write_all(second_write, b"two").expect("write");
        event_loop.run_once().expect("dispatch");
        assert_eq!(first_seen.borrow().as_slice(), b"one");
        assert_eq!(second_seen.borrow().as_slice(), b"two");

        for fd in [first_read, first_write, second_read, second_write] {
            close_fd(fd);
        }
    }

    #[test]
    fn empty_registration_set_ends_the_loop() {
        let (read_fd, write_fd) = pipe();
        let (handler, _) = recorder(read_fd, false);
        let mut event_loop = EventLoop::new();
        event_loop.register(read_fd, handler);
        close_fd(write_fd);
        event_loop.run().expect("run");
        assert!(!event_loop.is_registered(read_fd));
        close_fd(read_fd);
    }

    #[test]
    fn handler_errors_end_the_loop() {
        let (read_fd, write_fd) = pipe();
        let mut event_loop = EventLoop::new();
        event_loop.register(read_fd, Failing);
        write_all(write_fd, b"x").expect("write");
        let err = event_loop.run().expect_err("handler error propagates");
        assert_eq!(err.to_string(), "handler failed");
        close_fd(read_fd);
        close_fd(write_fd);
    }

    #[test]
    fn re_registering_replaces_the_handler() {
        let (read_fd, write_fd) = pipe();
        let (first, first_seen) = recorder(read_fd, false);
        let (second, second_seen) = recorder(read_fd, false);
        let mut event_loop = EventLoop::new();
        event_loop.register(read_fd, first);
        event_loop.register(read_fd, second);
        write_all(write_fd, b"z").expect("write");
        event_loop.run_once().expect("dispatch");
        assert!(first_seen.borrow().is_empty());
        assert_eq!(second_seen.borrow().as_slice(), b"z");
        close_fd(read_fd);
        close_fd(write_fd);
    }
}
