//! The descriptor-event reactor.
//!
//! A reactor owns a subscription table (a parallel pair of "which callback"
//! and "which kernel readiness slot" vectors) and drives a single dedicated
//! OS thread that repeatedly calls `poll(2)` over that table and dispatches
//! fired slots into user callbacks. The callback's return value
//! (`DescriptorStatus::Open`/`Close`) is the sole authority on whether its
//! subscription survives into the next round.
//!
//! Readiness is level-triggered and one-shot per subscription: a callback
//! that wants to keep watching a descriptor must return `Open`; the reactor
//! never coalesces or re-arms on its own.
//!
//! Subscriptions registered while the loop thread is blocked inside
//! `poll(2)` would otherwise not be observed until the in-flight call
//! returns. To avoid that, every reactor owns a private self-pipe that is
//! itself a permanent entry in the table: `subscribe`, `unsubscribe` and
//! `stop_event_loop` each write one byte to it, which wakes the blocked
//! `poll(2)` immediately so the loop can reload its table.
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use gettid::gettid;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::error::Error;

/// An opaque, kernel-assigned POSIX file descriptor. Not owned by the core.
pub type Descriptor = RawFd;

/// Block `poll(2)` indefinitely until an event arrives.
pub const BLOCK_INDEFINITELY: i32 = -1;
/// Poll once and return immediately.
pub const POLL_NOW: i32 = 0;

/// Which readiness a subscription is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Read,
    Write,
}

impl Event {
    fn mask(self) -> i16 {
        match self {
            Event::Read => libc::POLLRDNORM as i16,
            Event::Write => libc::POLLWRNORM as i16,
        }
    }
}

/// Returned by a handler to say whether its subscription should persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorStatus {
    Open,
    Close,
}

/// A user callback bound to `(descriptor, event)`. Invoked on the reactor
/// thread; handlers must not call back into `subscribe`/`unsubscribe`
/// synchronously from within this invocation (see module docs).
pub type Callback = Arc<dyn Fn(Descriptor) -> DescriptorStatus + Send + Sync + 'static>;

struct Subscription {
    fd: Descriptor,
    callback: Callback,
}

/// Construction-time options for a `Reactor`.
#[derive(Debug, Clone, Copy)]
pub struct ReactorConfig {
    /// If true, every tracked descriptor (excluding the reactor's private
    /// self-pipe, which is always closed) is closed when the `Reactor` is
    /// dropped. Default `false`: this is a library that does not open these
    /// descriptors, so it does not close them unless asked to.
    pub close_on_teardown: bool,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            close_on_teardown: false,
        }
    }
}

struct Table {
    subs: Vec<Subscription>,
    slots: Vec<libc::pollfd>,
}

impl Table {
    fn new() -> Self {
        Self {
            subs: Vec::new(),
            slots: Vec::new(),
        }
    }

    fn push(&mut self, fd: Descriptor, events: i16, callback: Callback) {
        self.subs.push(Subscription { fd, callback });
        self.slots.push(libc::pollfd {
            fd,
            events,
            revents: 0,
        });
    }

    fn remove_fd(&mut self, fd: Descriptor) {
        let mut i = 0;
        while i < self.subs.len() {
            if self.subs[i].fd == fd {
                self.subs.remove(i);
                self.slots.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn snapshot(&self) -> (Vec<libc::pollfd>, Vec<Callback>) {
        let slots = self.slots.clone();
        let callbacks = self.subs.iter().map(|s| Arc::clone(&s.callback)).collect();
        (slots, callbacks)
    }
}

/// Owns the subscription table and drives the polling loop. `event_loop`
/// must be called on exactly one thread; `subscribe`/`unsubscribe`/
/// `set_timeout`/`stop_event_loop` may be called from any thread.
pub struct Reactor {
    table: Mutex<Table>,
    stop: AtomicBool,
    timeout_ms: AtomicI32,
    wake_read: Descriptor,
    wake_write: Descriptor,
    config: ReactorConfig,
}

impl Reactor {
    pub fn new(config: ReactorConfig) -> Result<Self, Error> {
        let (wake_read, wake_write) =
            nix::unistd::pipe2(OFlag::O_NONBLOCK).map_err(|_| Error::PollFailed {
                source: Errno::last(),
            })?;

        let mut table = Table::new();
        table.push(
            wake_read,
            Event::Read.mask(),
            Arc::new(move |_fd| {
                drain_wake_pipe(wake_read);
                DescriptorStatus::Open
            }),
        );

        Ok(Self {
            table: Mutex::new(table),
            stop: AtomicBool::new(false),
            timeout_ms: AtomicI32::new(BLOCK_INDEFINITELY),
            wake_read,
            wake_write,
            config,
        })
    }

    /// Appends a new subscription and matching poll slot. The same `fd` may
    /// be subscribed more than once; every matching entry fires
    /// independently.
    pub fn subscribe(&self, fd: Descriptor, event: Event, callback: Callback) -> Result<(), Error> {
        if fd < 0 {
            return Err(Error::InvalidDescriptor { fd });
        }
        {
            let mut table = self.table.lock();
            table.push(fd, event.mask(), callback);
        }
        trace!(fd, ?event, "subscribed");
        self.wake();
        Ok(())
    }

    /// Removes every subscription whose descriptor equals `fd`.
    pub fn unsubscribe(&self, fd: Descriptor) -> Result<(), Error> {
        if fd < 0 {
            return Err(Error::InvalidDescriptor { fd });
        }
        {
            let mut table = self.table.lock();
            table.remove_fd(fd);
        }
        trace!(fd, "unsubscribed");
        self.wake();
        Ok(())
    }

    /// Sets the per-round `poll(2)` timeout, in milliseconds. Negative
    /// blocks indefinitely, zero polls and returns immediately, positive
    /// waits at most that long.
    pub fn set_timeout(&self, timeout_ms: i32) {
        self.timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    /// Requests termination. Idempotent. The loop performs at most one more
    /// poll round before exiting.
    pub fn stop_event_loop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake();
    }

    /// Runs the polling loop until `stop_event_loop` is called. Must be
    /// called on exactly one thread.
    pub fn event_loop(&self) -> Result<(), Error> {
        debug!(tid = gettid(), "starting reactor event loop");
        loop {
            if self.stop.load(Ordering::Acquire) {
                debug!("reactor stop requested; exiting event loop");
                return Ok(());
            }

            let (mut slots, callbacks) = {
                let table = self.table.lock();
                table.snapshot()
            };
            let timeout = self.timeout_ms.load(Ordering::Relaxed);

            let ready = loop {
                let rc = unsafe {
                    libc::poll(slots.as_mut_ptr(), slots.len() as libc::nfds_t, timeout)
                };
                if rc >= 0 {
                    break rc;
                }
                let errno = Errno::last();
                if errno == Errno::EINTR {
                    continue;
                }
                error!(%errno, "poll(2) failed; terminating reactor loop");
                return Err(Error::PollFailed { source: errno });
            };

            if ready == 0 {
                continue;
            }

            let mut remaining = ready;
            for (slot, callback) in slots.iter().zip(callbacks.iter()) {
                if remaining == 0 {
                    break;
                }
                if slot.revents == slot.events {
                    remaining -= 1;
                    if callback(slot.fd) == DescriptorStatus::Close {
                        // slot.fd was already validated non-negative by subscribe.
                        self.unsubscribe(slot.fd)
                            .expect("dispatch fd is always non-negative");
                    }
                }
            }
        }
    }

    fn wake(&self) {
        let byte = [1u8];
        match nix::unistd::write(self.wake_write, &byte) {
            Ok(_) => {}
            Err(nix::Error::Sys(Errno::EAGAIN)) => {
                // self-pipe already has a pending wakeup byte queued.
            }
            Err(e) => warn!(error = %e, "failed to write reactor self-pipe wakeup byte"),
        }
    }
}

fn drain_wake_pipe(fd: Descriptor) {
    let mut buf = [0u8; 256];
    loop {
        match nix::unistd::read(fd, &mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(nix::Error::Sys(Errno::EAGAIN)) => break,
            Err(e) => {
                warn!(error = %e, "failed to drain reactor self-pipe");
                break;
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if let Err(e) = nix::unistd::close(self.wake_read) {
            warn!(error = %e, "failed to close reactor self-pipe read end");
        }
        if let Err(e) = nix::unistd::close(self.wake_write) {
            warn!(error = %e, "failed to close reactor self-pipe write end");
        }

        if self.config.close_on_teardown {
            let table = self.table.lock();
            for sub in table.subs.iter() {
                if sub.fd == self.wake_read {
                    continue;
                }
                if let Err(e) = nix::unistd::close(sub.fd) {
                    warn!(fd = sub.fd, error = %e, "failed to close descriptor at reactor teardown");
                }
            }
        }
    }
}
