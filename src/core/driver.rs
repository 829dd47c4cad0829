//! The public facade: binds a descriptor + event to a user handler whose
//! return value is delivered through a `Future`, offloading the handler
//! itself onto a `WorkerPool` so the reactor thread is never stalled by
//! handler code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::Error;
use super::oneshot::{Future, Promise};
use super::pool::WorkerPool;
use super::reactor::{BLOCK_INDEFINITELY, Descriptor, DescriptorStatus, Event, Reactor, ReactorConfig};

/// Construction-time options for a `Driver`.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Total logical thread budget; the driver reserves one for the reactor
    /// loop and gives the rest (at least one) to the worker pool.
    pub threads: usize,
    /// The reactor's per-round `poll(2)` timeout, in milliseconds.
    pub poll_timeout_ms: i32,
    /// Forwarded to `ReactorConfig::close_on_teardown`.
    pub close_on_teardown: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            poll_timeout_ms: BLOCK_INDEFINITELY,
            close_on_teardown: false,
        }
    }
}

/// Composes a `Reactor` and a `WorkerPool` into the public `read`/`write`
/// asynchronous operations.
pub struct Driver {
    reactor: Arc<Reactor>,
    pool: Arc<WorkerPool>,
    stopped: Arc<AtomicBool>,
    reactor_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Driver {
    /// Takes an owned `Reactor` and a thread count; internally builds a
    /// `WorkerPool` with `max(1, threads - 1)` threads, spawns the reactor
    /// loop on a dedicated thread, and returns immediately.
    pub fn new(reactor: Reactor, threads: usize) -> Self {
        let reactor = Arc::new(reactor);
        let pool_threads = threads.saturating_sub(1).max(1);
        let pool = Arc::new(WorkerPool::new(pool_threads));
        let stopped = Arc::new(AtomicBool::new(false));

        let loop_reactor = Arc::clone(&reactor);
        let reactor_thread = thread::Builder::new()
            .name("asyncio-reactor".into())
            .spawn(move || {
                if let Err(e) = loop_reactor.event_loop() {
                    warn!(error = %e, "reactor event loop terminated with an error");
                }
            })
            .expect("failed to spawn reactor thread");

        Self {
            reactor,
            pool,
            stopped,
            reactor_thread: Mutex::new(Some(reactor_thread)),
        }
    }

    /// Convenience constructor applying `config` to both a freshly created
    /// `Reactor` and this driver.
    pub fn with_config(config: DriverConfig) -> Result<Self, Error> {
        let reactor = Reactor::new(ReactorConfig {
            close_on_teardown: config.close_on_teardown,
        })?;
        reactor.set_timeout(config.poll_timeout_ms);
        Ok(Self::new(reactor, config.threads))
    }

    /// Registers `handler` to run on a worker thread the first time `fd`
    /// becomes readable, delivering its result through the returned
    /// `Future`. The subscription is one-shot.
    pub fn read<V, H>(&self, fd: Descriptor, handler: H) -> Result<Future<V>, Error>
    where
        V: Send + 'static,
        H: Fn(Descriptor) -> V + Send + Sync + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }

        let promise = Promise::new();
        let future = promise.future().expect("freshly created promise");
        let pool = Arc::clone(&self.pool);
        let state = Mutex::new(Some((promise, handler)));

        self.reactor.subscribe(
            fd,
            Event::Read,
            Arc::new(move |fd| {
                if let Some((promise, handler)) = state.lock().take() {
                    let pool = Arc::clone(&pool);
                    if pool
                        .submit(Box::new(move || {
                            let value = handler(fd);
                            if let Err(e) = promise.set(value) {
                                warn!(fd, error = %e, "failed to deliver read completion");
                            }
                        }))
                        .is_err()
                    {
                        warn!(fd, "failed to submit read completion task to worker pool");
                    }
                }
                DescriptorStatus::Close
            }),
        )?;

        Ok(future)
    }

    /// Registers `handler` to run on a worker thread the first time `fd`
    /// becomes writable. The handler's return value is discarded; callers
    /// who want the result use `read` on a writable event instead.
    pub fn write<V, H>(&self, fd: Descriptor, handler: H) -> Result<(), Error>
    where
        V: Send + 'static,
        H: Fn(Descriptor) -> V + Send + Sync + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }

        let pool = Arc::clone(&self.pool);
        let state = Mutex::new(Some(handler));

        self.reactor.subscribe(
            fd,
            Event::Write,
            Arc::new(move |fd| {
                if let Some(handler) = state.lock().take() {
                    let pool = Arc::clone(&pool);
                    if pool
                        .submit(Box::new(move || {
                            let _ = handler(fd);
                        }))
                        .is_err()
                    {
                        warn!(fd, "failed to submit write completion task to worker pool");
                    }
                }
                DescriptorStatus::Close
            }),
        )?;

        Ok(())
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        self.reactor.stop_event_loop();
        self.pool.join();
        if let Some(handle) = self.reactor_thread.lock().take() {
            debug!("joining reactor thread during driver teardown");
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Read;
    use std::os::unix::io::FromRawFd;
    use std::time::Duration;

    fn read_all(fd: Descriptor) -> Vec<u8> {
        let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
        let mut buf = Vec::new();
        let _ = file.read_to_end(&mut buf);
        std::mem::forget(file); // the pipe fd is owned by the test, not this File
        buf
    }

    fn new_driver() -> Driver {
        Driver::with_config(DriverConfig {
            threads: 3,
            poll_timeout_ms: 50,
            close_on_teardown: false,
        })
        .unwrap()
    }

    #[test]
    fn echo_one_via_read() {
        let driver = new_driver();
        let (r, w) = nix::unistd::pipe().unwrap();
        nix::unistd::write(w, b"abc").unwrap();

        let future = driver.read(r, |fd| read_all(fd)).unwrap();
        assert_eq!(future.get().unwrap(), b"abc".to_vec());

        let _ = nix::unistd::close(w);
    }

    #[test]
    fn concurrent_reads_resolve_independently() {
        let driver = new_driver();
        let (r1, w1) = nix::unistd::pipe().unwrap();
        let (r2, w2) = nix::unistd::pipe().unwrap();

        nix::unistd::write(w2, b"yz").unwrap();
        nix::unistd::write(w1, b"x").unwrap();

        let f1 = driver.read(r1, |fd| read_all(fd)).unwrap();
        let f2 = driver.read(r2, |fd| read_all(fd)).unwrap();

        assert_eq!(f2.get().unwrap(), b"yz".to_vec());
        assert_eq!(f1.get().unwrap(), b"x".to_vec());

        let _ = nix::unistd::close(w1);
        let _ = nix::unistd::close(w2);
    }

    #[test]
    fn read_after_stop_is_refused() {
        let driver = new_driver();
        driver.stopped.store(true, Ordering::Release);
        let (r, w) = nix::unistd::pipe().unwrap();
        assert_matches!(driver.read(r, |fd| read_all(fd)), Err(Error::Stopped));
        let _ = nix::unistd::close(r);
        let _ = nix::unistd::close(w);
    }

    #[test]
    fn write_demo_discards_result() {
        let driver = new_driver();
        let (r, w) = nix::unistd::pipe().unwrap();
        driver.write(w, |fd| nix::unistd::write(fd, b"hi").unwrap()).unwrap();
        thread::sleep(Duration::from_millis(100));
        let mut buf = [0u8; 2];
        let n = nix::unistd::read(r, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi");
        let _ = nix::unistd::close(r);
    }
}
