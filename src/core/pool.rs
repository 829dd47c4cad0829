//! A fixed-size set of worker threads draining a shared FIFO task queue.
//!
//! The source implementation pops from the back of a `std::queue` (named as
//! if it were FIFO but serviced LIFO). This implementation uses a genuine
//! FIFO (`VecDeque`, front-pop) since task-ordering property P3 depends on
//! it.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::error;

use super::error::Error;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    tasks: Mutex<VecDeque<Option<Task>>>,
    cond: Condvar,
}

/// A bounded set of worker threads executing parameterless tasks in
/// submission order.
pub struct WorkerPool {
    queue: Arc<Queue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `threads.max(1)` worker threads draining a shared task queue.
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let queue = Arc::new(Queue {
            tasks: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        });

        let workers = (0..threads)
            .map(|idx| {
                let queue = Arc::clone(&queue);
                thread::Builder::new()
                    .name(format!("asyncio-pool-{idx}"))
                    .spawn(move || Self::work(queue))
                    .expect("failed to spawn worker pool thread")
            })
            .collect();

        Self {
            queue,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues `task` and wakes one worker. Fails with `ResourceExhausted`
    /// only if the queue cannot grow to accept it; otherwise infallible.
    pub fn submit(&self, task: Task) -> Result<(), Error> {
        let mut tasks = self.queue.tasks.lock();
        tasks
            .try_reserve(1)
            .map_err(|_| Error::ResourceExhausted)?;
        tasks.push_back(Some(task));
        self.queue.cond.notify_one();
        Ok(())
    }

    /// Submits one sentinel per worker, then waits for every worker thread
    /// to terminate. Idempotent: calling `join` more than once just waits on
    /// an already-empty worker list the second time.
    pub fn join(&self) {
        let worker_count = self.workers.lock().len();
        for _ in 0..worker_count {
            let mut tasks = self.queue.tasks.lock();
            tasks.push_back(None);
            self.queue.cond.notify_one();
        }

        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn work(queue: Arc<Queue>) {
        loop {
            let task = {
                let mut tasks = queue.tasks.lock();
                loop {
                    if let Some(task) = tasks.pop_front() {
                        break task;
                    }
                    queue.cond.wait(&mut tasks);
                }
            };

            match task {
                Some(task) => {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
                        let message = panic_message(&panic);
                        error!(message, "worker pool task panicked; continuing");
                    }
                }
                None => return,
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.join();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
