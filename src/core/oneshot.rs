//! A single-value rendezvous with wait-or-get semantics, and the
//! `Promise`/`Future` facade built on top of it.
//!
//! The cell moves through the states `Empty -> Ready -> Consumed`, with a
//! side branch `Empty -> Abandoned` reached if the producing `Promise` is
//! dropped before a value is ever set. `Abandoned` exists so that
//! `Future::get` fails cleanly instead of blocking forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::error::Error;

enum CellState<T> {
    Empty,
    Ready(T),
    Consumed,
    Abandoned,
}

struct OneShotCell<T> {
    state: Mutex<CellState<T>>,
    cond: Condvar,
    // Advisory only: cheap non-blocking `is_ready` reads this; authoritative
    // transitions always happen under `state`'s lock.
    ready: AtomicBool,
}

impl<T> OneShotCell<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Empty),
            cond: Condvar::new(),
            ready: AtomicBool::new(false),
        }
    }

    fn put(&self, value: T) -> Result<(), Error> {
        let mut state = self.state.lock();
        match *state {
            CellState::Empty => {
                *state = CellState::Ready(value);
                self.ready.store(true, Ordering::Release);
                self.cond.notify_all();
                Ok(())
            }
            CellState::Ready(_) | CellState::Consumed | CellState::Abandoned => {
                Err(Error::AlreadySet)
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn take_or_wait(&self) -> Result<T, Error> {
        let mut state = self.state.lock();
        loop {
            match *state {
                CellState::Ready(_) => {
                    let taken = std::mem::replace(&mut *state, CellState::Consumed);
                    return match taken {
                        CellState::Ready(v) => Ok(v),
                        _ => unreachable!(),
                    };
                }
                CellState::Consumed => return Err(Error::Consumed),
                CellState::Abandoned => return Err(Error::Abandoned),
                CellState::Empty => {
                    self.cond.wait(&mut state);
                }
            }
        }
    }

    /// Called when the producing `Promise` is dropped. A no-op once the cell
    /// has already reached `Ready`/`Consumed`/`Abandoned`.
    fn abandon(&self) {
        let mut state = self.state.lock();
        if let CellState::Empty = *state {
            *state = CellState::Abandoned;
            self.ready.store(true, Ordering::Release);
            self.cond.notify_all();
        }
    }
}

/// The producing handle of a one-shot value rendezvous.
///
/// Single-producer: `set` may be called at most once, and `future` may vend
/// at most one `Future`. Dropping a `Promise` before `set` marks the cell
/// `Abandoned`, so any `Future` already handed out fails on `get` instead of
/// blocking forever.
pub struct Promise<T> {
    cell: Arc<OneShotCell<T>>,
    vended: AtomicBool,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(OneShotCell::new()),
            vended: AtomicBool::new(false),
        }
    }

    /// Vends the single `Future` for this promise. A second call fails with
    /// `FutureAlreadyVended`.
    pub fn future(&self) -> Result<Future<T>, Error> {
        if self
            .vended
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::FutureAlreadyVended);
        }
        Ok(Future {
            cell: Arc::clone(&self.cell),
        })
    }

    /// Deposits the single value for this promise's cell.
    pub fn set(&self, value: T) -> Result<(), Error> {
        self.cell.put(value)
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        self.cell.abandon();
    }
}

/// The single consuming handle of a one-shot value rendezvous.
pub struct Future<T> {
    cell: Arc<OneShotCell<T>>,
}

impl<T> Future<T> {
    /// Non-blocking observation of readiness.
    pub fn is_ready(&self) -> bool {
        self.cell.is_ready()
    }

    /// Takes the value if ready, otherwise blocks until it is. Fails with
    /// `Consumed` if already taken, or `Abandoned` if the producing
    /// `Promise` was dropped before setting a value.
    pub fn get(&self) -> Result<T, Error> {
        self.cell.take_or_wait()
    }
}
