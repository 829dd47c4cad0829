use nix::errno::Errno;
use snafu::Snafu;

/// Error taxonomy for the reactor/completion core.
///
/// Each variant corresponds to one of the error kinds in the design: most are
/// programming errors surfaced straight back to the caller, `PollFailed` is
/// fatal to the reactor loop, and teardown failures never reach this type at
/// all (they are logged, never propagated, from destructors).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// `subscribe`/`unsubscribe` was called with a negative descriptor.
    #[snafu(display("descriptor {fd} is invalid: descriptors must be non-negative"))]
    InvalidDescriptor { fd: i32 },

    /// The readiness primitive (or the self-pipe it relies on) returned a
    /// hard error. Fatal to the reactor loop that observed it.
    #[snafu(display("poll(2) failed: {source}"))]
    PollFailed { source: Errno },

    /// A second `Promise::set` was attempted.
    #[snafu(display("value already set on this cell"))]
    AlreadySet,

    /// A second `Promise::future` was attempted.
    #[snafu(display("a future has already been vended for this promise"))]
    FutureAlreadyVended,

    /// A second `Future::get` was attempted.
    #[snafu(display("future value already consumed"))]
    Consumed,

    /// `Future::get` on a cell whose producing `Promise` was dropped before
    /// a value was ever set.
    #[snafu(display("the producing promise was dropped before a value was set"))]
    Abandoned,

    /// The worker pool's task queue could not grow to accept another task.
    #[snafu(display("worker pool queue allocation failed"))]
    ResourceExhausted,

    /// `Driver::read`/`Driver::write` was called after `stop_event_loop`.
    #[snafu(display("driver is stopped: no new read/write subscriptions are accepted"))]
    Stopped,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
