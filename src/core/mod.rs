//! The reactor + completion core: a descriptor-event reactor, a bounded
//! worker pool, a one-shot future/promise pair, and the driver facade that
//! composes them into `read`/`write`.

mod driver;
mod error;
mod oneshot;
mod pool;
mod reactor;

pub use driver::{Driver, DriverConfig};
pub use error::{Error, Result};
pub use oneshot::{Future, Promise};
pub use pool::WorkerPool;
pub use reactor::{
    Callback, Descriptor, DescriptorStatus, Event, Reactor, ReactorConfig, BLOCK_INDEFINITELY,
    POLL_NOW,
};
