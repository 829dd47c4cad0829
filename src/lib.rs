//! `asyncio-core` is a small asynchronous I/O runtime for POSIX file
//! descriptors.
//!
//! Per core to a reactor's relation to its CPU core in larger SPDK-style
//! runtimes, there is exactly one [`core::Reactor`] per process here, running
//! on exactly one dedicated OS thread. Callers register interest in a
//! descriptor's readability or writability through [`core::Driver::read`]/
//! [`core::Driver::write`]; the reactor dispatches fired events into the
//! [`core::WorkerPool`] so that user handler code never runs on — and never
//! blocks — the reactor thread itself. The result of a `read` handler is
//! delivered back to the caller through a one-shot [`core::Future`].
//!
//! This crate does not perform buffered I/O, does not own byte buffers, and
//! does not implement timers beyond the reactor's own per-round poll
//! timeout. It is level-triggered and one-shot per subscription: a handler
//! that wants to keep watching a descriptor must return
//! [`core::DescriptorStatus::Open`].
pub mod core;

pub use crate::core::{
    Callback, Descriptor, DescriptorStatus, Driver, DriverConfig, Error, Event, Future, Promise,
    Reactor, ReactorConfig, Result, WorkerPool, BLOCK_INDEFINITELY, POLL_NOW,
};
