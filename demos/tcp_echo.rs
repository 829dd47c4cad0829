//! A multiplexed TCP echo server built directly on the `Reactor`, not the
//! `Driver` (each client connection is long-lived and re-arms itself by
//! returning `DescriptorStatus::Open`, which the one-shot `Driver::read`/
//! `write` operations do not support).
//!
//! Non-core demonstration binary. Socket setup, accept handling, and
//! signal handling (Ctrl-C) live here because they are external to the
//! reactor/completion core, which only schedules the handlers this demo
//! supplies.
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use asyncio_core::{DescriptorStatus, Event, Reactor, ReactorConfig};

fn client_request_handler(fd: i32) -> DescriptorStatus {
    let mut stream = unsafe { TcpStream::from_raw_fd(fd) };
    let mut buf = [0u8; 1024];
    let status = match stream.read(&mut buf) {
        Ok(0) => {
            tracing::info!(fd, "client connection closed");
            DescriptorStatus::Close
        }
        Ok(n) => {
            if let Err(e) = stream.write_all(&buf[..n]) {
                tracing::warn!(fd, error = %e, "failed to echo bytes back to client");
            }
            DescriptorStatus::Open
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => DescriptorStatus::Open,
        Err(e) => {
            tracing::warn!(fd, error = %e, "failed to read from client socket");
            DescriptorStatus::Close
        }
    };
    stream.into_raw_fd(); // the reactor, not this Rust value, owns the fd
    status
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7070);

    let listener = TcpListener::bind((addr.as_str(), port)).expect("failed to bind server socket");
    listener
        .set_nonblocking(true)
        .expect("failed to set listener non-blocking");

    let reactor = Arc::new(Reactor::new(ReactorConfig::default()).expect("failed to build reactor"));
    reactor.set_timeout(200);

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .expect("failed to register SIGINT handler");
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .expect("failed to register SIGTERM handler");

    let reactor_for_accept = Arc::clone(&reactor);
    let listener_fd = listener.as_raw_fd();
    reactor
        .subscribe(
            listener_fd,
            Event::Read,
            Arc::new(move |fd| {
                let listener = unsafe { TcpListener::from_raw_fd(fd) };
                match listener.accept() {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "accepted new client connection");
                        let _ = stream.set_nonblocking(true);
                        let client_fd = stream.into_raw_fd();
                        if let Err(e) = reactor_for_accept.subscribe(
                            client_fd,
                            Event::Read,
                            Arc::new(client_request_handler),
                        ) {
                            tracing::warn!(error = %e, "failed to subscribe new client connection");
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => tracing::warn!(error = %e, "failed to accept client connection"),
                }
                listener.into_raw_fd(); // the reactor, not this Rust value, owns the listening socket
                DescriptorStatus::Open
            }),
        )
        .expect("failed to subscribe server socket");

    tracing::info!(%addr, port, "tcp echo server running");

    let loop_reactor = Arc::clone(&reactor);
    let handle = std::thread::spawn(move || loop_reactor.event_loop());

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    tracing::info!("shutdown signal received, stopping tcp echo server");
    reactor.stop_event_loop();
    if let Err(e) = handle.join().expect("reactor thread panicked") {
        tracing::error!(error = %e, "reactor loop terminated with an error");
    }
    std::mem::forget(listener); // the listener fd was handed to the reactor above
}
