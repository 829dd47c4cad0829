//! Reads whatever is already buffered on a pipe and prints it.
//!
//! Non-core demonstration binary, not part of the library's public
//! contract: file-descriptor I/O and process setup here are the caller's
//! concern, not the reactor/completion core's.
use std::io::Read;
use std::os::unix::io::FromRawFd;

use asyncio_core::{Driver, DriverConfig};

fn read_all(fd: i32) -> Vec<u8> {
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let mut buf = Vec::new();
    let _ = file.read_to_end(&mut buf);
    std::mem::forget(file);
    buf
}

fn main() {
    tracing_subscriber::fmt::init();

    let driver = Driver::with_config(DriverConfig {
        threads: 3,
        poll_timeout_ms: 200,
        close_on_teardown: false,
    })
    .expect("failed to start driver");

    let (r, w) = nix::unistd::pipe().expect("failed to create pipe");
    nix::unistd::write(w, b"hello from the fd-echo demo\n").expect("failed to prime pipe");
    let _ = nix::unistd::close(w);

    let future = driver
        .read(r, read_all)
        .expect("failed to register read subscription");

    let bytes = future.get().expect("read handler never completed");
    print!("{}", String::from_utf8_lossy(&bytes));
}
