//! tickhttp - cooperative HTTP server and client for tick loops
//!
//! Both halves run inside the caller's own loop: every call does a bounded
//! amount of non-blocking work and returns. Transports are injected through
//! the traits in [`transport`].

pub mod client;
pub mod clock;
pub mod config;
pub mod device;
pub mod http;
pub mod schedule;
pub mod server;
pub mod transport;
