//! Connection acceptor and route map.

use std::io;

pub mod listener;
pub mod routes;

pub use listener::Server;
pub use routes::{RouteMap, Routes};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("server already started")]
    AlreadyStarted,
}

/// What one call to [`Server::serve`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accepted: usize,
    /// Connections whose response was fully written.
    pub completed: usize,
    pub expired: usize,
    /// Connections closed on peer close, transport error or oversize.
    pub dropped: usize,
    /// Connections still open after the tick.
    pub live: usize,
}
