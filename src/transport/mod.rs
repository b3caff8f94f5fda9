//! Non-blocking transport capabilities.
//!
//! The server and the client never touch sockets directly. They are generic
//! over the small set of traits below, and every call on them must return
//! immediately. "Would block" is signalled with [`io::ErrorKind::WouldBlock`],
//! which the state machines treat as "try again next tick".
//!
//! Two implementations ship with the crate:
//!
//! - [`tcp`]: real TCP sockets registered with the tokio reactor
//! - [`memory`]: a scripted in-memory network for deterministic tests and
//!   host-side simulation

use std::io;
use std::net::SocketAddr;

pub mod memory;
pub mod tcp;

/// A connected, non-blocking byte stream.
///
/// Dropping the stream closes it.
pub trait Stream {
    /// Reads available bytes into `buf`.
    ///
    /// `Ok(0)` means the peer closed its side. `WouldBlock` means nothing is
    /// available right now.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes as much of `buf` as the transport accepts right now.
    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// A listening socket.
pub trait Acceptor {
    type Stream: Stream;

    /// Accepts one pending connection, or fails with `WouldBlock` when the
    /// backlog is empty.
    fn try_accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

/// Factory for listening sockets.
pub trait Bind {
    type Acceptor: Acceptor;

    fn bind(&mut self, port: u16, backlog: u32) -> io::Result<Self::Acceptor>;
}

/// An outbound socket that connects without blocking.
pub trait ClientSocket: Stream {
    /// Starts connecting to `addr`.
    ///
    /// `Ok(())` means the connection completed immediately. `WouldBlock`
    /// means the connect is in progress and must be confirmed with
    /// [`ClientSocket::poll_connect`].
    fn connect(&mut self, addr: SocketAddr) -> io::Result<()>;

    /// Checks whether an in-progress connect has completed.
    fn poll_connect(&mut self) -> io::Result<()>;
}

/// Factory for outbound sockets. A fresh socket is opened on every client reset.
pub trait Dial {
    type Socket: ClientSocket;

    fn open(&mut self) -> io::Result<Self::Socket>;
}

/// Returns true for errors that mean "not ready yet".
pub fn would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
