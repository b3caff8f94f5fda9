use std::net::SocketAddr;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::http::parser::{HEADER_TERMINATOR, request_line};
use crate::http::request::{Method, RequestLine};
use crate::http::response::StatusCode;
use crate::http::template::render;
use crate::server::routes::Routes;
use crate::transport::{Stream, would_block};

/// Bytes requested per `try_recv`.
const RECV_CHUNK: usize = 1024;

/// Requests whose header block grows past this are dropped.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Reading,
    Processing,
    Writing,
    Closed,
}

/// Why a connection reached [`ConnectionState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The full response was written.
    Completed,
    /// The peer closed before a full request arrived.
    PeerClosed,
    TransportError,
    /// The header block exceeded [`MAX_REQUEST_SIZE`].
    Oversized,
    Expired,
    Shutdown,
}

/// One accepted connection.
///
/// Each phase method does nothing unless the connection is in the matching
/// state, and returns as soon as the transport would block.
pub struct Connection<S> {
    stream: Option<S>,
    peer: SocketAddr,
    read_buf: BytesMut,
    write_buf: Bytes,
    state: ConnectionState,
    close_reason: Option<CloseReason>,
    expiry: u64,
}

impl<S: Stream> Connection<S> {
    /// Wraps an accepted stream. `expiry` is an absolute time in ms; 0 never expires.
    pub fn new(stream: S, peer: SocketAddr, expiry: u64) -> Self {
        Self {
            stream: Some(stream),
            peer,
            read_buf: BytesMut::with_capacity(RECV_CHUNK),
            write_buf: Bytes::new(),
            state: ConnectionState::Reading,
            close_reason: None,
            expiry,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry != 0 && now >= self.expiry
    }

    /// Drains every byte currently available.
    ///
    /// Moves to `Processing` once the buffered bytes end with the header
    /// terminator. Peer close, transport errors and oversized requests close
    /// the connection.
    pub fn read(&mut self) {
        if self.state != ConnectionState::Reading {
            return;
        }

        let mut chunk = [0u8; RECV_CHUNK];

        loop {
            let Some(stream) = self.stream.as_mut() else {
                self.close(CloseReason::TransportError);
                return;
            };

            match stream.try_recv(&mut chunk) {
                Ok(0) => {
                    debug!(peer = %self.peer, buffered = self.read_buf.len(), "Peer closed before request completed");
                    self.close(CloseReason::PeerClosed);
                    return;
                }
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);

                    if self.read_buf.len() > MAX_REQUEST_SIZE {
                        warn!(peer = %self.peer, size = self.read_buf.len(), "Request headers too large");
                        self.close(CloseReason::Oversized);
                        return;
                    }
                }
                Err(e) if would_block(&e) => break,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Read failed");
                    self.close(CloseReason::TransportError);
                    return;
                }
            }
        }

        if self.read_buf.ends_with(HEADER_TERMINATOR) {
            self.state = ConnectionState::Processing;
        }
    }

    /// Builds the response for the buffered request.
    ///
    /// Only the request line is looked at; the rest of the header block is
    /// discarded.
    pub fn process<R: Routes + ?Sized>(&mut self, template: &str, routes: &R) {
        if self.state != ConnectionState::Processing {
            return;
        }

        let parsed = RequestLine::parse(request_line(&self.read_buf));
        let (status, body) = match &parsed {
            Err(_) => (StatusCode::BadRequest, None),
            Ok(req) if req.method() != Some(Method::GET) => (StatusCode::MethodNotAllowed, None),
            Ok(req) => match routes.lookup(&req.path) {
                Some(body) => (StatusCode::Ok, Some(body)),
                None => (StatusCode::NotFound, None),
            },
        };

        debug!(
            peer = %self.peer,
            path = parsed.as_ref().map(|r| r.path.as_str()).unwrap_or("-"),
            status = status.as_u16(),
            "Request processed"
        );

        let body = body.unwrap_or(status.status_line());
        self.write_buf = Bytes::from(render(template, status.status_line(), body));
        self.read_buf.clear();
        self.state = ConnectionState::Writing;
    }

    /// Sends as much of the response as the transport accepts.
    ///
    /// Closes the connection once everything is written or on error.
    pub fn write(&mut self) {
        if self.state != ConnectionState::Writing {
            return;
        }

        loop {
            if self.write_buf.is_empty() {
                self.close(CloseReason::Completed);
                return;
            }

            let Some(stream) = self.stream.as_mut() else {
                self.close(CloseReason::TransportError);
                return;
            };

            match stream.try_send(&self.write_buf) {
                Ok(0) => {
                    warn!(peer = %self.peer, "Connection closed while writing");
                    self.close(CloseReason::TransportError);
                    return;
                }
                Ok(n) => self.write_buf.advance(n),
                Err(e) if would_block(&e) => return,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Write failed");
                    self.close(CloseReason::TransportError);
                    return;
                }
            }
        }
    }

    /// Closes the connection if `now` is at or past its expiry, whatever its
    /// state. Returns true if it was closed by this call.
    pub fn expire(&mut self, now: u64) -> bool {
        if self.is_closed() || !self.is_expired(now) {
            return false;
        }

        warn!(peer = %self.peer, state = ?self.state, expiry = self.expiry, now, "Connection expired");
        self.close(CloseReason::Expired);
        true
    }

    /// Drops the transport and buffers. Later calls are no-ops.
    pub fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }

        self.stream = None;
        self.read_buf = BytesMut::new();
        self.write_buf = Bytes::new();
        self.state = ConnectionState::Closed;
        self.close_reason = Some(reason);
    }
}
