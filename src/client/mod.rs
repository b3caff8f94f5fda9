//! Tick-driven HTTP/1.0 client.
//!
//! [`HttpRequest`] performs one GET at a time without ever blocking. The
//! owner calls [`HttpRequest::request`] once per tick; each call advances
//! the request as far as the transport allows and reports what happened.
//! Once the request is done or has failed, [`HttpRequest::reset`] prepares
//! the same target again on a fresh socket.

use std::io;

pub mod request;

pub use request::{HttpRequest, RequestState};

use crate::http::parser::ParseError;

/// Setup failures. These happen before any request I/O.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to resolve {host}:{port}: {reason}")]
    Resolution {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("unsupported method `{0}`; only GET is supported")]
    UnsupportedMethod(String),
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request target not configured")]
    NotConfigured,
    #[error("failed to open socket: {0}")]
    Open(#[source] io::Error),
}

/// A failure while a request is in flight. The request must be reset
/// before it can be retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("connect() failed: {0}")]
    Connect(io::ErrorKind),
    #[error("connect did not complete: {0}")]
    ConnectProbe(io::ErrorKind),
    #[error("send() failed: {0}")]
    Send(io::ErrorKind),
    #[error("failed to decode HTTP status line: {0}")]
    StatusLine(ParseError),
    #[error("recv() failed while reading status line: {0}")]
    StatusRecv(io::ErrorKind),
    #[error("premature EOF before status line")]
    StatusEof,
    #[error("failed to decode HTTP header lines: {0}")]
    HeaderLine(ParseError),
    #[error("recv() failed while reading headers: {0}")]
    HeaderRecv(io::ErrorKind),
    #[error("premature EOF in header section")]
    HeaderEof,
    #[error("recv() failed while reading body: {0}")]
    BodyRecv(io::ErrorKind),
    #[error("body ended after {received} of {expected} bytes")]
    ShortBody { expected: usize, received: usize },
}

impl RequestError {
    /// Stable negative code identifying the failure.
    pub fn code(&self) -> i32 {
        match self {
            RequestError::Connect(_) => -1,
            RequestError::ConnectProbe(_) => -2,
            RequestError::Send(_) => -3,
            RequestError::StatusLine(_) => -4,
            RequestError::StatusRecv(_) => -5,
            RequestError::StatusEof => -6,
            RequestError::HeaderLine(_) => -7,
            RequestError::HeaderRecv(_) => -8,
            RequestError::HeaderEof => -9,
            RequestError::BodyRecv(_) => -10,
            RequestError::ShortBody { .. } => -11,
        }
    }
}

/// What one call to [`HttpRequest::request`] achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// At least one phase completed; the request is not finished yet.
    Advanced,
    /// The response is complete.
    Done,
    /// No phase completed because the transport was not ready.
    Pending,
    /// No target has been configured.
    Unconfigured,
    /// The request failed and must be reset.
    Failed(RequestError),
}

impl Progress {
    /// 0 for success, positive for "try again next tick", negative for
    /// failures that need a reset.
    pub fn code(&self) -> i32 {
        match self {
            Progress::Advanced | Progress::Done => 0,
            Progress::Pending => 1,
            Progress::Unconfigured => 2,
            Progress::Failed(e) => e.code(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Progress::Failed(_))
    }
}
