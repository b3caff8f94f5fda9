use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::client::{ClientError, Progress, RequestError};
use crate::http::parser::{parse_content_length, parse_header_line, parse_status_line, take_line};
use crate::http::request::Method;
use crate::http::response::{Response, ResponseStatus};
use crate::transport::{ClientSocket, Dial, Stream, would_block};

/// Bytes requested per `try_recv`.
const RECV_CHUNK: usize = 1024;

/// Where a request currently stands.
///
/// ```text
/// Null → Init → Connecting → Sending → ReceivingStatusLine
///      → ReceivingHeaders → ReceivingBody → Done
/// ```
///
/// Any state but `Null` can move to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Null,
    Init,
    Connecting,
    Sending,
    ReceivingStatusLine,
    ReceivingHeaders,
    ReceivingBody,
    Done,
    Error,
}

#[derive(Debug, Clone)]
struct Target {
    host: String,
    addr: SocketAddr,
    path: String,
}

/// Outcome of one phase attempt.
enum Step {
    /// The phase completed and the state moved on.
    Next,
    /// The transport is not ready.
    Blocked,
}

enum Fill {
    Data,
    Eof,
    Blocked,
}

/// A reusable, non-blocking HTTP GET.
pub struct HttpRequest<D: Dial> {
    dialer: D,
    target: Option<Target>,
    socket: Option<D::Socket>,
    send_buf: Bytes,
    recv_buf: BytesMut,
    state: RequestState,
    status: ResponseStatus,
    headers: HashMap<String, String>,
    content_length: Option<usize>,
    error: Option<RequestError>,
}

impl<D: Dial> HttpRequest<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            target: None,
            socket: None,
            send_buf: Bytes::new(),
            recv_buf: BytesMut::new(),
            state: RequestState::Null,
            status: ResponseStatus::default(),
            headers: HashMap::new(),
            content_length: None,
            error: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// The error that moved the request to `Error`, if any.
    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    pub fn target_addr(&self) -> Option<SocketAddr> {
        self.target.as_ref().map(|t| t.addr)
    }

    /// Resolves `host:port` and prepares a GET for `path`.
    ///
    /// Resolution happens here, once. On failure the request is left
    /// unconfigured.
    pub fn configure(&mut self, host: &str, path: &str, port: u16) -> Result<(), ClientError> {
        self.configure_method("GET", host, path, port)
    }

    /// Like [`HttpRequest::configure`], rejecting every method but GET.
    pub fn configure_method(
        &mut self,
        method: &str,
        host: &str,
        path: &str,
        port: u16,
    ) -> Result<(), ClientError> {
        self.clear();
        self.target = None;
        self.state = RequestState::Null;

        if Method::from_str(method) != Some(Method::GET) {
            return Err(ClientError::UnsupportedMethod(method.to_string()));
        }

        let resolution = |reason: String| ClientError::Resolution {
            host: host.to_string(),
            port,
            reason,
        };

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| resolution(e.to_string()))?
            .next()
            .ok_or_else(|| resolution("no addresses".to_string()))?;

        debug!(host, port, %addr, path, "Request target resolved");

        self.target = Some(Target {
            host: host.to_string(),
            addr,
            path: (if path.is_empty() { "/" } else { path }).to_string(),
        });

        self.reset()
    }

    /// Configures from an `http://host[:port]/path` URL.
    pub fn configure_url(&mut self, url: &str) -> Result<(), ClientError> {
        let invalid = |reason: &str| ClientError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = url::Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        if parsed.scheme() != "http" {
            return Err(invalid("only http:// is supported"));
        }

        let host = parsed.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = parsed.port_or_known_default().unwrap_or(80);
        let path = match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        };

        // IPv6 hosts come back bracketed
        let host = host.trim_start_matches('[').trim_end_matches(']');
        self.configure(host, &path, port)
    }

    /// Discards any in-flight request and opens a fresh socket for the
    /// configured target.
    pub fn reset(&mut self) -> Result<(), ClientError> {
        let Some(target) = &self.target else {
            return Err(ClientError::NotConfigured);
        };

        let request = format!("{} {} HTTP/1.0\r\n\r\n", Method::GET.as_str(), target.path);

        self.socket = None;
        self.clear();
        self.send_buf = Bytes::from(request);

        match self.dialer.open() {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = RequestState::Init;
                Ok(())
            }
            Err(e) => {
                self.state = RequestState::Null;
                Err(ClientError::Open(e))
            }
        }
    }

    fn clear(&mut self) {
        self.send_buf = Bytes::new();
        self.recv_buf = BytesMut::new();
        self.status = ResponseStatus::default();
        self.headers.clear();
        self.content_length = None;
        self.error = None;
    }

    /// Advances the request as far as possible without blocking.
    ///
    /// Returns what happened and the state afterwards. Calling again after
    /// `Done` or a failure repeats that result without doing any I/O.
    pub fn request(&mut self) -> (Progress, RequestState) {
        let progress = self.drive();
        (progress, self.state)
    }

    fn drive(&mut self) -> Progress {
        let mut advanced = false;

        loop {
            let step = match self.state {
                RequestState::Null => return Progress::Unconfigured,
                RequestState::Done => return Progress::Done,
                RequestState::Error => {
                    let e = self
                        .error
                        .clone()
                        .unwrap_or(RequestError::Connect(io::ErrorKind::Other));
                    return Progress::Failed(e);
                }
                RequestState::Init => self.start_connect(),
                RequestState::Connecting => self.finish_connect(),
                RequestState::Sending => self.send(),
                RequestState::ReceivingStatusLine => self.receive_status(),
                RequestState::ReceivingHeaders => self.receive_headers(),
                RequestState::ReceivingBody => self.receive_body(),
            };

            match step {
                Ok(Step::Next) => advanced = true,
                Ok(Step::Blocked) => {
                    return if advanced {
                        Progress::Advanced
                    } else {
                        Progress::Pending
                    };
                }
                Err(e) => return self.fail(e),
            }
        }
    }

    fn fail(&mut self, e: RequestError) -> Progress {
        warn!(
            host = self.target.as_ref().map(|t| t.host.as_str()).unwrap_or("-"),
            state = ?self.state,
            error = %e,
            code = e.code(),
            "Request failed"
        );

        self.socket = None;
        self.state = RequestState::Error;
        self.error = Some(e.clone());
        Progress::Failed(e)
    }

    fn advance(&mut self, to: RequestState) -> Result<Step, RequestError> {
        debug!(from = ?self.state, to = ?to, "Request state");
        self.state = to;
        Ok(Step::Next)
    }

    fn socket(&mut self) -> io::Result<&mut D::Socket> {
        self.socket
            .as_mut()
            .ok_or_else(|| io::ErrorKind::NotConnected.into())
    }

    fn start_connect(&mut self) -> Result<Step, RequestError> {
        let addr = match &self.target {
            Some(t) => t.addr,
            None => return Err(RequestError::Connect(io::ErrorKind::NotConnected)),
        };

        let result = self.socket().and_then(|s| s.connect(addr));
        match result {
            Ok(()) => self.advance(RequestState::Sending),
            Err(e) if would_block(&e) => {
                // an in-progress connect is confirmed in Connecting
                self.state = RequestState::Connecting;
                Ok(Step::Blocked)
            }
            Err(e) => Err(RequestError::Connect(e.kind())),
        }
    }

    fn finish_connect(&mut self) -> Result<Step, RequestError> {
        let result = self.socket().and_then(|s| s.poll_connect());
        match result {
            Ok(()) => self.advance(RequestState::Sending),
            Err(e) if would_block(&e) => Ok(Step::Blocked),
            Err(e) => Err(RequestError::ConnectProbe(e.kind())),
        }
    }

    fn send(&mut self) -> Result<Step, RequestError> {
        while !self.send_buf.is_empty() {
            let result = match self.socket.as_mut() {
                Some(s) => s.try_send(&self.send_buf),
                None => Err(io::ErrorKind::NotConnected.into()),
            };

            match result {
                Ok(0) => return Err(RequestError::Send(io::ErrorKind::WriteZero)),
                Ok(n) => self.send_buf.advance(n),
                Err(e) if would_block(&e) => return Ok(Step::Blocked),
                Err(e) => return Err(RequestError::Send(e.kind())),
            }
        }

        self.advance(RequestState::ReceivingStatusLine)
    }

    /// Reads one chunk into the receive buffer.
    fn fill(&mut self) -> io::Result<Fill> {
        let mut chunk = [0u8; RECV_CHUNK];

        match self.socket()?.try_recv(&mut chunk) {
            Ok(0) => Ok(Fill::Eof),
            Ok(n) => {
                self.recv_buf.extend_from_slice(&chunk[..n]);
                Ok(Fill::Data)
            }
            Err(e) if would_block(&e) => Ok(Fill::Blocked),
            Err(e) => Err(e),
        }
    }

    fn receive_status(&mut self) -> Result<Step, RequestError> {
        loop {
            if let Some(line) = take_line(&mut self.recv_buf) {
                self.status = parse_status_line(&line).map_err(RequestError::StatusLine)?;
                return self.advance(RequestState::ReceivingHeaders);
            }

            match self.fill().map_err(|e| RequestError::StatusRecv(e.kind()))? {
                Fill::Data => continue,
                Fill::Blocked => return Ok(Step::Blocked),
                Fill::Eof => return Err(RequestError::StatusEof),
            }
        }
    }

    fn receive_headers(&mut self) -> Result<Step, RequestError> {
        loop {
            while let Some(line) = take_line(&mut self.recv_buf) {
                if line.is_empty() {
                    self.content_length = self
                        .headers
                        .get("content-length")
                        .map(|v| parse_content_length(v))
                        .transpose()
                        .map_err(RequestError::HeaderLine)?;
                    return self.advance(RequestState::ReceivingBody);
                }

                let (name, value) = parse_header_line(&line).map_err(RequestError::HeaderLine)?;
                self.headers.insert(name, value);
            }

            match self.fill().map_err(|e| RequestError::HeaderRecv(e.kind()))? {
                Fill::Data => continue,
                Fill::Blocked => return Ok(Step::Blocked),
                Fill::Eof => return Err(RequestError::HeaderEof),
            }
        }
    }

    fn receive_body(&mut self) -> Result<Step, RequestError> {
        loop {
            if let Some(expected) = self.content_length {
                if self.recv_buf.len() >= expected {
                    self.recv_buf.truncate(expected);
                    return self.finish();
                }
            }

            match self.fill().map_err(|e| RequestError::BodyRecv(e.kind()))? {
                Fill::Data => continue,
                Fill::Blocked => return Ok(Step::Blocked),
                Fill::Eof => match self.content_length {
                    None => return self.finish(),
                    Some(expected) => {
                        return Err(RequestError::ShortBody {
                            expected,
                            received: self.recv_buf.len(),
                        });
                    }
                },
            }
        }
    }

    fn finish(&mut self) -> Result<Step, RequestError> {
        self.socket = None;

        info!(
            host = self.target.as_ref().map(|t| t.host.as_str()).unwrap_or("-"),
            status = self.status.code,
            bytes = self.recv_buf.len(),
            "Response received"
        );

        self.advance(RequestState::Done)
    }

    /// The response, once the request is `Done`. Otherwise an empty
    /// response with status code 0.
    pub fn response(&self) -> Response {
        if self.state != RequestState::Done {
            return Response::default();
        }

        Response {
            status: self.status.clone(),
            headers: self.headers.clone(),
            body: Bytes::copy_from_slice(&self.recv_buf),
        }
    }
}
