//! Scripted in-memory transport.
//!
//! A [`MemoryNetwork`] stands in for the TCP stack. Each connection is a
//! shared pipe with one end handed to the server or client under test and
//! the other end, a [`MemoryPeer`], kept by the test. The peer decides
//! exactly what each `try_recv` returns (one queued chunk per call), how many
//! bytes each `try_send` accepts, and when connects complete.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Acceptor, Bind, ClientSocket, Dial, Stream};

/// How a client socket's connect attempt resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectGate {
    /// Connect completes immediately.
    Open,
    /// Connect stays in progress until the peer opens the gate.
    Pending,
    /// Connect fails with `ConnectionRefused`.
    Refuse,
}

#[derive(Debug)]
struct Pipe {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<u8>,
    peer_closed: bool,
    send_budget: Option<usize>,
    recv_error: Option<io::ErrorKind>,
    send_error: Option<io::ErrorKind>,
    gate: ConnectGate,
    connected_to: Option<SocketAddr>,
    closes: usize,
}

impl Pipe {
    fn new(gate: ConnectGate) -> Self {
        Self {
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            peer_closed: false,
            send_budget: None,
            recv_error: None,
            send_error: None,
            gate,
            connected_to: None,
            closes: 0,
        }
    }
}

type SharedPipe = Arc<Mutex<Pipe>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pipe_pair(gate: ConnectGate) -> (MemoryStream, MemoryPeer) {
    let pipe = Arc::new(Mutex::new(Pipe::new(gate)));
    (
        MemoryStream { pipe: pipe.clone() },
        MemoryPeer { pipe },
    )
}

/// The local end of an in-memory connection. Dropping it closes the pipe.
#[derive(Debug)]
pub struct MemoryStream {
    pipe: SharedPipe,
}

impl Stream for MemoryStream {
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.pipe);

        if let Some(kind) = pipe.recv_error.take() {
            return Err(kind.into());
        }

        if let Some(chunk) = pipe.inbound.front_mut() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            chunk.drain(..n);
            if chunk.is_empty() {
                pipe.inbound.pop_front();
            }
            return Ok(n);
        }

        if pipe.peer_closed {
            Ok(0)
        } else {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.pipe);

        if let Some(kind) = pipe.send_error.take() {
            return Err(kind.into());
        }

        let n = match pipe.send_budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => budget.min(buf.len()),
            None => buf.len(),
        };

        if let Some(budget) = pipe.send_budget.as_mut() {
            *budget -= n;
        }
        pipe.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

impl ClientSocket for MemoryStream {
    fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        lock(&self.pipe).connected_to = Some(addr);
        self.poll_connect()
    }

    fn poll_connect(&mut self) -> io::Result<()> {
        match lock(&self.pipe).gate {
            ConnectGate::Open => Ok(()),
            ConnectGate::Pending => Err(io::ErrorKind::WouldBlock.into()),
            ConnectGate::Refuse => Err(io::ErrorKind::ConnectionRefused.into()),
        }
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        lock(&self.pipe).closes += 1;
    }
}

/// The test-side end of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    pipe: SharedPipe,
}

impl MemoryPeer {
    /// Queues one chunk. Each chunk is delivered by at most one `try_recv`.
    pub fn send(&self, bytes: impl AsRef<[u8]>) {
        let bytes = bytes.as_ref();
        if !bytes.is_empty() {
            lock(&self.pipe).inbound.push_back(bytes.to_vec());
        }
    }

    /// Closes the peer's write side. Reads return 0 once queued chunks drain.
    pub fn close(&self) {
        lock(&self.pipe).peer_closed = true;
    }

    /// Limits how many more bytes the local end may send. `None` is unlimited.
    pub fn set_send_budget(&self, budget: Option<usize>) {
        lock(&self.pipe).send_budget = budget;
    }

    pub fn fail_next_recv(&self, kind: io::ErrorKind) {
        lock(&self.pipe).recv_error = Some(kind);
    }

    pub fn fail_next_send(&self, kind: io::ErrorKind) {
        lock(&self.pipe).send_error = Some(kind);
    }

    pub fn set_connect(&self, gate: ConnectGate) {
        lock(&self.pipe).gate = gate;
    }

    pub fn connected_to(&self) -> Option<SocketAddr> {
        lock(&self.pipe).connected_to
    }

    /// Everything the local end has sent so far.
    pub fn received(&self) -> Vec<u8> {
        lock(&self.pipe).outbound.clone()
    }

    pub fn received_string(&self) -> String {
        String::from_utf8_lossy(&self.received()).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// How many times the local end was closed. Always 0 or 1.
    pub fn close_count(&self) -> usize {
        lock(&self.pipe).closes
    }
}

#[derive(Debug)]
struct NetState {
    listeners: HashMap<u16, VecDeque<(MemoryStream, SocketAddr)>>,
    dials: VecDeque<MemoryPeer>,
    dial_gate: ConnectGate,
    next_port: u16,
}

/// An in-memory network implementing both [`Bind`] and [`Dial`].
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetState>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetState {
                listeners: HashMap::new(),
                dials: VecDeque::new(),
                dial_gate: ConnectGate::Open,
                next_port: 40000,
            })),
        }
    }

    /// Opens a connection to a bound port and returns the client's end.
    pub fn connect(&self, port: u16) -> io::Result<MemoryPeer> {
        let mut state = lock(&self.state);
        let peer_port = state.next_port;
        state.next_port = state.next_port.wrapping_add(1);

        let queue = state
            .listeners
            .get_mut(&port)
            .ok_or(io::ErrorKind::ConnectionRefused)?;

        let (stream, peer) = pipe_pair(ConnectGate::Open);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), peer_port);
        queue.push_back((stream, addr));
        Ok(peer)
    }

    pub fn is_listening(&self, port: u16) -> bool {
        lock(&self.state).listeners.contains_key(&port)
    }

    /// Sets how connects on sockets opened from now on resolve.
    pub fn set_dial_gate(&self, gate: ConnectGate) {
        lock(&self.state).dial_gate = gate;
    }

    /// Takes the peer end of the oldest socket opened through [`Dial`].
    pub fn next_dial(&self) -> Option<MemoryPeer> {
        lock(&self.state).dials.pop_front()
    }

    /// Takes the peer end of the newest socket opened through [`Dial`],
    /// discarding older ones.
    pub fn last_dial(&self) -> Option<MemoryPeer> {
        let mut state = lock(&self.state);
        let last = state.dials.pop_back();
        state.dials.clear();
        last
    }
}

impl Bind for MemoryNetwork {
    type Acceptor = MemoryAcceptor;

    fn bind(&mut self, port: u16, _backlog: u32) -> io::Result<MemoryAcceptor> {
        let mut state = lock(&self.state);
        if state.listeners.contains_key(&port) {
            return Err(io::ErrorKind::AddrInUse.into());
        }
        state.listeners.insert(port, VecDeque::new());

        Ok(MemoryAcceptor {
            state: self.state.clone(),
            port,
        })
    }
}

impl Dial for MemoryNetwork {
    type Socket = MemoryStream;

    fn open(&mut self) -> io::Result<MemoryStream> {
        let mut state = lock(&self.state);
        let (stream, peer) = pipe_pair(state.dial_gate);
        state.dials.push_back(peer);
        Ok(stream)
    }
}

/// A bound in-memory port. Dropping it unbinds the port and closes every
/// connection still waiting to be accepted.
#[derive(Debug)]
pub struct MemoryAcceptor {
    state: Arc<Mutex<NetState>>,
    port: u16,
}

impl Acceptor for MemoryAcceptor {
    type Stream = MemoryStream;

    fn try_accept(&mut self) -> io::Result<(MemoryStream, SocketAddr)> {
        lock(&self.state)
            .listeners
            .get_mut(&self.port)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| io::ErrorKind::WouldBlock.into())
    }
}

impl Drop for MemoryAcceptor {
    fn drop(&mut self) {
        let pending = lock(&self.state).listeners.remove(&self.port);
        drop(pending);
    }
}
