//! TCP transport on top of the tokio reactor.
//!
//! Sockets are registered with tokio so the reactor keeps their readiness up
//! to date, but nothing here ever awaits. Every operation is a single
//! `try_*` call or a single poll with a no-op waker, so the owning tick loop
//! stays in control. All constructors must run inside a tokio runtime.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use super::{Acceptor, Bind, ClientSocket, Dial, Stream};

/// Binds listening sockets on a fixed local address.
#[derive(Debug, Clone, Copy)]
pub struct TcpBinder {
    addr: IpAddr,
}

impl TcpBinder {
    pub fn new(addr: IpAddr) -> Self {
        Self { addr }
    }

    /// Binds on the loopback interface only.
    pub fn localhost() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl Default for TcpBinder {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl Bind for TcpBinder {
    type Acceptor = TcpAcceptor;

    fn bind(&mut self, port: u16, backlog: u32) -> io::Result<TcpAcceptor> {
        let socket = match self.addr {
            IpAddr::V4(_) => TcpSocket::new_v4()?,
            IpAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::new(self.addr, port))?;
        let listener = socket.listen(backlog)?;

        Ok(TcpAcceptor { listener })
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// The bound address. Useful after binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Acceptor for TcpAcceptor {
    type Stream = TcpConnection;

    fn try_accept(&mut self) -> io::Result<(TcpConnection, SocketAddr)> {
        let mut cx = Context::from_waker(Waker::noop());

        match self.listener.poll_accept(&mut cx) {
            Poll::Ready(Ok((stream, peer))) => Ok((TcpConnection { stream }, peer)),
            Poll::Ready(Err(e)) => Err(e),
            Poll::Pending => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// An accepted server-side connection.
pub struct TcpConnection {
    stream: TcpStream,
}

impl Stream for TcpConnection {
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.try_read(buf)
    }

    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.try_write(buf)
    }
}

/// Opens outbound TCP sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

impl Dial for TcpDialer {
    type Socket = TcpClientSocket;

    fn open(&mut self) -> io::Result<TcpClientSocket> {
        Ok(TcpClientSocket {
            state: ConnectState::Idle,
        })
    }
}

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

enum ConnectState {
    Idle,
    Connecting(ConnectFuture),
    Connected(TcpStream),
}

pub struct TcpClientSocket {
    state: ConnectState,
}

impl TcpClientSocket {
    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        match &mut self.state {
            ConnectState::Connected(stream) => Ok(stream),
            _ => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

impl Stream for TcpClientSocket {
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.try_read(buf)
    }

    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.try_write(buf)
    }
}

impl ClientSocket for TcpClientSocket {
    fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.state = ConnectState::Connecting(Box::pin(TcpStream::connect(addr)));
        self.poll_connect()
    }

    fn poll_connect(&mut self) -> io::Result<()> {
        let fut = match &mut self.state {
            ConnectState::Connected(_) => return Ok(()),
            ConnectState::Idle => return Err(io::ErrorKind::NotConnected.into()),
            ConnectState::Connecting(fut) => fut,
        };

        let mut cx = Context::from_waker(Waker::noop());
        let polled = fut.as_mut().poll(&mut cx);
        match polled {
            Poll::Ready(Ok(stream)) => {
                self.state = ConnectState::Connected(stream);
                Ok(())
            }
            Poll::Ready(Err(e)) => {
                self.state = ConnectState::Idle;
                Err(e)
            }
            Poll::Pending => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}
