use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::{NetError, NetResult};

use super::framing::ByteSource;
use super::protocol::{BUFFER_LENGTH, MAX_PLAYERS};
use super::stats::NetworkStats;
use super::wait::{FrameDriver, WaitStage, next_tick};

pub const LISTEN_BACKLOG: i32 = 4;

/// Queued bytes a peer may fall behind by before it is treated as gone.
pub const MAX_PENDING_BYTES: usize = 4 * BUFFER_LENGTH * MAX_PLAYERS;

/// Non-blocking listening socket owned by a host.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Listens on every interface.
    pub fn host(port: u16) -> NetResult<Self> {
        Self::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
    }

    pub fn bind(addr: SocketAddr) -> NetResult<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(NetError::Socket)?;
        socket.set_reuse_address(true).map_err(NetError::Socket)?;
        socket.set_nonblocking(true).map_err(NetError::Socket)?;
        socket.bind(&addr.into()).map_err(NetError::Bind)?;
        socket.listen(LISTEN_BACKLOG).map_err(NetError::Listen)?;

        let listener = TcpListener::from(socket);
        log::info!("Listening on {}", addr);
        Ok(Self { listener })
    }

    /// Takes one pending connection, if any.
    pub fn accept(&self) -> Option<Connection> {
        match self.listener.accept() {
            Ok((stream, addr)) => match Connection::from_stream(stream) {
                Ok(connection) => Some(connection),
                Err(e) => {
                    log::warn!("Could not configure connection from {}: {}", addr, e);
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                log::warn!("Accept failed: {}", e);
                None
            }
        }
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        self.listener.local_addr().map_err(NetError::Socket)
    }
}

/// One non-blocking TCP stream.
///
/// Bytes the kernel would not take are queued and flushed ahead of the
/// next send, so a message is never partially lost.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    outgoing: VecDeque<u8>,
    last_error: Option<io::ErrorKind>,
    eof: bool,
    broken: bool,
    stats: NetworkStats,
}

impl Connection {
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;

        Ok(Self {
            stream,
            peer_addr,
            outgoing: VecDeque::new(),
            last_error: None,
            eof: false,
            broken: false,
            stats: NetworkStats::default(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Sends one encoded message; returns the bytes accepted by the kernel
    /// now. The rest is queued. A peer that lets the queue pass
    /// `MAX_PENDING_BYTES` is marked broken.
    pub fn send(&mut self, bytes: &[u8]) -> NetResult<usize> {
        if self.broken {
            return Err(NetError::Disconnected);
        }

        self.flush()?;

        let written = if self.outgoing.is_empty() {
            match self.stream.write(bytes) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                Err(e) => return Err(self.fail(e)),
            }
        } else {
            0
        };

        let rest = &bytes[written..];
        if self.outgoing.len() + rest.len() > MAX_PENDING_BYTES {
            self.outgoing.clear();
            return Err(self.fail(io::Error::other("send queue full")));
        }
        self.outgoing.extend(rest);
        self.stats.record_sent(bytes.len());
        Ok(written)
    }

    /// Pushes queued bytes out; stops without error when the kernel is full.
    pub fn flush(&mut self) -> NetResult<()> {
        while !self.outgoing.is_empty() {
            let (front, _) = self.outgoing.as_slices();
            match self.stream.write(front) {
                Ok(0) => return Err(self.fail(io::ErrorKind::WriteZero.into())),
                Ok(n) => {
                    self.outgoing.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(())
    }

    pub fn pending_bytes(&self) -> usize {
        self.outgoing.len()
    }

    /// True unless the peer closed the stream or a hard error was seen.
    ///
    /// Uses a one-byte peek: data or would-block means alive.
    pub fn is_connected(&mut self) -> bool {
        if self.eof || self.broken {
            return false;
        }

        let mut peeked = [0u8; 1];
        match self.stream.peek(&mut peeked) {
            Ok(0) => {
                self.eof = true;
                false
            }
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    pub fn last_error(&self) -> Option<io::ErrorKind> {
        self.last_error
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.stats.record_received(bytes);
    }

    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            log::debug!("Shutdown of {} failed: {}", self.peer_addr, e);
        }
    }

    fn fail(&mut self, err: io::Error) -> NetError {
        log::debug!("Connection to {} failed: {}", self.peer_addr, err);
        self.last_error = Some(err.kind());
        self.broken = true;
        NetError::Disconnected
    }
}

impl ByteSource for Connection {
    /// Reads what has arrived. Hard errors mark the connection broken and
    /// read as "no data"; the next `is_connected` check reports them.
    fn recv(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        if buf.is_empty() || self.eof || self.broken {
            return Ok(0);
        }

        match self.stream.read(buf) {
            Ok(0) => {
                self.eof = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => {
                self.fail(e);
                Ok(0)
            }
        }
    }
}

/// An outgoing connection that has not completed yet.
#[derive(Debug)]
pub struct Connector {
    socket: Socket,
    target: SocketAddr,
}

impl Connector {
    pub fn start(address: &str, port: u16) -> NetResult<Self> {
        let ip: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| NetError::Address(address.to_string()))?;
        let target = SocketAddr::new(ip, port);

        let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))
            .map_err(NetError::Socket)?;
        socket.set_nonblocking(true).map_err(NetError::Socket)?;

        match socket.connect(&SockAddr::from(target)) {
            Ok(()) => {}
            Err(e) if connect_in_progress(&e) => {}
            Err(e) => return Err(NetError::Connect(e)),
        }

        log::info!("Connecting to {}", target);
        Ok(Self { socket, target })
    }

    /// Checks whether the connect has finished. Errors are terminal.
    pub fn poll(&self) -> NetResult<bool> {
        if let Some(e) = self.socket.take_error().map_err(NetError::Connect)? {
            return Err(NetError::Connect(e));
        }

        match self.socket.peer_addr() {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) if connect_in_progress(&e) => Ok(false),
            Err(e) => Err(NetError::Connect(e)),
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn finish(self) -> NetResult<Connection> {
        let stream = TcpStream::from(self.socket);
        Connection::from_stream(stream).map_err(NetError::Connect)
    }
}

fn connect_in_progress(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    false
}

/// Connects to a host, polling once per frame until `timeout` ticks pass.
///
/// The socket is closed on every failure path, including user abort.
pub fn join<D: FrameDriver + ?Sized>(
    address: &str,
    port: u16,
    timeout: u32,
    driver: &mut D,
) -> NetResult<Connection> {
    let connector = Connector::start(address, port)?;

    let start = next_tick(driver, WaitStage::Connecting)?;
    let deadline = start.saturating_add(timeout);

    loop {
        if connector.poll()? {
            log::info!("Connected to {}", connector.target());
            return connector.finish();
        }

        let ticks = next_tick(driver, WaitStage::Connecting)?;
        if ticks >= deadline {
            log::warn!("Connection to {} timed out", connector.target());
            return Err(NetError::Timeout);
        }
    }
}
