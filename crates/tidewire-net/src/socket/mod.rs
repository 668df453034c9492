//! Cross-platform blocking TCP socket.
//!
//! [`Socket`] owns at most one OS descriptor and exposes the same contract on
//! every platform; the per-OS pieces (readiness polling, send flags) live in
//! the private `sys` backends.
//!
//! All methods take `&self`, so a socket can be shared through an `Arc`
//! between the thread reading from it and threads writing to it or closing
//! it. Closing is idempotent. A close that races with a send or receive makes
//! that call fail with an error instead of touching a released descriptor.
//!
//! # Transfer results
//!
//! The transfer family returns `io::Result<usize>`:
//!
//! - [`send`](Socket::send) / [`receive`](Socket::receive) make a single OS
//!   call and may move fewer bytes than requested. `Ok(0)` from `receive`
//!   means the peer closed.
//! - [`send_all`](Socket::send_all) / [`recv_exact`](Socket::recv_exact) loop
//!   until the buffer is complete. A result shorter than the buffer means the
//!   peer closed after that many bytes; `Ok(0)` means it closed before any.
//!
//! Interrupted calls are retried internally in both families.

mod sys;

use std::fmt;
use std::io::{self, Read};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4};
use std::time::Duration;

use parking_lot::RwLock;
use socket2::{Domain, Protocol, Type};
use tidewire_core::logging::targets;

use crate::error::{NetworkError, Result};
use sys::Interest;

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is not open")
}

fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Zero clears the timeout; negative values are filtered out by the caller.
fn timeout_from_ms(ms: i64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms as u64))
}

/// A blocking IPv4 TCP socket.
pub struct Socket {
    inner: RwLock<Option<socket2::Socket>>,
}

impl Socket {
    /// Create a socket with no descriptor.
    ///
    /// The descriptor is created on the first [`bind`](Self::bind) or
    /// [`connect`](Self::connect).
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Create a socket with an open descriptor.
    pub fn open() -> Result<Self> {
        Ok(Self::from_raw(Self::create()?))
    }

    pub(crate) fn from_raw(socket: socket2::Socket) -> Self {
        Self {
            inner: RwLock::new(Some(socket)),
        }
    }

    fn create() -> Result<socket2::Socket> {
        let socket = socket2::Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(NetworkError::Create)?;
        socket.set_reuse_address(true).map_err(NetworkError::Create)?;
        Ok(socket)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.read().is_some() {
            return Ok(());
        }
        let mut guard = self.inner.write();
        if guard.is_none() {
            *guard = Some(Self::create()?);
        }
        Ok(())
    }

    fn with_socket<T>(&self, op: impl FnOnce(&socket2::Socket) -> io::Result<T>) -> io::Result<T> {
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(socket) => op(socket),
            None => Err(not_open()),
        }
    }

    /// Bind to `port` on all local interfaces. Port 0 picks an ephemeral port.
    pub fn bind(&self, port: u16) -> Result<()> {
        self.ensure_open()?;
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        self.with_socket(|s| s.bind(&addr.into()))
            .map_err(|e| NetworkError::bind(port, e))?;
        tracing::debug!(target: targets::SOCKET, port = self.local_port(), "socket bound");
        Ok(())
    }

    /// Mark the socket passive.
    pub fn listen(&self, backlog: i32) -> Result<()> {
        if !self.is_valid() {
            return Err(NetworkError::InvalidSocket);
        }
        self.with_socket(|s| s.listen(backlog))
            .map_err(NetworkError::Listen)
    }

    /// Block until a peer connects.
    ///
    /// The returned socket exclusively owns the accepted descriptor.
    pub fn accept(&self) -> Result<Socket> {
        let (socket, _peer) = self
            .with_socket(|s| retry_interrupted(|| s.accept()))
            .map_err(NetworkError::Accept)?;
        Ok(Self::from_raw(socket))
    }

    /// Connect to a numeric IPv4 `address`. No retries are attempted.
    pub fn connect(&self, address: &str, port: u16) -> Result<()> {
        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(address.to_string()))?;
        self.ensure_open()?;

        let target = SocketAddrV4::new(ip, port);
        self.with_socket(|s| s.connect(&target.into()))
            .map_err(|e| NetworkError::connect(target.to_string(), e))
    }

    /// Single send call. May send fewer bytes than `buf` holds.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.with_socket(|s| retry_interrupted(|| s.send_with_flags(buf, sys::SEND_FLAGS)))
    }

    /// Single receive call. `Ok(0)` means the peer closed.
    pub fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_socket(|s| {
            let mut reader = s;
            retry_interrupted(|| reader.read(buf))
        })
    }

    /// Send the whole buffer, returning how many bytes went out.
    pub fn send_all(&self, buf: &[u8]) -> io::Result<usize> {
        self.with_socket(|s| {
            let mut sent = 0;
            while sent < buf.len() {
                match retry_interrupted(|| s.send_with_flags(&buf[sent..], sys::SEND_FLAGS))? {
                    0 => break,
                    n => sent += n,
                }
            }
            Ok(sent)
        })
    }

    /// Fill the whole buffer, returning how many bytes arrived.
    pub fn recv_exact(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_socket(|s| {
            let mut reader = s;
            let mut received = 0;
            while received < buf.len() {
                match retry_interrupted(|| reader.read(&mut buf[received..]))? {
                    0 => break,
                    n => received += n,
                }
            }
            Ok(received)
        })
    }

    /// Set receive and send timeouts in milliseconds.
    ///
    /// A negative value leaves that timeout unchanged and zero removes it.
    pub fn set_timeouts(&self, recv_ms: i64, send_ms: i64) -> Result<()> {
        let guard = self.inner.read();
        let socket = guard.as_ref().ok_or(NetworkError::InvalidSocket)?;
        if recv_ms >= 0 {
            socket.set_read_timeout(timeout_from_ms(recv_ms))?;
        }
        if send_ms >= 0 {
            socket.set_write_timeout(timeout_from_ms(send_ms))?;
        }
        Ok(())
    }

    /// Enable or disable Nagle's algorithm.
    pub fn set_nodelay(&self, enabled: bool) -> Result<()> {
        Ok(self.with_socket(|s| s.set_nodelay(enabled))?)
    }

    /// Wait up to `timeout_ms` for data or a hang-up. Negative waits forever.
    pub fn wait_readable(&self, timeout_ms: i32) -> io::Result<bool> {
        self.with_socket(|s| sys::poll(s, Interest::Readable, timeout_ms))
    }

    /// Wait up to `timeout_ms` for send buffer space. Negative waits forever.
    pub fn wait_writable(&self, timeout_ms: i32) -> io::Result<bool> {
        self.with_socket(|s| sys::poll(s, Interest::Writable, timeout_ms))
    }

    /// Shut down both directions without releasing the descriptor.
    ///
    /// Wakes any thread blocked in a receive on this socket. Calling it on a
    /// closed or unconnected socket does nothing.
    pub fn shutdown(&self) {
        if let Some(socket) = self.inner.read().as_ref() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    /// Release the descriptor. Idempotent.
    pub fn close(&self) {
        // Unblock readers first so the write lock below can be taken.
        self.shutdown();
        if let Some(socket) = self.inner.write().take() {
            tracing::trace!(
                target: targets::SOCKET,
                local = ?socket.local_addr().ok().and_then(|a| a.as_socket()),
                "socket closed"
            );
        }
    }

    /// Whether an open descriptor is owned.
    pub fn is_valid(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Local address, if bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.with_socket(|s| s.local_addr())
            .ok()
            .and_then(|addr| addr.as_socket())
    }

    /// Remote address, if connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.with_socket(|s| s.peer_addr())
            .ok()
            .and_then(|addr| addr.as_socket())
    }

    /// Bound or ephemeral local port, or 0 if unavailable.
    pub fn local_port(&self) -> u16 {
        self.local_addr().map_or(0, |addr| addr.port())
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("valid", &self.is_valid())
            .field("local_addr", &self.local_addr())
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

static_assertions::assert_impl_all!(Socket: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_socket_is_invalid() {
        let socket = Socket::new();
        assert!(!socket.is_valid());
        assert_eq!(socket.local_port(), 0);
        assert!(socket.peer_addr().is_none());
    }

    #[test]
    fn test_io_on_invalid_socket_fails() {
        let socket = Socket::new();
        let mut buf = [0u8; 4];

        assert!(socket.send(b"x").is_err());
        assert!(socket.receive(&mut buf).is_err());
        assert!(socket.send_all(b"x").is_err());
        assert!(socket.recv_exact(&mut buf).is_err());
        assert!(socket.wait_readable(0).is_err());
        assert!(matches!(socket.listen(5), Err(NetworkError::InvalidSocket)));
        assert!(matches!(socket.set_timeouts(10, 10), Err(NetworkError::InvalidSocket)));
        assert!(matches!(socket.accept(), Err(NetworkError::Accept(_))));
    }

    #[test]
    fn test_bind_creates_descriptor() {
        let socket = Socket::new();
        socket.bind(0).unwrap();
        assert!(socket.is_valid());
        assert_ne!(socket.local_port(), 0);
    }

    #[test]
    fn test_open_has_descriptor() {
        let socket = Socket::open().unwrap();
        assert!(socket.is_valid());
        socket.set_timeouts(-1, 250).unwrap();
        socket.set_timeouts(0, 0).unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let socket = Socket::new();
        socket.close();
        socket.bind(0).unwrap();
        socket.close();
        socket.close();
        socket.shutdown();
        assert!(!socket.is_valid());
    }

    #[test]
    fn test_connect_rejects_non_numeric_address() {
        let socket = Socket::new();
        assert!(matches!(
            socket.connect("localhost", 80),
            Err(NetworkError::InvalidAddress(_))
        ));
        assert!(matches!(
            socket.connect("::1", 80),
            Err(NetworkError::InvalidAddress(_))
        ));
        assert!(!socket.is_valid());
    }

    #[test]
    fn test_wait_readable_times_out_on_idle_listener() {
        let socket = Socket::new();
        socket.bind(0).unwrap();
        socket.listen(5).unwrap();
        assert!(!socket.wait_readable(20).unwrap());
    }

    #[test]
    fn test_timeout_from_ms() {
        assert_eq!(timeout_from_ms(0), None);
        assert_eq!(timeout_from_ms(1500), Some(Duration::from_millis(1500)));
    }
}
