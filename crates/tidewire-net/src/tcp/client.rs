//! Blocking TCP client with length-prefixed framing helpers.

use std::io;
use std::net::SocketAddr;

use tidewire_core::logging::targets;

use crate::error::Result;
use crate::frame;
use crate::socket::Socket;

/// A single outbound connection.
///
/// Raw [`send`](Self::send) / [`receive`](Self::receive) move exact byte
/// counts; [`send_frame`](Self::send_frame) / [`recv_frame`](Self::recv_frame)
/// exchange whole length-prefixed messages.
///
/// ```no_run
/// use tidewire_net::tcp::TcpClient;
///
/// let client = TcpClient::new();
/// client.connect("127.0.0.1", 7000, 5_000)?;
/// client.send_frame(b"hello")?;
/// let reply = client.recv_frame(5_000)?;
/// # Ok::<(), tidewire_net::NetworkError>(())
/// ```
#[derive(Debug, Default)]
pub struct TcpClient {
    socket: Socket,
}

impl TcpClient {
    /// Create an unconnected client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to `host:port`, then apply `timeout_ms` to both sends and
    /// receives.
    ///
    /// `host` must be a numeric IPv4 address. A zero timeout blocks forever
    /// and a negative one leaves the OS default in place. Any previous
    /// connection is closed first.
    pub fn connect(&self, host: &str, port: u16, timeout_ms: i64) -> Result<()> {
        if self.socket.is_valid() {
            self.socket.close();
        }
        self.socket.connect(host, port)?;
        self.socket.set_timeouts(timeout_ms, timeout_ms)?;
        tracing::debug!(
            target: targets::CLIENT,
            host,
            port,
            local_port = self.socket.local_port(),
            "connected"
        );
        Ok(())
    }

    /// Send all of `data`. See [`Socket::send_all`] for the result.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.socket.send_all(data)
    }

    /// Send the UTF-8 bytes of `text`.
    pub fn send_text(&self, text: &str) -> io::Result<usize> {
        self.send(text.as_bytes())
    }

    /// Fill `buf` completely. See [`Socket::recv_exact`] for the result.
    pub fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv_exact(buf)
    }

    /// Read whatever is available, up to `buf.len()` bytes, in one call.
    pub fn receive_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.receive(buf)
    }

    /// Send one length-prefixed frame.
    pub fn send_frame(&self, payload: &[u8]) -> Result<()> {
        frame::write_frame(&self.socket, payload)
    }

    /// Receive one length-prefixed frame, waiting up to `timeout_ms` for it
    /// to start arriving.
    pub fn recv_frame(&self, timeout_ms: i32) -> Result<Vec<u8>> {
        frame::read_frame(&self.socket, timeout_ms)
    }

    /// Whether the client holds a connected socket.
    pub fn is_connected(&self) -> bool {
        self.socket.peer_addr().is_some()
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.socket.close();
    }

    /// Local port of the connection, or 0.
    pub fn local_port(&self) -> u16 {
        self.socket.local_port()
    }

    /// Remote address, if connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket.peer_addr()
    }

    /// The underlying socket.
    pub fn socket(&self) -> &Socket {
        &self.socket
    }
}

static_assertions::assert_impl_all!(TcpClient: Send, Sync);
