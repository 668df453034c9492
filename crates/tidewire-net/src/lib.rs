//! Networking for Tidewire.
//!
//! This crate provides a blocking, thread-per-worker TCP stack:
//!
//! - **Socket**: one IPv4 TCP descriptor behind a platform-neutral API, with
//!   single-call and exact-count transfers, timeouts, and readiness polling
//! - **Framing**: 4-byte big-endian length-prefixed messages
//! - **TcpClient**: a connection façade with framed send/receive
//! - **TcpServer**: an accept loop feeding a resizable worker pool, a registry
//!   of live connections, addressed sends, broadcast, and forced disconnects
//!
//! Server settings can be read from a layered [`tidewire_core::Config`] with
//! [`TcpServerConfig::from_config`](tcp::TcpServerConfig::from_config).

pub mod error;
pub mod frame;
pub mod socket;
pub mod tcp;

pub use error::{NetworkError, Result};
pub use frame::{FRAME_HEADER_LEN, read_frame, write_frame};
pub use socket::Socket;
pub use tcp::{ClientId, ServerHandlers, TcpClient, TcpServer, TcpServerConfig, TcpServerState};
