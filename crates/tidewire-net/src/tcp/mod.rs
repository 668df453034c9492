//! Blocking TCP client and multi-client server.
//!
//! - **TcpClient**: one outbound connection with exact-count and framed I/O
//! - **TcpServer**: accepts connections and serves each on a pooled worker,
//!   with addressed and broadcast sends
//! - **ClientId**: per-server, never-reused connection identifier
//!
//! # Echo Server Example
//!
//! ```no_run
//! use tidewire_net::tcp::{ServerHandlers, TcpClient, TcpServer};
//!
//! let server = TcpServer::new();
//! server.bind(0)?;
//! server.listen(16)?;
//! server.start(
//!     2,
//!     ServerHandlers::new().on_message(|_id, socket, data| {
//!         let _ = socket.send_all(data);
//!     }),
//! )?;
//!
//! let client = TcpClient::new();
//! client.connect("127.0.0.1", server.port(), 1_000)?;
//! client.send(b"ping")?;
//!
//! let mut reply = [0u8; 4];
//! client.receive(&mut reply)?;
//! assert_eq!(&reply, b"ping");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod client;
mod config;
mod connection;
mod server;
mod state;

pub use client::TcpClient;
pub use config::TcpServerConfig;
pub use connection::ClientId;
pub use server::{ConnectHandler, DisconnectHandler, MessageHandler, ServerHandlers, TcpServer};
pub use state::TcpServerState;
