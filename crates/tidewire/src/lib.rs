//! Tidewire: a length-framed, multi-client TCP server on a resizable worker
//! pool.
//!
//! This crate re-exports [`tidewire_core`] and [`tidewire_net`]. Most
//! programs only need the [`prelude`].
//!
//! ```no_run
//! use tidewire::prelude::*;
//!
//! let config = Config::new();
//! config.add_source(IniConfigSource::open("server.ini")?);
//!
//! let server = TcpServer::with_config(TcpServerConfig::from_config(&config, "server"));
//! server.serve(ServerHandlers::new().on_message(|id, _socket, data| {
//!     println!("{id} sent {} bytes", data.len());
//! }))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use tidewire_core::{config, logging, threadpool, timer};
pub use tidewire_net::{frame, socket, tcp};

/// Commonly used types.
pub mod prelude {
    pub use tidewire_core::{
        Config, ConfigSource, IniConfigSource, JsonConfigSource, LogLevel, MemorySource,
        ScopedTimer, Stopwatch, ThreadPool, ThreadPoolConfig,
    };
    pub use tidewire_net::{
        ClientId, NetworkError, ServerHandlers, Socket, TcpClient, TcpServer, TcpServerConfig,
        TcpServerState,
    };
}
