//! Core systems for Tidewire.
//!
//! This crate provides the pieces of the Tidewire server stack that do not
//! touch sockets:
//!
//! - **Thread Pool**: a worker pool whose population can grow and shrink at
//!   runtime, with FIFO task dispatch and draining shutdown
//! - **Configuration**: layered INI/JSON/in-memory sources with typed lookup
//! - **Logging**: `tracing` targets, helper macros, and optional subscriber setup
//! - **Timing**: stopwatch, scope timer, and a precise sleep
//!
//! # Thread Pool Example
//!
//! ```
//! use tidewire_core::ThreadPool;
//!
//! let pool = ThreadPool::new(4).unwrap();
//! let handles: Vec<_> = (0..8)
//!     .map(|i| pool.enqueue(move || i * i).unwrap())
//!     .collect();
//!
//! let total: i32 = handles.into_iter().filter_map(|h| h.wait()).sum();
//! assert_eq!(total, 140);
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod threadpool;
pub mod timer;

pub use config::{
    Config, ConfigSource, ConfigValue, FromConfigValue, IniConfigSource, JsonConfigSource,
    MemorySource,
};
pub use error::{ConfigError, CoreError, Result, ThreadPoolError};
pub use logging::{LogConfig, LogLevel, PerfSpan};
pub use threadpool::{TaskHandle, ThreadPool, ThreadPoolConfig, WorkerState};
pub use timer::{ScopedTimer, Stopwatch, hypersleep};
