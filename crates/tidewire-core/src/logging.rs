//! Logging facilities for Tidewire.
//!
//! Tidewire uses the `tracing` crate for instrumentation and never writes log
//! output itself. To see events, install a subscriber in the hosting
//! application, or enable the `subscriber` feature and call [`init`]:
//!
//! ```ignore
//! use tidewire_core::logging::{self, LogConfig, LogLevel};
//!
//! logging::init(&LogConfig::new(LogLevel::Debug).with_file("tidewire.log"))?;
//! ```
//!
//! Every subsystem logs under one of the [`targets`], so output can be
//! narrowed with directives such as `RUST_LOG=tidewire_net::server=debug`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{ConfigValue, FromConfigValue};

/// Target names for log filtering.
pub mod targets {
    /// Runtime-level events from [`log`](super::log).
    pub const ROOT: &str = "tidewire";
    /// Performance spans.
    pub const PERF: &str = "tidewire::perf";
    /// Core crate target.
    pub const CORE: &str = "tidewire_core";
    /// Thread pool target.
    pub const POOL: &str = "tidewire_core::pool";
    /// Configuration loading target.
    pub const CONFIG: &str = "tidewire_core::config";
    /// Timing utilities target.
    pub const TIMER: &str = "tidewire_core::timer";
    /// Socket layer target.
    pub const SOCKET: &str = "tidewire_net::socket";
    /// TCP client target.
    pub const CLIENT: &str = "tidewire_net::client";
    /// TCP server target.
    pub const SERVER: &str = "tidewire_net::server";
}

/// Severity levels accepted by [`log`].
///
/// `Critical` has no tracing counterpart and is emitted at `ERROR` with a
/// `critical = true` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Critical => "error",
        }
    }

    /// The equivalent `tracing` level.
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error | Self::Critical => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Error returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "critical" | "fatal" => Ok(Self::Critical),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl FromConfigValue for LogLevel {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Emit `message` at `level` under the crate-level target.
///
/// This is the `(level, message)` sink for callers that pick the level at
/// runtime; code with a fixed level should use the `tidewire_*!` macros.
pub fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(target: targets::ROOT, "{message}"),
        LogLevel::Debug => tracing::debug!(target: targets::ROOT, "{message}"),
        LogLevel::Info => tracing::info!(target: targets::ROOT, "{message}"),
        LogLevel::Warn => tracing::warn!(target: targets::ROOT, "{message}"),
        LogLevel::Error => tracing::error!(target: targets::ROOT, "{message}"),
        LogLevel::Critical => {
            tracing::error!(target: targets::ROOT, critical = true, "{message}")
        }
    }
}

/// Subscriber settings for [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Include the event target in each line.
    pub with_target: bool,
    /// Include the emitting thread's name in each line.
    pub with_thread_names: bool,
    /// Write to standard output.
    pub terminal: bool,
    /// Also append plain-text lines to this file, creating it if needed.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_target: true,
            with_thread_names: true,
            terminal: true,
            file: None,
        }
    }
}

impl LogConfig {
    /// Create a configuration with the given fallback level.
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set whether targets are printed.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Set whether thread names are printed.
    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.with_thread_names = enabled;
        self
    }

    /// Set whether events go to standard output.
    pub fn with_terminal(mut self, enabled: bool) -> Self {
        self.terminal = enabled;
        self
    }

    /// Append events to `path`.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

/// Build the subscriber described by `config` without installing it.
///
/// Fails only if the log file cannot be opened.
#[cfg(feature = "subscriber")]
pub fn subscriber(
    config: &LogConfig,
) -> std::io::Result<impl tracing::Subscriber + Send + Sync + 'static> {
    use std::fs::OpenOptions;
    use std::sync::Mutex;

    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let terminal = config.terminal.then(|| {
        fmt::layer()
            .with_target(config.with_target)
            .with_thread_names(config.with_thread_names)
    });

    let file = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(config.with_target)
                    .with_thread_names(config.with_thread_names)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(file))
}

/// Install a global subscriber built from `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `Ok(false)` if a
/// global subscriber was already installed, in which case nothing changes.
#[cfg(feature = "subscriber")]
pub fn init(config: &LogConfig) -> std::io::Result<bool> {
    let subscriber = subscriber(config)?;
    Ok(tracing::subscriber::set_global_default(subscriber).is_ok())
}

/// Performance tracing span guard.
///
/// Enters an `info` span named after the operation for as long as the guard
/// lives.
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[macro_export]
macro_rules! tidewire_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! tidewire_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! tidewire_info {
    ($($arg:tt)*) => {
        tracing::info!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! tidewire_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! tidewire_error {
    ($($arg:tt)*) => {
        tracing::error!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}
