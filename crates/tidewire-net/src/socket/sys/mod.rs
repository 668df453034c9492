//! Platform backends for readiness polling and send flags.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use self::unix::{SEND_FLAGS, poll};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use self::windows::{SEND_FLAGS, poll};

/// Readiness a caller waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interest {
    Readable,
    Writable,
}
