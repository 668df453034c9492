use std::io;
use std::os::fd::AsRawFd;

use super::Interest;

/// Suppress SIGPIPE on writes to a closed peer where the flag exists.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub(crate) const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
pub(crate) const SEND_FLAGS: libc::c_int = 0;

/// Wait until `socket` is ready for `interest` or `timeout_ms` elapses.
///
/// Hang-up and error conditions count as ready, so the caller's next I/O
/// call observes them.
pub(crate) fn poll(
    socket: &socket2::Socket,
    interest: Interest,
    timeout_ms: i32,
) -> io::Result<bool> {
    let events = match interest {
        Interest::Readable => libc::POLLIN,
        Interest::Writable => libc::POLLOUT,
    };
    let mut fd = libc::pollfd {
        fd: socket.as_raw_fd(),
        events,
        revents: 0,
    };

    loop {
        // SAFETY: `fd` points to exactly one initialised pollfd that outlives the call.
        let rc = unsafe { libc::poll(&mut fd, 1, timeout_ms.max(-1)) };
        if rc >= 0 {
            return Ok(rc > 0);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
