use std::io;
use std::os::windows::io::AsRawSocket;

use ::windows::Win32::Networking::WinSock::{POLLRDNORM, POLLWRNORM, SOCKET, WSAPOLLFD, WSAPoll};

use super::Interest;

/// Winsock never raises SIGPIPE.
pub(crate) const SEND_FLAGS: i32 = 0;

/// Wait until `socket` is ready for `interest` or `timeout_ms` elapses.
pub(crate) fn poll(
    socket: &socket2::Socket,
    interest: Interest,
    timeout_ms: i32,
) -> io::Result<bool> {
    let events = match interest {
        Interest::Readable => POLLRDNORM,
        Interest::Writable => POLLWRNORM,
    };
    let mut fd = WSAPOLLFD {
        fd: SOCKET(socket.as_raw_socket() as usize),
        events,
        revents: Default::default(),
    };

    // SAFETY: `fd` points to exactly one initialised WSAPOLLFD that outlives the call.
    let rc = unsafe { WSAPoll(&mut fd, 1, timeout_ms.max(-1)) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc > 0)
}
