//! Error types for the networking crate.

use std::io;

use tidewire_core::ThreadPoolError;

use crate::tcp::ClientId;

/// Result type alias for networking operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Network-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The OS could not create a socket. Nothing else can work without one.
    #[error("failed to create socket: {0}")]
    Create(#[source] io::Error),

    /// Binding to the requested port failed.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Marking the socket passive failed.
    #[error("failed to listen: {0}")]
    Listen(#[source] io::Error),

    /// Connecting to a remote peer failed.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Accepting an inbound connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The address is not a numeric IPv4 address.
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// The operation needs an open descriptor and there is none.
    #[error("socket is not open")]
    InvalidSocket,

    /// No live connection has this id.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// The peer closed before the full byte count was transferred.
    #[error("transfer incomplete: {transferred} of {expected} bytes")]
    Incomplete { expected: usize, transferred: usize },

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Disconnected,

    /// A readiness wait elapsed.
    #[error("operation timed out")]
    Timeout,

    /// A payload is too large for a 32-bit length prefix.
    #[error("frame payload of {0} bytes exceeds the 4 GiB limit")]
    FrameTooLarge(usize),

    /// The worker pool rejected the operation.
    #[error(transparent)]
    Pool(#[from] ThreadPoolError),

    /// Any other socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NetworkError {
    /// Create a bind error.
    pub fn bind(port: u16, source: io::Error) -> Self {
        Self::Bind { port, source }
    }

    /// Create a connect error.
    pub fn connect(address: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            address: address.into(),
            source,
        }
    }

    /// Map the result of an exact-count transfer onto an error, if any.
    ///
    /// `Ok(transferred)` shorter than `expected` means the peer closed.
    pub(crate) fn check_transfer(expected: usize, result: io::Result<usize>) -> Result<()> {
        match result {
            Ok(n) if n == expected => Ok(()),
            Ok(0) => Err(Self::Disconnected),
            Ok(transferred) => Err(Self::Incomplete {
                expected,
                transferred,
            }),
            Err(e) => Err(Self::Io(e)),
        }
    }

    /// Whether this error means the connection is gone rather than misused.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected | Self::Incomplete { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_transfer() {
        assert!(NetworkError::check_transfer(4, Ok(4)).is_ok());
        assert!(NetworkError::check_transfer(0, Ok(0)).is_ok());
        assert!(matches!(
            NetworkError::check_transfer(4, Ok(0)),
            Err(NetworkError::Disconnected)
        ));
        assert!(matches!(
            NetworkError::check_transfer(4, Ok(2)),
            Err(NetworkError::Incomplete {
                expected: 4,
                transferred: 2
            })
        ));
        let err =
            NetworkError::check_transfer(4, Err(io::ErrorKind::BrokenPipe.into())).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_display() {
        let err = NetworkError::bind(80, io::ErrorKind::AddrInUse.into());
        assert!(err.to_string().starts_with("failed to bind port 80"));
        assert_eq!(
            NetworkError::UnknownClient(ClientId::new(7)).to_string(),
            "unknown client client-7"
        );
    }
}
