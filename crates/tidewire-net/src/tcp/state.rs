//! Server lifecycle state.

/// Current state of a TCP server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TcpServerState {
    /// Server is not running.
    #[default]
    Stopped,
    /// Worker pool and accept thread are being created.
    Starting,
    /// Accepting and serving connections.
    Running,
    /// Server is shutting down.
    Stopping,
}

impl std::fmt::Display for TcpServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}
