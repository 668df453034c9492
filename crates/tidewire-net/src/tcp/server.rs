//! Multi-client TCP server.
//!
//! One accept thread hands each new connection to a worker pool. A worker
//! owns the connection's receive loop until the peer goes away, so the pool
//! size bounds how many connections are read concurrently; extra connections
//! wait in the pool queue but can already be written to.
//!
//! Inbound bytes are delivered raw: one `on_message` call carries whatever a
//! single receive returned, which need not match the sender's message
//! boundaries. Peers that need message boundaries should exchange frames
//! (see [`crate::frame`]) and reassemble them in the handler.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tidewire_core::logging::targets;
use tidewire_core::{ThreadPool, ThreadPoolConfig};

use super::config::TcpServerConfig;
use super::connection::{ClientId, Registry};
use super::state::TcpServerState;
use crate::error::{NetworkError, Result};
use crate::frame;
use crate::socket::Socket;

/// Called on the accept thread after a connection is registered.
pub type ConnectHandler = Arc<dyn Fn(ClientId, &Arc<Socket>) + Send + Sync>;
/// Called on the connection's worker thread for every chunk received.
pub type MessageHandler = Arc<dyn Fn(ClientId, &Arc<Socket>, &[u8]) + Send + Sync>;
/// Called on the connection's worker thread once its receive loop ends.
pub type DisconnectHandler = Arc<dyn Fn(ClientId) + Send + Sync>;

/// The callbacks a server delivers events to. Unset callbacks are skipped.
#[derive(Clone, Default)]
pub struct ServerHandlers {
    on_connect: Option<ConnectHandler>,
    on_message: Option<MessageHandler>,
    on_disconnect: Option<DisconnectHandler>,
}

impl ServerHandlers {
    /// Create an empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect callback.
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(ClientId, &Arc<Socket>) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Set the message callback.
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(ClientId, &Arc<Socket>, &[u8]) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Set the disconnect callback.
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(ClientId) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    fn connected(&self, id: ClientId, socket: &Arc<Socket>) {
        if let Some(f) = &self.on_connect {
            f(id, socket);
        }
    }

    fn message(&self, id: ClientId, socket: &Arc<Socket>, data: &[u8]) {
        if let Some(f) = &self.on_message {
            f(id, socket, data);
        }
    }

    fn disconnected(&self, id: ClientId) {
        if let Some(f) = &self.on_disconnect {
            f(id);
        }
    }
}

impl fmt::Debug for ServerHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

/// State shared with the accept thread and connection tasks.
struct ServerShared {
    registry: Registry,
    running: AtomicBool,
    state: Mutex<TcpServerState>,
}

impl ServerShared {
    fn set_state(&self, state: TcpServerState) {
        *self.state.lock() = state;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Removes a connection from the registry and closes it when dropped, so a
/// panicking callback cannot leak the entry.
struct Deregister<'a> {
    shared: &'a ServerShared,
    id: ClientId,
    socket: &'a Socket,
}

impl Drop for Deregister<'_> {
    fn drop(&mut self) {
        self.shared.registry.remove(self.id);
        self.socket.close();
    }
}

/// One connection's receive loop.
#[derive(Clone)]
struct Session {
    id: ClientId,
    socket: Arc<Socket>,
    shared: Arc<ServerShared>,
    handlers: ServerHandlers,
    buffer_size: usize,
}

impl Session {
    fn run(self) {
        let _deregister = Deregister {
            shared: &*self.shared,
            id: self.id,
            socket: &*self.socket,
        };

        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            match self.socket.receive(&mut buffer) {
                Ok(0) => break,
                Ok(n) => self.handlers.message(self.id, &self.socket, &buffer[..n]),
                Err(e) => {
                    tracing::debug!(
                        target: targets::SERVER,
                        client = %self.id,
                        error = %e,
                        "receive ended"
                    );
                    break;
                }
            }
        }

        self.handlers.disconnected(self.id);
        tracing::info!(target: targets::SERVER, client = %self.id, "client disconnected");
    }
}

/// Everything the accept thread needs.
struct AcceptLoop {
    listener: Arc<Socket>,
    shared: Arc<ServerShared>,
    pool: Arc<ThreadPool>,
    handlers: ServerHandlers,
    config: TcpServerConfig,
}

impl AcceptLoop {
    fn run(self) {
        tracing::debug!(
            target: targets::SERVER,
            port = self.listener.local_port(),
            "accept loop started"
        );

        while self.shared.is_running() {
            match self.listener.accept() {
                Ok(socket) => {
                    if !self.shared.is_running() {
                        socket.close();
                        break;
                    }
                    self.admit(socket);
                }
                Err(e) => {
                    if !self.shared.is_running() {
                        break;
                    }
                    tracing::warn!(target: targets::SERVER, error = %e, "accept failed");
                    thread::sleep(self.config.accept_backoff);
                }
            }
        }

        tracing::debug!(target: targets::SERVER, "accept loop exited");
    }

    fn admit(&self, socket: Socket) {
        if self.config.no_delay
            && let Err(e) = socket.set_nodelay(true)
        {
            tracing::debug!(target: targets::SERVER, error = %e, "failed to set TCP_NODELAY");
        }

        let socket = Arc::new(socket);
        let id = self.shared.registry.next_id();
        self.shared.registry.insert(id, socket.clone());
        tracing::info!(
            target: targets::SERVER,
            client = %id,
            peer = ?socket.peer_addr(),
            "client connected"
        );

        self.handlers.connected(id, &socket);

        let session = Session {
            id,
            socket,
            shared: self.shared.clone(),
            handlers: self.handlers.clone(),
            buffer_size: self.config.read_buffer_size.max(1),
        };
        let fallback = session.clone();
        if let Err(e) = self.pool.enqueue(move || session.run()) {
            tracing::warn!(
                target: targets::SERVER,
                client = %id,
                error = %e,
                "pool unavailable, serving inline"
            );
            fallback.run();
        }
    }
}

/// A TCP server that serves each connection on a pooled worker.
///
/// ```no_run
/// use tidewire_net::tcp::{ServerHandlers, TcpServer};
///
/// let server = TcpServer::new();
/// server.bind(7000)?;
/// server.listen(16)?;
///
/// let handlers = ServerHandlers::new()
///     .on_connect(|id, _socket| println!("{id} connected"))
///     .on_message(|_id, socket, data| {
///         let _ = socket.send_all(data);
///     })
///     .on_disconnect(|id| println!("{id} left"));
/// server.start(4, handlers)?;
///
/// server.broadcast_text("hello everyone");
/// server.stop();
/// # Ok::<(), tidewire_net::NetworkError>(())
/// ```
pub struct TcpServer {
    config: TcpServerConfig,
    listener: Arc<Socket>,
    shared: Arc<ServerShared>,
    pool: Mutex<Option<Arc<ThreadPool>>>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl TcpServer {
    /// Create a stopped server with default settings.
    pub fn new() -> Self {
        Self::with_config(TcpServerConfig::default())
    }

    /// Create a stopped server with the given settings.
    pub fn with_config(config: TcpServerConfig) -> Self {
        Self {
            config,
            listener: Arc::new(Socket::new()),
            shared: Arc::new(ServerShared {
                registry: Registry::new(),
                running: AtomicBool::new(false),
                state: Mutex::new(TcpServerState::Stopped),
            }),
            pool: Mutex::new(None),
            accept_thread: Mutex::new(None),
        }
    }

    /// The server's settings.
    pub fn config(&self) -> &TcpServerConfig {
        &self.config
    }

    /// Bind the listening socket to `port` on all interfaces.
    pub fn bind(&self, port: u16) -> Result<()> {
        self.listener.bind(port)
    }

    /// Start listening with the given backlog.
    pub fn listen(&self, backlog: i32) -> Result<()> {
        self.listener.listen(backlog)
    }

    /// Bind, listen and start using the configured port, backlog and worker
    /// count.
    pub fn serve(&self, handlers: ServerHandlers) -> Result<()> {
        self.bind(self.config.port)?;
        self.listen(self.config.backlog)?;
        self.start(self.config.workers, handlers)
    }

    /// Start the worker pool and the accept thread.
    ///
    /// Calling this while already running does nothing. The socket must
    /// already be listening.
    pub fn start(&self, workers: usize, handlers: ServerHandlers) -> Result<()> {
        if !self.listener.is_valid() {
            return Err(NetworkError::InvalidSocket);
        }
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.set_state(TcpServerState::Starting);

        if let Err(e) = self.spawn_runtime(workers, handlers) {
            self.shared.running.store(false, Ordering::Release);
            self.shared.set_state(TcpServerState::Stopped);
            return Err(e);
        }

        self.shared.set_state(TcpServerState::Running);
        tracing::info!(target: targets::SERVER, port = self.port(), workers, "server started");
        Ok(())
    }

    fn spawn_runtime(&self, workers: usize, handlers: ServerHandlers) -> Result<()> {
        let pool = Arc::new(ThreadPool::with_config(
            ThreadPoolConfig::with_threads(workers).thread_name("tidewire-conn"),
        )?);

        let accept_loop = AcceptLoop {
            listener: self.listener.clone(),
            shared: self.shared.clone(),
            pool: pool.clone(),
            handlers,
            config: self.config.clone(),
        };
        let handle = thread::Builder::new()
            .name("tidewire-accept".to_string())
            .spawn(move || accept_loop.run())?;

        *self.pool.lock() = Some(pool);
        *self.accept_thread.lock() = Some(handle);
        Ok(())
    }

    /// Stop accepting, close every connection and tear down the pool.
    ///
    /// Returns once the accept thread has exited and every connection task
    /// has finished. Calling this while stopped does nothing.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.set_state(TcpServerState::Stopping);
        tracing::info!(target: targets::SERVER, port = self.port(), "stopping server");

        self.listener.shutdown();
        self.wake_accept_loop();

        let accept_thread = self.accept_thread.lock().take();
        if let Some(handle) = accept_thread {
            if handle.thread().id() == thread::current().id() {
                // Stopped from a connect callback; the loop exits on its own.
                tracing::debug!(target: targets::SERVER, "stop called on accept thread");
            } else if handle.join().is_err() {
                tracing::error!(target: targets::SERVER, "accept thread panicked");
            }
        }
        self.listener.close();

        for socket in self.shared.registry.drain() {
            socket.close();
        }

        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.shutdown();
        }

        self.shared.set_state(TcpServerState::Stopped);
        tracing::info!(target: targets::SERVER, "server stopped");
    }

    /// Unblock an `accept` that the listener shutdown did not interrupt.
    fn wake_accept_loop(&self) {
        let port = self.listener.local_port();
        if port == 0 {
            return;
        }
        let waker = Socket::new();
        let _ = waker.connect("127.0.0.1", port);
        waker.close();
    }

    /// Whether the server is running.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TcpServerState {
        *self.shared.state.lock()
    }

    /// The bound port, or 0.
    pub fn port(&self) -> u16 {
        self.listener.local_port()
    }

    /// The bound address, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Send all of `data` to one client.
    pub fn send_to(&self, id: ClientId, data: &[u8]) -> Result<()> {
        let socket = self.client_socket(id)?;
        NetworkError::check_transfer(data.len(), socket.send_all(data))
    }

    /// Send the UTF-8 bytes of `text` to one client.
    pub fn send_text_to(&self, id: ClientId, text: &str) -> Result<()> {
        self.send_to(id, text.as_bytes())
    }

    /// Send one length-prefixed frame to one client.
    pub fn send_frame_to(&self, id: ClientId, payload: &[u8]) -> Result<()> {
        let socket = self.client_socket(id)?;
        frame::write_frame(&socket, payload)
    }

    fn client_socket(&self, id: ClientId) -> Result<Arc<Socket>> {
        self.shared
            .registry
            .get(id)
            .ok_or(NetworkError::UnknownClient(id))
    }

    /// Send `data` to every connected client.
    ///
    /// Returns how many clients received all of it. A failure for one client
    /// does not stop delivery to the others.
    pub fn broadcast(&self, data: &[u8]) -> usize {
        self.shared
            .registry
            .sockets()
            .iter()
            .filter(|socket| matches!(socket.send_all(data), Ok(n) if n == data.len()))
            .count()
    }

    /// Send the UTF-8 bytes of `text` to every connected client.
    pub fn broadcast_text(&self, text: &str) -> usize {
        self.broadcast(text.as_bytes())
    }

    /// Ids of all connected clients, ascending.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.shared.registry.ids()
    }

    /// Number of connected clients.
    pub fn num_clients(&self) -> usize {
        self.shared.registry.len()
    }

    /// Disconnect one client.
    ///
    /// Its receive loop sees the closure on its next read and fires
    /// `on_disconnect`. Returns `false` if the id is unknown.
    pub fn close_client(&self, id: ClientId) -> bool {
        match self.shared.registry.remove(id) {
            Some(socket) => {
                socket.close();
                tracing::debug!(target: targets::SERVER, client = %id, "client closed by server");
                true
            }
            None => false,
        }
    }
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpServer")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("num_clients", &self.num_clients())
            .finish()
    }
}

static_assertions::assert_impl_all!(TcpServer: Send, Sync);
