//! The socket server: a poll-interrupted accept loop feeding a worker pool.
//!
//! The server knows nothing about HTTP. Each accepted stream is handed to a
//! [`ConnectionHandler`] on its own task; [`HttpServer`] and [`EchoServer`]
//! are two such handlers.
//!
//! [`HttpServer`]: crate::HttpServer
//! [`EchoServer`]: crate::EchoServer

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use async_io::{Async, Timer};
use futures_lite::io::{AsyncRead, AsyncWrite};
use futures_lite::FutureExt;
use parking_lot::{Mutex, RwLock};

use crate::error::ServerError;
use crate::server::ServerOptions;
use crate::BoxFuture;

/// Hostname reported for peers whose address is unknown.
const UNKNOWN_PEER: &str = "0.0.0.0";

/// A source of listening sockets.
pub trait Transport: Send + Sync + 'static {
    /// The duplex stream for one accepted connection.
    type Stream: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static;
    /// The bound listener.
    type Listener: Listener<Stream = Self::Stream>;

    /// Bind a listener on `port`.
    fn bind(&self, port: u16) -> io::Result<Self::Listener>;
}

/// A bound socket accepting connections.
pub trait Listener: Send + Sync + 'static {
    /// The duplex stream for one accepted connection.
    type Stream;

    /// Wait for the next connection and the peer's address, if known.
    ///
    /// Dropping the returned future must not lose a connection.
    fn accept(&self) -> BoxFuture<'_, io::Result<(Self::Stream, Option<SocketAddr>)>>;

    /// The address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// TCP sockets on a host address, `0.0.0.0` by default.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: IpAddr,
}

impl TcpTransport {
    /// Listen on every IPv4 interface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on a specific address.
    pub fn with_host(host: IpAddr) -> Self {
        Self { host }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Transport for TcpTransport {
    type Stream = async_dup::Arc<Async<TcpStream>>;
    type Listener = TcpAcceptor;

    fn bind(&self, port: u16) -> io::Result<TcpAcceptor> {
        let listener = Async::<TcpListener>::bind(SocketAddr::new(self.host, port))?;
        Ok(TcpAcceptor(listener))
    }
}

/// A bound TCP listener.
#[derive(Debug)]
pub struct TcpAcceptor(Async<TcpListener>);

impl Listener for TcpAcceptor {
    type Stream = async_dup::Arc<Async<TcpStream>>;

    fn accept(&self) -> BoxFuture<'_, io::Result<(Self::Stream, Option<SocketAddr>)>> {
        Box::pin(async move {
            let (stream, peer) = self.0.accept().await?;
            Ok((async_dup::Arc::new(stream), Some(peer)))
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.get_ref().local_addr()
    }
}

/// An accepted connection.
#[derive(Debug)]
pub struct Connection<S> {
    /// The peer's address as text, `0.0.0.0` when unknown.
    pub hostname: String,
    /// The duplex stream; closed once the handler returns.
    pub stream: S,
}

/// Processes accepted connections.
pub trait ConnectionHandler<S>: Send + Sync + 'static {
    /// Serve one connection to completion.
    fn handle(&self, conn: Connection<S>) -> BoxFuture<'_, io::Result<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    Running,
    Stopping,
}

/// Run state shared between a server, its accept loop and its registries.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Mutex<State>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Stopped),
        }
    }
}

impl Lifecycle {
    pub(crate) fn begin(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock();
        if *state != State::Stopped {
            return Err(ServerError::AlreadyRunning);
        }
        *state = State::Running;
        Ok(())
    }

    /// True from `begin` until the accept loop has fully exited.
    pub(crate) fn is_running(&self) -> bool {
        *self.state.lock() != State::Stopped
    }

    pub(crate) fn request_stop(&self) {
        let mut state = self.state.lock();
        if *state == State::Running {
            *state = State::Stopping;
        }
    }

    fn should_accept(&self) -> bool {
        *self.state.lock() == State::Running
    }

    fn finish(&self) {
        *self.state.lock() = State::Stopped;
    }
}

type StoppedListener = Arc<dyn Fn() + Send + Sync>;

/// Runs connection handlers, optionally bounding how many run at once.
#[derive(Debug, Clone)]
struct WorkerPool {
    slots: Option<(Sender<()>, Receiver<()>)>,
    active: Arc<AtomicUsize>,
}

/// Held by a running worker; frees its slot on drop, even on panic.
struct Permit {
    slots: Option<Receiver<()>>,
    active: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(slots) = &self.slots {
            let _ = slots.try_recv();
        }
    }
}

impl WorkerPool {
    fn new(max_connections: Option<usize>, active: Arc<AtomicUsize>) -> Self {
        Self {
            slots: max_connections.map(|max| async_channel::bounded(max.max(1))),
            active,
        }
    }

    /// Wait for a free slot. Gives up once `lifecycle` stops accepting,
    /// rechecking every `poll_interval`.
    async fn acquire(&self, lifecycle: &Lifecycle, poll_interval: Duration) -> Option<Permit> {
        if let Some((slots, _)) = &self.slots {
            loop {
                let sent = async { Some(slots.send(()).await.is_ok()) }
                    .or(async {
                        Timer::after(poll_interval).await;
                        None
                    })
                    .await;
                match sent {
                    Some(true) => break,
                    Some(false) => return None,
                    None if !lifecycle.should_accept() => return None,
                    None => {}
                }
            }
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        Some(Permit {
            slots: self.slots.as_ref().map(|(_, rx)| rx.clone()),
            active: self.active.clone(),
        })
    }

    /// Serve `conn` on its own task, holding `permit` until it finishes.
    fn spawn<S>(
        &self,
        permit: Permit,
        handler: Arc<dyn ConnectionHandler<S>>,
        conn: Connection<S>,
    ) where
        S: Send + 'static,
    {
        async_global_executor::spawn(async move {
            let _permit = permit;
            let hostname = conn.hostname.clone();
            match AssertUnwindSafe(handler.handle(conn)).catch_unwind().await {
                Ok(Ok(())) => log::trace!("connection from {} finished", hostname),
                Ok(Err(err)) => log::debug!("connection from {} failed: {}", hostname, err),
                Err(_) => log::error!("connection handler panicked serving {}", hostname),
            }
        })
        .detach();
    }
}

/// Accepts connections on a port and hands each to a [`ConnectionHandler`].
pub struct SocketServer<T: Transport = TcpTransport> {
    transport: T,
    poll_interval: Duration,
    max_connections: Option<usize>,
    handler: RwLock<Option<Arc<dyn ConnectionHandler<T::Stream>>>>,
    lifecycle: Arc<Lifecycle>,
    local_addr: Mutex<Option<SocketAddr>>,
    stopped_listeners: Arc<Mutex<Vec<StoppedListener>>>,
    active: Arc<AtomicUsize>,
}

impl SocketServer<TcpTransport> {
    /// A TCP server with default options.
    pub fn tcp() -> Self {
        Self::new(TcpTransport::default(), &ServerOptions::default())
    }
}

impl<T: Transport> SocketServer<T> {
    /// Create a stopped server over `transport`.
    pub fn new(transport: T, options: &ServerOptions) -> Self {
        Self::with_lifecycle(transport, options, Arc::default())
    }

    pub(crate) fn with_lifecycle(
        transport: T,
        options: &ServerOptions,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            transport,
            poll_interval: options.accept_poll_interval,
            max_connections: options.max_connections,
            handler: RwLock::new(None),
            lifecycle,
            local_addr: Mutex::new(None),
            stopped_listeners: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Install the handler that serves accepted connections.
    pub fn set_handler<H>(&self, handler: H) -> Result<(), ServerError>
    where
        H: ConnectionHandler<T::Stream>,
    {
        self.set_handler_arc(Arc::new(handler))
    }

    pub(crate) fn set_handler_arc(
        &self,
        handler: Arc<dyn ConnectionHandler<T::Stream>>,
    ) -> Result<(), ServerError> {
        let mut slot = self.handler.write();
        if self.lifecycle.is_running() {
            return Err(ServerError::RegistrationWhileRunning);
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Register a callback fired each time the accept loop exits.
    pub fn add_stopped_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stopped_listeners.lock().push(Arc::new(listener));
    }

    /// Bind `port` and start accepting in the background.
    ///
    /// Port 0 binds an ephemeral port; see [`local_addr`](Self::local_addr).
    pub fn start(&self, port: u16) -> Result<(), ServerError> {
        let handler = self.handler.read().clone().ok_or(ServerError::NoHandler)?;
        self.lifecycle.begin()?;

        let listener = match self.transport.bind(port) {
            Ok(listener) => listener,
            Err(err) => {
                self.lifecycle.finish();
                return Err(err.into());
            }
        };
        let addr = listener.local_addr().ok();
        *self.local_addr.lock() = addr;
        log::info!("listening on {:?}", addr);

        let accept = AcceptLoop {
            listener,
            handler,
            pool: WorkerPool::new(self.max_connections, self.active.clone()),
            lifecycle: self.lifecycle.clone(),
            poll_interval: self.poll_interval,
            stopped_listeners: self.stopped_listeners.clone(),
        };
        async_global_executor::spawn(accept.run()).detach();
        Ok(())
    }

    /// Ask the accept loop to exit.
    ///
    /// Returns immediately; the loop notices within one poll interval and
    /// then fires the stopped listeners. Connections already accepted run
    /// to completion.
    pub fn stop(&self) {
        self.lifecycle.request_stop();
    }

    /// Whether the server is running or still shutting down.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// The address bound by the most recent `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl<T: Transport> Drop for SocketServer<T> {
    fn drop(&mut self) {
        self.lifecycle.request_stop();
    }
}

impl<T: Transport + fmt::Debug> fmt::Debug for SocketServer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketServer")
            .field("transport", &self.transport)
            .field("lifecycle", &self.lifecycle)
            .field("local_addr", &self.local_addr())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

struct AcceptLoop<L: Listener> {
    listener: L,
    handler: Arc<dyn ConnectionHandler<L::Stream>>,
    pool: WorkerPool,
    lifecycle: Arc<Lifecycle>,
    poll_interval: Duration,
    stopped_listeners: Arc<Mutex<Vec<StoppedListener>>>,
}

impl<L> AcceptLoop<L>
where
    L: Listener,
    L::Stream: Send + 'static,
{
    async fn run(self) {
        let poll_interval = self.poll_interval;
        while self.lifecycle.should_accept() {
            let accepted = async { Some(self.listener.accept().await) }
                .or(async {
                    Timer::after(poll_interval).await;
                    None
                })
                .await;

            let (stream, peer) = match accepted {
                None => continue,
                Some(Ok(accepted)) => accepted,
                Some(Err(err)) => {
                    log::warn!("accept failed: {}", err);
                    Timer::after(poll_interval).await;
                    continue;
                }
            };

            let hostname = peer
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| UNKNOWN_PEER.to_owned());
            log::trace!("accepted connection from {}", hostname);
            match self.pool.acquire(&self.lifecycle, poll_interval).await {
                Some(permit) => {
                    let conn = Connection { hostname, stream };
                    self.pool.spawn(permit, self.handler.clone(), conn);
                }
                None => log::debug!("dropped connection from {} while stopping", hostname),
            }
        }

        let AcceptLoop {
            listener,
            lifecycle,
            stopped_listeners,
            ..
        } = self;
        drop(listener);
        lifecycle.finish();
        log::info!("socket server stopped");

        let listeners = stopped_listeners.lock().clone();
        for listener in listeners {
            listener();
        }
    }
}
