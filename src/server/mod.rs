//! Process HTTP connections on the server.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_lite::io::{AsyncRead, AsyncWrite};

use crate::error::ServerError;
use crate::handler::{HttpFilter, HttpHandler, WebSocketHandler};
use crate::routes::Routes;
use crate::socket::{Connection, Lifecycle, SocketServer, TcpTransport, Transport};

mod decode;
mod encode;
mod line_reader;
mod processor;

use processor::Processor;

/// Configure the server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// How often the accept loop checks for `stop`. Defaults to 100ms.
    pub(crate) accept_poll_interval: Duration,
    /// Receive buffer size, and so the longest accepted request or header
    /// line. Defaults to 8KiB.
    pub(crate) line_buffer_size: usize,
    /// Largest accepted request body. Defaults to 64KiB.
    pub(crate) max_request_body: usize,
    /// Largest WebSocket message delivered. Defaults to 64KiB.
    pub(crate) max_message_size: usize,
    /// Cap on concurrently served connections. Unbounded by default.
    pub(crate) max_connections: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            accept_poll_interval: Duration::from_millis(100),
            line_buffer_size: 8 * 1024,
            max_request_body: 64 * 1024,
            max_message_size: 64 * 1024,
            max_connections: None,
        }
    }
}

impl ServerOptions {
    /// Set how often the accept loop checks for `stop`.
    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// Set the receive buffer size.
    pub fn line_buffer_size(mut self, size: usize) -> Self {
        self.line_buffer_size = size;
        self
    }

    /// Set the largest accepted request body.
    pub fn max_request_body(mut self, size: usize) -> Self {
        self.max_request_body = size;
        self
    }

    /// Set the largest WebSocket message delivered to listeners.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Cap the number of connections served at once.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }
}

/// An HTTP/1.0 server with WebSocket upgrades.
///
/// Filters and handlers are registered before `start`; all registrations
/// are refused while the server runs.
pub struct HttpServer<T: Transport = TcpTransport> {
    socket: SocketServer<T>,
    processor: Arc<Processor>,
}

impl HttpServer<TcpTransport> {
    /// A TCP server with default options.
    pub fn new() -> Self {
        Self::with_options(ServerOptions::default())
    }

    /// A TCP server on every interface with the given options.
    pub fn with_options(options: ServerOptions) -> Self {
        Self::with_transport(TcpTransport::default(), options)
    }
}

impl Default for HttpServer<TcpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> HttpServer<T> {
    /// A server over a custom transport.
    pub fn with_transport(transport: T, options: ServerOptions) -> Self {
        let lifecycle = Arc::new(Lifecycle::default());
        let socket = SocketServer::with_lifecycle(transport, &options, lifecycle.clone());
        let processor = Arc::new(Processor {
            routes: Arc::new(Routes::new(lifecycle)),
            options,
        });
        // The lifecycle is fresh, so the handler cannot be refused.
        let _ = socket.set_handler_arc(processor.clone());
        Self { socket, processor }
    }

    /// Append a filter to the chain.
    pub fn add_filter(&self, filter: impl HttpFilter) -> Result<(), ServerError> {
        self.processor.routes.add_filter(Arc::new(filter))
    }

    /// Route requests whose path starts with `prefix` to `handler`.
    pub fn add_handler(
        &self,
        prefix: impl Into<String>,
        handler: impl HttpHandler,
    ) -> Result<(), ServerError> {
        self.processor
            .routes
            .add_handler(prefix.into(), Arc::new(handler))
    }

    /// Route WebSocket upgrades whose path starts with `prefix` to
    /// `handler`.
    pub fn add_websocket_handler(
        &self,
        prefix: impl Into<String>,
        handler: impl WebSocketHandler,
    ) -> Result<(), ServerError> {
        self.processor
            .routes
            .add_websocket_handler(prefix.into(), Arc::new(handler))
    }

    /// Start listening on `port`.
    pub fn start(&self, port: u16) -> Result<(), ServerError> {
        self.socket.start(port)
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        self.socket.stop()
    }

    /// Whether the server is running or still shutting down.
    pub fn is_running(&self) -> bool {
        self.socket.is_running()
    }

    /// The address bound by the most recent `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr()
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.socket.active_connections()
    }

    /// Register a callback fired each time the server stops.
    pub fn add_stopped_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.socket.add_stopped_listener(listener)
    }

    /// Serve a single connection on the current task.
    ///
    /// This is what the accept loop runs for every connection; calling it
    /// directly serves streams obtained elsewhere.
    pub async fn accept<S>(&self, conn: Connection<S>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static,
    {
        self.processor.process(conn).await
    }
}

impl<T: Transport + fmt::Debug> fmt::Debug for HttpServer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("socket", &self.socket)
            .field("routes", &self.processor.routes)
            .field("options", &self.processor.options)
            .finish()
    }
}
