use std::io;
use std::net::SocketAddr;

use futures_lite::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;
use crate::server::ServerOptions;
use crate::socket::{Connection, ConnectionHandler, SocketServer, TcpTransport, Transport};
use crate::BoxFuture;

/// Writes back everything it receives until the peer closes.
#[derive(Debug, Default, Clone, Copy)]
struct Echo;

impl<S> ConnectionHandler<S> for Echo
where
    S: AsyncRead + AsyncWrite + Clone + Send + Unpin + 'static,
{
    fn handle(&self, conn: Connection<S>) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            let mut stream = conn.stream;
            let copied = futures_lite::io::copy(stream.clone(), &mut stream).await?;
            log::trace!("echoed {} bytes to {}", copied, conn.hostname);
            stream.close().await
        })
    }
}

/// A socket server that echoes each connection's bytes back to it.
#[derive(Debug)]
pub struct EchoServer<T: Transport = TcpTransport> {
    socket: SocketServer<T>,
}

impl EchoServer<TcpTransport> {
    /// An echo server over TCP.
    pub fn new() -> Self {
        Self::with_transport(TcpTransport::default())
    }
}

impl Default for EchoServer<TcpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> EchoServer<T> {
    /// An echo server over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        let socket = SocketServer::new(transport, &ServerOptions::default());
        // A new server is stopped, so the handler cannot be refused.
        let _ = socket.set_handler(Echo);
        Self { socket }
    }

    /// Start listening on `port`.
    pub fn start(&self, port: u16) -> Result<(), ServerError> {
        self.socket.start(port)
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        self.socket.stop()
    }

    /// The address bound by the most recent `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr()
    }

    /// Register a callback fired each time the server stops.
    pub fn add_stopped_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.socket.add_stopped_listener(listener)
    }
}
