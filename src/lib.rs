//! Minimal embeddable HTTP/1.0 and WebSocket server.
//!
//! The stack is small enough for IoT-class hosts: a socket acceptor, a
//! line-oriented request parser, a before/after filter chain with
//! longest-prefix routing, and an RFC 6455 frame engine, all built
//! directly over async byte streams.
//!
//! ```txt
//!   accept -> parse -> before filters -> upgrade? -> ws frame engine
//!                                     \-> route   -> handler
//!          <- respond <- after filters <-/
//! ```
//!
//! Every connection carries exactly one request; there is no keep-alive.
//!
//! # Example
//!
//! ```no_run
//! use iotweb::{Context, HttpError, HttpServer, Request, Response};
//!
//! fn main() -> Result<(), iotweb::ServerError> {
//!     let server = HttpServer::new();
//!     server.add_handler(
//!         "/hello",
//!         |_uri: &str, _req: &Request, res: &mut Response, _ctx: &mut Context| {
//!             res.write_str("hello chashu");
//!             Ok::<(), HttpError>(())
//!         },
//!     )?;
//!     server.start(8000)?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code, future_incompatible, rust_2018_idioms)]
#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

use std::future::Future;
use std::pin::Pin;

pub use context::Context;
pub use cookie::Cookie;
pub use echo::EchoServer;
pub use error::{HttpError, ServerError, WsError};
pub use handler::{HttpFilter, HttpHandler, WebSocketHandler};
pub use headers::Headers;
pub use http_types::Method;
pub use request::Request;
pub use response::Response;
pub use server::{HttpServer, ServerOptions};
pub use socket::{Connection, ConnectionHandler, Listener, SocketServer, TcpTransport, Transport};
pub use status::ResponseCode;
pub use ws::WebSocket;

mod context;
mod cookie;
mod echo;
mod error;
mod handler;
mod request;
mod response;
mod routes;
mod status;

pub mod headers;
pub mod server;
pub mod socket;
pub mod ws;

/// An owned, boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
