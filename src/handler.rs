//! Application-facing handler and filter traits.

use crate::context::Context;
use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;
use crate::ws::WebSocket;

/// Handles requests routed to a URI prefix.
///
/// `uri` is the part of the request path after the matched prefix. A
/// returned error replaces the response status and reason message.
pub trait HttpHandler: Send + Sync + 'static {
    /// Handle one request.
    fn handle(
        &self,
        uri: &str,
        request: &Request,
        response: &mut Response,
        context: &mut Context,
    ) -> Result<(), HttpError>;
}

impl<F> HttpHandler for F
where
    F: Fn(&str, &Request, &mut Response, &mut Context) -> Result<(), HttpError>
        + Send
        + Sync
        + 'static,
{
    fn handle(
        &self,
        uri: &str,
        request: &Request,
        response: &mut Response,
        context: &mut Context,
    ) -> Result<(), HttpError> {
        (self)(uri, request, response, context)
    }
}

/// Middleware run around request dispatch.
///
/// Filters run in registration order. An error from either method is
/// logged and otherwise ignored; it never aborts the rest of the chain.
pub trait HttpFilter: Send + Sync + 'static {
    /// Called after the request is parsed and before it is dispatched.
    ///
    /// Returning `false` prevents dispatch to a handler (and any WebSocket
    /// upgrade); the remaining `before` calls are skipped but every
    /// `after` still runs.
    fn before(
        &self,
        _request: &Request,
        _response: &mut Response,
        _context: &mut Context,
    ) -> Result<bool, HttpError> {
        Ok(true)
    }

    /// Called once the request has been handled, whatever the outcome.
    fn after(
        &self,
        _request: &Request,
        _response: &mut Response,
        _context: &mut Context,
    ) -> Result<(), HttpError> {
        Ok(())
    }
}

/// Accepts WebSocket upgrades for a URI prefix.
pub trait WebSocketHandler: Send + Sync + 'static {
    /// Whether to accept an upgrade for `uri` (the part after the matched
    /// prefix) speaking `protocol`. `protocol` is empty when the client
    /// did not ask for one.
    fn will_accept(&self, uri: &str, protocol: &str) -> bool;

    /// Called with the live socket once the handshake response is sent.
    ///
    /// Attach listeners here; frames are not read until this returns.
    fn connected(&self, socket: WebSocket);
}
