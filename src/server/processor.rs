//! Serve one request per connection.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_lite::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Cursor};

use super::decode::{decode, Decoded};
use super::encode::encode;
use super::line_reader::LineReader;
use super::ServerOptions;
use crate::context::Context;
use crate::error::HttpError;
use crate::handler::{HttpFilter, WebSocketHandler};
use crate::request::Request;
use crate::response::Response;
use crate::routes::Routes;
use crate::socket::{Connection, ConnectionHandler};
use crate::status::ResponseCode;
use crate::ws::{self, WebSocket};
use crate::BoxFuture;

/// The [`ConnectionHandler`] behind an `HttpServer`.
#[derive(Debug)]
pub(crate) struct Processor {
    pub(crate) routes: Arc<Routes>,
    pub(crate) options: ServerOptions,
}

impl<S> ConnectionHandler<S> for Processor
where
    S: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static,
{
    fn handle(&self, conn: Connection<S>) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(self.process(conn))
    }
}

/// A WebSocket accepted during dispatch, waiting for the response head to
/// go out.
struct Upgrade {
    handler: Arc<dyn WebSocketHandler>,
    socket: WebSocket,
    frames: async_channel::Receiver<Vec<u8>>,
}

impl Processor {
    pub(crate) async fn process<S>(&self, conn: Connection<S>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static,
    {
        let Connection { hostname, stream } = conn;
        let mut writer = stream.clone();
        let mut reader = LineReader::new(stream, self.options.line_buffer_size);

        let (req, error) = match decode(&mut reader, &self.options).await {
            Decoded::Request(req) => (req, None),
            Decoded::Rejected(req, err) => (req, Some(err)),
            Decoded::Closed => return writer.close().await,
        };
        log::trace!("{} {} {}", hostname, req.method(), req.uri());

        let mut res = Response::new();
        let mut ctx = Context::new();
        let upgrade = self.respond(&req, &mut res, &mut ctx, error);

        let code = res.code();
        writer.write_all(&encode(res)?).await?;
        writer.flush().await?;
        log::trace!("{} {} -> {}", req.method(), req.uri(), code);

        if let Some(Upgrade {
            handler,
            socket,
            frames,
        }) = upgrade
        {
            let connected =
                panic::catch_unwind(AssertUnwindSafe(|| handler.connected(socket.clone())));
            if connected.is_err() {
                log::error!("websocket handler panicked on connect for {}", req.uri());
                socket.close();
            }

            let (stream, leftover) = reader.into_parts();
            let reader = Cursor::new(leftover).chain(stream);
            ws::run(socket, frames, reader, &mut writer, self.options.max_message_size).await;
        }

        writer.close().await
    }

    /// Run the filters and the matching handler, leaving the outcome in
    /// `res`. Returns the accepted WebSocket if the request was upgraded.
    fn respond(
        &self,
        req: &Request,
        res: &mut Response,
        ctx: &mut Context,
        mut error: Option<HttpError>,
    ) -> Option<Upgrade> {
        let filters = self.routes.filters();
        let mut upgrade = None;

        if error.is_none() && self.run_before_filters(&filters, req, res, ctx) {
            upgrade = self.try_upgrade(req, res);
            if upgrade.is_none() {
                if let Err(err) = self.dispatch(req, res, ctx) {
                    error = Some(err);
                }
            }
        }

        for filter in &filters {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| filter.after(req, res, ctx)));
            log_filter_failure("after", req, outcome);
        }

        if let Some(err) = error {
            res.apply_error(err.code(), err.message());
        }
        if upgrade.is_some() && res.code() != ResponseCode::SwitchingProtocols {
            log::trace!("upgrade of {} replaced by a {} response", req.uri(), res.code().code());
            upgrade = None;
        }
        upgrade
    }

    /// Returns false if a filter vetoed handling.
    fn run_before_filters(
        &self,
        filters: &[Arc<dyn HttpFilter>],
        req: &Request,
        res: &mut Response,
        ctx: &mut Context,
    ) -> bool {
        for filter in filters {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| filter.before(req, res, ctx)));
            match outcome {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    log::trace!("filter vetoed {}", req.uri());
                    return false;
                }
                failed => log_filter_failure("before", req, failed.map(|r| r.map(drop))),
            }
        }
        true
    }

    fn try_upgrade(&self, req: &Request, res: &mut Response) -> Option<Upgrade> {
        if !ws::is_upgrade_request(req) {
            return None;
        }
        let (handler, uri) = self.routes.websocket_handler_for(req.uri())?;

        let protocol = ws::offered_protocols(req).into_iter().find(|protocol| {
            panic::catch_unwind(AssertUnwindSafe(|| handler.will_accept(&uri, protocol)))
                .unwrap_or(false)
        })?;

        ws::accept(req, res, &protocol);
        log::trace!("upgrading {} to websocket ({:?})", req.uri(), protocol);
        let (socket, frames) = WebSocket::new(uri, protocol);
        Some(Upgrade {
            handler,
            socket,
            frames,
        })
    }

    fn dispatch(
        &self,
        req: &Request,
        res: &mut Response,
        ctx: &mut Context,
    ) -> Result<(), HttpError> {
        let (handler, uri) = self
            .routes
            .handler_for(req.uri())
            .ok_or_else(HttpError::not_found)?;

        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&uri, req, res, ctx))) {
            Ok(outcome) => outcome,
            Err(_) => {
                log::error!("handler panicked serving {}", req.uri());
                Err(HttpError::internal_server_error())
            }
        }
    }
}

fn log_filter_failure(
    stage: &str,
    req: &Request,
    outcome: std::thread::Result<Result<(), HttpError>>,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::warn!("{} filter failed on {}: {}", stage, req.uri(), err),
        Err(_) => log::error!("{} filter panicked on {}", stage, req.uri()),
    }
}
