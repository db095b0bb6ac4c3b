#![no_main]
use libfuzzer_sys::fuzz_target;

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_lite::io::{AsyncRead, AsyncWrite, Cursor};
use iotweb::{Connection, HttpError, HttpServer, Request, Response, WebSocket, WebSocketHandler};

/// Reads the fuzz input and discards everything written.
#[derive(Clone, Debug)]
struct RwWrapper(Arc<Mutex<Cursor<Vec<u8>>>>);

impl RwWrapper {
    fn new(input: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(Cursor::new(input))))
    }
}

impl AsyncRead for RwWrapper {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut *self.0.lock().unwrap()).poll_read(cx, buf)
    }
}

impl AsyncWrite for RwWrapper {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct Echo;

impl WebSocketHandler for Echo {
    fn will_accept(&self, _: &str, _: &str) -> bool {
        true
    }

    fn connected(&self, socket: WebSocket) {
        socket.on_data(|ws, text| {
            let _ = ws.send(text);
        });
    }
}

fn body(_: &str, req: &Request, res: &mut Response, _: &mut iotweb::Context) -> Result<(), HttpError> {
    if let Some(body) = req.body() {
        res.write(body);
    }
    Ok(())
}

fuzz_target!(|request: &[u8]| {
    let server = HttpServer::new();
    server.add_handler("/", body).unwrap();
    server.add_websocket_handler("/ws", Echo).unwrap();

    let stream = RwWrapper::new(request.to_vec());
    async_std::task::block_on(server.accept(Connection {
        hostname: "fuzz".into(),
        stream,
    }))
    .ok();
});
