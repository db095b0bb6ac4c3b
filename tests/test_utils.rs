use async_std::io::{Read, ReadExt, Write, WriteExt};
use iotweb::ws::frame::{encode_frame, FrameHeader, Opcode};
use iotweb::{Connection, HttpServer};
use std::{
    fmt::{Debug, Display},
    io,
    pin::Pin,
    sync::{Mutex, MutexGuard},
    task::{Context, Poll, Waker},
};

use async_dup::Arc;

/// An in-memory duplex stream: what one end writes the other reads.
#[derive(Default, Clone, Debug)]
pub struct TestIO {
    pub read: Arc<CloseableCursor>,
    pub write: Arc<CloseableCursor>,
}

/// One direction of a [`TestIO`]. Buffer, position and parked reader share
/// one lock.
#[derive(Default)]
pub struct CloseableCursor {
    state: Mutex<CursorState>,
}

#[derive(Default)]
struct CursorState {
    data: Vec<u8>,
    cursor: usize,
    waker: Option<Waker>,
    closed: bool,
}

impl CloseableCursor {
    fn state(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap()
    }

    fn current(&self) -> bool {
        let state = self.state();
        state.data.len() == state.cursor
    }

    fn close(&self) {
        let waker = {
            let mut state = self.state();
            state.closed = true;
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    #[allow(dead_code)]
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl Display for CloseableCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        let s = std::str::from_utf8(&state.data).unwrap_or("not utf8");
        write!(f, "{}", s)
    }
}

impl TestIO {
    /// A connected pair: `(client, server)`.
    pub fn new() -> (TestIO, TestIO) {
        let client = Arc::new(CloseableCursor::default());
        let server = Arc::new(CloseableCursor::default());

        (
            TestIO {
                read: client.clone(),
                write: server.clone(),
            },
            TestIO {
                read: server,
                write: client,
            },
        )
    }

    #[allow(dead_code)]
    pub fn all_read(&self) -> bool {
        self.write.current()
    }

    /// Signal end of stream to the other end.
    pub fn close(&mut self) {
        CloseableCursor::close(&self.write);
    }
}

impl Debug for CloseableCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("CloseableCursor")
            .field(
                "data",
                &std::str::from_utf8(&state.data).unwrap_or("not utf8"),
            )
            .field("closed", &state.closed)
            .field("cursor", &state.cursor)
            .finish()
    }
}

impl Read for &CloseableCursor {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state();
        let available = state.data.len() - state.cursor;
        if available > 0 {
            let bytes_to_copy = buf.len().min(available);
            let start = state.cursor;
            buf[..bytes_to_copy].copy_from_slice(&state.data[start..start + bytes_to_copy]);
            state.cursor += bytes_to_copy;
            Poll::Ready(Ok(bytes_to_copy))
        } else if state.closed {
            Poll::Ready(Ok(0))
        } else {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl Write for &CloseableCursor {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let waker = {
            let mut state = self.state();
            if state.closed {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            state.data.extend_from_slice(buf);
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        CloseableCursor::close(&self);
        Poll::Ready(Ok(()))
    }
}

impl Read for TestIO {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut &*self.read).poll_read(cx, buf)
    }
}

impl Write for TestIO {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut &*self.write).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut &*self.write).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut &*self.write).poll_close(cx)
    }
}

pub fn connection(stream: TestIO) -> Connection<TestIO> {
    Connection {
        hostname: "127.0.0.1".into(),
        stream,
    }
}

/// Send `request` (with `\n` line endings expanded to CRLF) and return the
/// server's complete output.
#[allow(dead_code)]
pub async fn roundtrip(server: &HttpServer, request: &str) -> String {
    let (mut client, server_io) = TestIO::new();
    client
        .write_all(request.replace('\n', "\r\n").as_bytes())
        .await
        .unwrap();
    client.close();

    server.accept(connection(server_io)).await.unwrap();

    let mut response = String::new();
    client.read_to_string(&mut response).await.unwrap();
    response
}

/// Read a response head, up to and including the blank line.
#[allow(dead_code)]
pub async fn read_head(client: &mut TestIO) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        client.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Write one masked client frame.
#[allow(dead_code)]
pub async fn write_frame(client: &mut TestIO, opcode: Opcode, fin: bool, payload: &[u8]) {
    let mut frame = encode_frame(opcode, payload, Some([0x12, 0x34, 0x56, 0x78]));
    if !fin {
        frame[0] &= 0x7f;
    }
    client.write_all(&frame).await.unwrap();
}

/// Read one unmasked server frame.
#[allow(dead_code)]
pub async fn read_frame(client: &mut TestIO) -> (Opcode, Vec<u8>) {
    let header = FrameHeader::read(client).await.unwrap();
    assert!(header.fin);
    assert_eq!(header.mask, None);
    let mut payload = vec![0; header.len as usize];
    client.read_exact(&mut payload).await.unwrap();
    (header.opcode, payload)
}
