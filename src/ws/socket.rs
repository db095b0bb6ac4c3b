use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use futures_lite::future;
use futures_lite::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use parking_lot::Mutex;

use super::frame::{apply_mask, encode_frame, FrameHeader, Opcode};
use crate::error::WsError;

/// Largest payload `send` and `send_binary` put in a single frame.
const MAX_OUTBOUND_LEN: usize = u16::MAX as usize;

/// Oversized payloads are skipped this many bytes at a time.
const DISCARD_CHUNK: usize = 128;

type DataListener = Arc<dyn Fn(&WebSocket, &str) + Send + Sync>;
type CloseListener = Arc<dyn Fn(&WebSocket) + Send + Sync>;

struct Inner {
    uri: String,
    protocol: String,
    outbound: Sender<Vec<u8>>,
    closed: AtomicBool,
    data_listeners: Mutex<Vec<DataListener>>,
    close_listeners: Mutex<Vec<CloseListener>>,
}

/// A connected WebSocket.
///
/// Handles are cheap to clone and may be used from any thread. Sends are
/// queued and written in order by the connection's writer task.
#[derive(Clone)]
pub struct WebSocket {
    inner: Arc<Inner>,
}

impl WebSocket {
    pub(crate) fn new(uri: String, protocol: String) -> (Self, Receiver<Vec<u8>>) {
        let (outbound, frames) = async_channel::unbounded();
        let socket = Self {
            inner: Arc::new(Inner {
                uri,
                protocol,
                outbound,
                closed: AtomicBool::new(false),
                data_listeners: Mutex::new(Vec::new()),
                close_listeners: Mutex::new(Vec::new()),
            }),
        };
        (socket, frames)
    }

    /// The part of the request path after the matched route prefix.
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// The negotiated subprotocol, empty if none.
    pub fn protocol(&self) -> &str {
        &self.inner.protocol
    }

    /// Call `listener` with every complete text message.
    pub fn on_data<F>(&self, listener: F)
    where
        F: Fn(&WebSocket, &str) + Send + Sync + 'static,
    {
        self.inner.data_listeners.lock().push(Arc::new(listener));
    }

    /// Call `listener` once the socket closes.
    pub fn on_close<F>(&self, listener: F)
    where
        F: Fn(&WebSocket) + Send + Sync + 'static,
    {
        self.inner.close_listeners.lock().push(Arc::new(listener));
    }

    /// Queue a text message.
    pub fn send(&self, text: &str) -> Result<(), WsError> {
        self.send_frame(Opcode::Text, text.as_bytes())
    }

    /// Queue a binary message.
    pub fn send_binary(&self, data: &[u8]) -> Result<(), WsError> {
        self.send_frame(Opcode::Binary, data)
    }

    /// Close the socket: queue a close frame and notify the close
    /// listeners. Later calls do nothing.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self
            .inner
            .outbound
            .try_send(encode_frame(Opcode::Close, &[], None));
        self.inner.outbound.close();

        let listeners = self.inner.close_listeners.lock().clone();
        for listener in listeners {
            listener(self);
        }
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn send_frame(&self, opcode: Opcode, payload: &[u8]) -> Result<(), WsError> {
        if payload.len() > MAX_OUTBOUND_LEN {
            return Err(WsError::FrameTooLarge(payload.len()));
        }
        if self.is_closed() {
            return Err(WsError::Closed);
        }
        self.inner
            .outbound
            .try_send(encode_frame(opcode, payload, None))
            .map_err(|_| WsError::Closed)
    }

    fn deliver(&self, text: &str) {
        let listeners = self.inner.data_listeners.lock().clone();
        for listener in listeners {
            listener(self, text);
        }
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("uri", &self.inner.uri)
            .field("protocol", &self.inner.protocol)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drive a socket until it closes.
///
/// Frames are read from `reader` and queued frames written to `writer`
/// concurrently. Returns once the peer has gone and every queued frame,
/// including the final close frame, has been written.
pub(crate) async fn run<R, W>(
    socket: WebSocket,
    frames: Receiver<Vec<u8>>,
    mut reader: R,
    writer: &mut W,
    max_message_size: usize,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let read_loop = async {
        match read_frames(&socket, &mut reader, max_message_size).await {
            Ok(()) => log::trace!("websocket {} closed by peer", socket.uri()),
            Err(err) => log::debug!("websocket {} read failed: {}", socket.uri(), err),
        }
        socket.close();
    };

    let write_loop = async {
        while let Ok(frame) = frames.recv().await {
            let written = async {
                writer.write_all(&frame).await?;
                writer.flush().await
            };
            if let Err(err) = written.await {
                log::debug!("websocket {} write failed: {}", socket.uri(), err);
                socket.close();
                break;
            }
        }
    };

    future::zip(read_loop, write_loop).await;
}

/// Read frames until a close frame, a protocol violation or end of stream.
async fn read_frames<R>(socket: &WebSocket, reader: &mut R, max: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let max = max as u64;
    let mut message = Vec::new();
    let mut kind: Option<Opcode> = None;
    let mut oversized = false;

    loop {
        let header = FrameHeader::read(reader).await?;
        match header.opcode {
            Opcode::Close => {
                log::trace!("close frame on websocket {}", socket.uri());
                return Ok(());
            }
            Opcode::Ping => {
                if header.len > max {
                    discard(reader, header.len).await?;
                    continue;
                }
                let payload = read_payload(reader, &header).await?;
                if !socket.is_closed() {
                    let _ = socket
                        .inner
                        .outbound
                        .try_send(encode_frame(Opcode::Pong, &payload, None));
                }
            }
            Opcode::Pong | Opcode::Other(_) => discard(reader, header.len).await?,
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                if header.opcode == Opcode::Continuation {
                    if kind.is_none() {
                        log::debug!("continuation frame without a message on {}", socket.uri());
                        return Ok(());
                    }
                } else {
                    kind = Some(header.opcode);
                    message.clear();
                    oversized = false;
                }

                if oversized || header.len > max.saturating_sub(message.len() as u64) {
                    oversized = true;
                    message.clear();
                    discard(reader, header.len).await?;
                } else {
                    let payload = read_payload(reader, &header).await?;
                    message.extend_from_slice(&payload);
                }

                if header.fin {
                    if oversized {
                        log::debug!("dropped oversized message on websocket {}", socket.uri());
                    } else if kind == Some(Opcode::Text) {
                        socket.deliver(&String::from_utf8_lossy(&message));
                    }
                    message.clear();
                    kind = None;
                    oversized = false;
                }
            }
        }
    }
}

async fn read_payload<R>(reader: &mut R, header: &FrameHeader) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut payload = vec![0; header.len as usize];
    reader.read_exact(&mut payload).await?;
    if let Some(key) = header.mask {
        apply_mask(&mut payload, key);
    }
    Ok(payload)
}

async fn discard<R>(reader: &mut R, mut remaining: u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; DISCARD_CHUNK];
    while remaining > 0 {
        let n = remaining.min(DISCARD_CHUNK as u64) as usize;
        reader.read_exact(&mut chunk[..n]).await?;
        remaining -= n as u64;
    }
    Ok(())
}
