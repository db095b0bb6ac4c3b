use std::io;

use futures_lite::io::{AsyncRead, AsyncReadExt};

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Assembles CR/LF terminated lines over a fixed-size receive buffer.
///
/// Bytes past the last line stay buffered and are handed to body reads
/// (or to whoever takes over the stream) before anything else is read.
#[derive(Debug)]
pub(crate) struct LineReader<R> {
    io: R,
    buf: Box<[u8]>,
    len: usize,
    /// How far `buf[..len]` has been searched for a line end.
    scanned: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(io: R, capacity: usize) -> Self {
        Self {
            io,
            buf: vec![0; capacity.max(2)].into_boxed_slice(),
            len: 0,
            scanned: 0,
        }
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` on end of stream and an `InvalidData` error when a
    /// line does not fit in the buffer.
    pub(crate) async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(end) = self.find_line_end() {
                let line = self.buf[..end].to_vec();
                self.consume(end + 2);
                return Ok(Some(line));
            }

            if self.len == self.buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "line exceeds the receive buffer",
                ));
            }

            let n = self.io.read(&mut self.buf[self.len..]).await?;
            if n == 0 {
                return Ok(None);
            }
            self.len += n;
        }
    }

    /// Read exactly `length` bytes, buffered bytes first.
    ///
    /// Returns `Ok(None)` if the stream ends early.
    pub(crate) async fn read_body(&mut self, length: usize) -> io::Result<Option<Vec<u8>>> {
        let mut body = vec![0; length];
        let buffered = self.len.min(length);
        body[..buffered].copy_from_slice(&self.buf[..buffered]);
        self.consume(buffered);

        let mut filled = buffered;
        while filled < length {
            let n = self.io.read(&mut body[filled..]).await?;
            if n == 0 {
                return Ok(None);
            }
            filled += n;
        }
        Ok(Some(body))
    }

    /// Give up the stream along with any bytes read but not yet consumed.
    pub(crate) fn into_parts(self) -> (R, Vec<u8>) {
        let leftover = self.buf[..self.len].to_vec();
        (self.io, leftover)
    }

    fn find_line_end(&mut self) -> Option<usize> {
        let start = self.scanned.saturating_sub(1);
        let found = self.buf[start..self.len]
            .windows(2)
            .position(|w| w[0] == CR && w[1] == LF)
            .map(|i| start + i);
        if found.is_none() {
            self.scanned = self.len;
        }
        found
    }

    fn consume(&mut self, count: usize) {
        self.buf.copy_within(count..self.len, 0);
        self.len -= count;
        self.scanned = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;
    use futures_lite::io::Cursor;

    /// Yields its input a few bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut [u8],
        ) -> std::task::Poll<io::Result<usize>> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            let pos = self.pos;
            buf[..n].copy_from_slice(&self.data[pos..pos + n]);
            self.pos += n;
            std::task::Poll::Ready(Ok(n))
        }
    }

    #[test]
    fn lines_across_partial_reads() {
        block_on(async {
            let data = b"GET / HTTP/1.0\r\nHost: x\r\n\r\nbody".to_vec();
            let mut reader = LineReader::new(Trickle { data, pos: 0, step: 3 }, 64);

            assert_eq!(reader.read_line().await.unwrap().unwrap(), b"GET / HTTP/1.0");
            assert_eq!(reader.read_line().await.unwrap().unwrap(), b"Host: x");
            assert_eq!(reader.read_line().await.unwrap().unwrap(), b"");
            assert_eq!(reader.read_body(4).await.unwrap().unwrap(), b"body");
            assert_eq!(reader.read_line().await.unwrap(), None);
        });
    }

    #[test]
    fn lone_cr_is_not_a_line_end() {
        block_on(async {
            let mut reader = LineReader::new(Cursor::new(b"a\rb\r\n".to_vec()), 64);
            assert_eq!(reader.read_line().await.unwrap().unwrap(), b"a\rb");
        });
    }

    #[test]
    fn oversized_line_is_an_error() {
        block_on(async {
            let mut reader = LineReader::new(Cursor::new(vec![b'a'; 32]), 8);
            let err = reader.read_line().await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        });
    }

    #[test]
    fn short_body_is_none() {
        block_on(async {
            let mut reader = LineReader::new(Cursor::new(b"\r\nabc".to_vec()), 8);
            assert_eq!(reader.read_line().await.unwrap().unwrap(), b"");
            assert_eq!(reader.read_body(10).await.unwrap(), None);
        });
    }

    #[test]
    fn leftover_bytes_are_returned() {
        block_on(async {
            let mut reader = LineReader::new(Cursor::new(b"line\r\n\x81\x00".to_vec()), 64);
            reader.read_line().await.unwrap();
            let (_, leftover) = reader.into_parts();
            assert_eq!(leftover, vec![0x81, 0x00]);
        });
    }
}
