//! WebSocket frame headers and encoding.
//!
//! ```txt
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               | Masking-key, if MASK set to 1 |
//! +-------------------------------+-------------------------------+
//! ```

use std::io;

use futures_lite::io::{AsyncRead, AsyncReadExt};

const FIN: u8 = 0x80;
const MASKED: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0f;
const LEN_BITS: u8 = 0x7f;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Largest payload whose length fits the 7-bit field.
pub const MAX_INLINE_LEN: usize = 125;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continues a fragmented message.
    Continuation,
    /// Starts a UTF-8 text message.
    Text,
    /// Starts a binary message.
    Binary,
    /// Closes the connection.
    Close,
    /// Requests a pong.
    Ping,
    /// Answers a ping.
    Pong,
    /// A reserved opcode.
    Other(u8),
}

impl Opcode {
    /// Whether this is a control frame opcode.
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x08 != 0
    }

    /// The 4-bit wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xa,
            Opcode::Other(op) => op & OPCODE_BITS,
        }
    }
}

impl From<u8> for Opcode {
    fn from(op: u8) -> Self {
        match op & OPCODE_BITS {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xa => Opcode::Pong,
            other => Opcode::Other(other),
        }
    }
}

/// A decoded frame header. The payload follows it on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Last frame of the message.
    pub fin: bool,
    /// The frame type.
    pub opcode: Opcode,
    /// Payload length in bytes.
    pub len: u64,
    /// Masking key, present iff the payload is masked.
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Read a header, including any extended length and masking key.
    pub async fn read<R>(io: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 2];
        io.read_exact(&mut head).await?;

        let len = match head[1] & LEN_BITS {
            LEN_16 => {
                let mut ext = [0u8; 2];
                io.read_exact(&mut ext).await?;
                u64::from(u16::from_be_bytes(ext))
            }
            LEN_64 => {
                let mut ext = [0u8; 8];
                io.read_exact(&mut ext).await?;
                u64::from_be_bytes(ext)
            }
            len => u64::from(len),
        };

        let mask = if head[1] & MASKED != 0 {
            let mut key = [0u8; 4];
            io.read_exact(&mut key).await?;
            Some(key)
        } else {
            None
        };

        Ok(Self {
            fin: head[0] & FIN != 0,
            opcode: Opcode::from(head[0]),
            len,
            mask,
        })
    }
}

/// Encode a single final frame carrying `payload`, masked with `mask` if
/// given.
pub fn encode_frame(opcode: Opcode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(FIN | opcode.as_u8());

    let mask_bit = if mask.is_some() { MASKED } else { 0 };
    match payload.len() {
        len if len <= MAX_INLINE_LEN => out.push(mask_bit | len as u8),
        len if len <= usize::from(u16::MAX) => {
            out.push(mask_bit | LEN_16);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            out.push(mask_bit | LEN_64);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }

    let start = out.len();
    match mask {
        Some(key) => {
            out.extend_from_slice(&key);
            let start = start + key.len();
            out.extend_from_slice(payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.extend_from_slice(payload),
    }
    out
}

/// XOR `buf` with the repeating masking key. Masking and unmasking are the
/// same operation.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
