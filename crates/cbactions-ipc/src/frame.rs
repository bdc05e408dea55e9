//! Frame codec: `[i32 LE type][i32 LE byte length][UTF-16LE body]`.
//!
//! The agent consumes the body through a wide-character string API, so the
//! UTF-16 encoding is part of the wire contract.

use std::io::{self, Read, Write};

use cbactions_core::config::SecretString;
use cbactions_core::{BridgeError, Result};
use zeroize::Zeroizing;

/// Upper bound on a declared body length.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    NewJobRequest,
}

impl MessageType {
    pub fn tag(self) -> i32 {
        match self {
            Self::NewJobRequest => 1,
        }
    }

    pub fn from_tag(tag: i32) -> Result<Self> {
        match tag {
            1 => Ok(Self::NewJobRequest),
            other => Err(BridgeError::Protocol(format!(
                "unexpected message type tag {}",
                other
            ))),
        }
    }
}

/// A decoded frame.
pub struct FramedMessage {
    pub kind: MessageType,
    pub body: SecretString,
}

impl std::fmt::Debug for FramedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedMessage")
            .field("kind", &self.kind)
            .field("body", &format_args!("<{} chars>", self.body.chars().count()))
            .finish()
    }
}

fn write_failed(e: io::Error) -> BridgeError {
    BridgeError::io("writing framed message", e)
}

/// Write one frame carrying `body`.
pub fn write_frame<W: Write>(writer: &mut W, kind: MessageType, body: &str) -> Result<()> {
    let mut encoded = Zeroizing::new(Vec::with_capacity(body.len() * 2));
    for unit in body.encode_utf16() {
        encoded.extend_from_slice(&unit.to_le_bytes());
    }
    if encoded.len() > MAX_FRAME_LEN {
        return Err(BridgeError::Protocol(format!(
            "frame body of {} bytes exceeds the {} byte limit",
            encoded.len(),
            MAX_FRAME_LEN
        )));
    }
    // Bounded by MAX_FRAME_LEN above.
    let len = encoded.len() as i32;

    writer.write_all(&kind.tag().to_le_bytes()).map_err(write_failed)?;
    writer.write_all(&len.to_le_bytes()).map_err(write_failed)?;
    writer.write_all(&encoded).map_err(write_failed)?;
    writer.flush().map_err(write_failed)?;
    tracing::debug!(tag = kind.tag(), bytes = len, "frame written");
    Ok(())
}

fn read_i32<R: Read>(reader: &mut R, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| {
        BridgeError::Protocol(format!("short read on frame {}: {}", what, e))
    })?;
    Ok(i32::from_le_bytes(buf))
}

/// Read exactly one frame.
///
/// Any short read, bad length, unknown tag or invalid UTF-16 is a
/// `Protocol` error; a partial body is never returned.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<FramedMessage> {
    let kind = MessageType::from_tag(read_i32(reader, "type tag")?)?;
    let declared = read_i32(reader, "length")?;
    let len = usize::try_from(declared)
        .map_err(|_| BridgeError::Protocol(format!("negative frame length {}", declared)))?;
    if len % 2 != 0 {
        return Err(BridgeError::Protocol(format!(
            "frame length {} is not a whole number of UTF-16 units",
            len
        )));
    }
    if len > MAX_FRAME_LEN {
        return Err(BridgeError::Protocol(format!(
            "frame length {} exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }

    let mut raw = Zeroizing::new(Vec::new());
    reader
        .take(len as u64)
        .read_to_end(&mut raw)
        .map_err(|e| BridgeError::Protocol(format!("reading frame body: {}", e)))?;
    if raw.len() != len {
        return Err(BridgeError::Protocol(format!(
            "frame body truncated: expected {} bytes, got {}",
            len,
            raw.len()
        )));
    }

    let units = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    let mut body = SecretString::new(String::with_capacity(len / 2));
    for c in char::decode_utf16(units) {
        let c = c.map_err(|e| BridgeError::Protocol(format!("frame body is not UTF-16: {}", e)))?;
        body.push(c);
    }
    Ok(FramedMessage { kind, body })
}
