//! Wire framing.
//!
//! Two framings share one stream:
//!
//! ```text
//! +------------------------+------------------+
//! | Length (4 bytes, BE)   | JSON message     |   control frame
//! +------------------------+------------------+
//! | Length (8 bytes, BE)   | raw bytes        |   payload (after DATA)
//! +------------------------+------------------+
//! ```
//!
//! Frame sizes are validated before allocation. Writers flush after
//! every message; readers loop until the declared length is satisfied
//! (`read_exact`), so short reads never truncate a payload.

use crate::message::ClientMessage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum size of a control frame.
pub const MAX_CONTROL_FRAME: u32 = 64 * 1024;

/// Default maximum size of a binary payload (64 MiB).
pub const DEFAULT_MAX_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Wire-level errors.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("control frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: u64, max: u64 },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown opcode: {0}")]
    UnknownOp(String),
}

/// Result type alias for wire operations.
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Write one control frame and flush.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> WireResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)
        .map_err(|e| WireError::Malformed(format!("encode: {e}")))?;
    let len = u32::try_from(body.len()).map_err(|_| WireError::FrameTooLarge {
        len: u32::MAX,
        max: MAX_CONTROL_FRAME,
    })?;
    if len > MAX_CONTROL_FRAME {
        return Err(WireError::FrameTooLarge {
            len,
            max: MAX_CONTROL_FRAME,
        });
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one control frame and decode it.
pub async fn read_message<R, T>(reader: &mut R) -> WireResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let body = read_frame(reader).await?;
    serde_json::from_slice(&body).map_err(|e| WireError::Malformed(e.to_string()))
}

/// Read one control frame and decode it as a [`ClientMessage`].
///
/// A frame whose `op` is valid JSON but not a known opcode yields
/// [`WireError::UnknownOp`], so callers can answer `UNKNOWN_COMMAND`
/// instead of dropping the connection.
pub async fn read_client_message<R>(reader: &mut R) -> WireResult<ClientMessage>
where
    R: AsyncRead + Unpin,
{
    let body = read_frame(reader).await?;
    let value: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| WireError::Malformed(e.to_string()))?;

    let op = value
        .get("op")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WireError::Malformed("missing op field".to_string()))?;
    if !ClientMessage::KNOWN_OPS.contains(&op) {
        return Err(WireError::UnknownOp(op.to_string()));
    }

    serde_json::from_value(value).map_err(|e| WireError::Malformed(e.to_string()))
}

async fn read_frame<R>(reader: &mut R) -> WireResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_CONTROL_FRAME {
        return Err(WireError::FrameTooLarge {
            len,
            max: MAX_CONTROL_FRAME,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write a binary payload: 8-byte big-endian length, then the bytes,
/// then a flush.
pub async fn write_payload<W>(writer: &mut W, payload: &[u8]) -> WireResult<()>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() as u64;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a binary payload of a declared length.
///
/// The length was announced in the preceding control frame; the 8-byte
/// prefix on the stream must agree with it.
pub async fn read_payload<R>(reader: &mut R, declared: u64, max: u64) -> WireResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    if declared > max {
        return Err(WireError::PayloadTooLarge { len: declared, max });
    }

    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf).await?;
    let len = u64::from_be_bytes(len_buf);
    if len != declared {
        return Err(WireError::Malformed(format!(
            "payload length {len} does not match declared {declared}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
