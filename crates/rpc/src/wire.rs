//! Length-prefixed frame encoding.
//!
//! # Wire format
//!
//! ```text
//! FRAME: [4 bytes BE: body_len][body_len bytes: JSON Frame]
//! ```
//!
//! A call is `open`, then any interleaving of `message` / `half_close` /
//! `cancel` from the client and `message` / `status` from the server. The
//! server's `status` frame is always last.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use filestream_protocol::Frame;
use filestream_protocol::constants::MAX_FRAME_SIZE;

use crate::error::RpcError;

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), RpcError> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `None` if the stream ends cleanly on a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
) -> Result<Option<Frame>, RpcError> {
    let mut len_buf = [0u8; 4];
    let n = reader.read(&mut len_buf).await?;
    if n == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[n..]).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}
