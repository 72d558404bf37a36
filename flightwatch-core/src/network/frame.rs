//! Length-prefixed framing: `[len:u32 big-endian][payload:len bytes]`.

use anyhow::{Result, anyhow, bail};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length header.
pub const FRAME_HEADER_LEN: usize = 4;

/// Upper bound on a payload accepted by the decoders.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow!("frame payload too large: {} bytes", payload.len()))?;
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

fn checked_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame length {} exceeds limit {}", len, MAX_FRAME_LEN);
    }
    Ok(len)
}

/// Try decode one payload from a sticky buffer, consuming it on success.
pub fn try_decode_from_buffer(buffer: &mut Vec<u8>) -> Result<Option<Vec<u8>>> {
    if buffer.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let body_len = checked_len([buffer[0], buffer[1], buffer[2], buffer[3]])?;
    if buffer.len() < FRAME_HEADER_LEN + body_len {
        return Ok(None);
    }
    let payload = buffer[FRAME_HEADER_LEN..FRAME_HEADER_LEN + body_len].to_vec();
    buffer.drain(0..FRAME_HEADER_LEN + body_len);
    Ok(Some(payload))
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut len_buf).await?;
    let body_len = checked_len(len_buf)?;
    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(payload)?).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/frame_tests.rs"]
mod tests;
