//! Record framing for the demo TCP link.
//!
//! The codec assumes a reliable stream that preserves record boundaries:
//! one frame per delivery unit. TCP does not give record boundaries, so
//! the demo link prefixes every frame with a 2-byte big-endian length.
//! This module is plumbing for the binaries and tests; the codec itself
//! never sees the prefix.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on an accepted record. Generous against the frame bound so
/// commands with long trailing strings still pass.
pub const MAX_RECORD_SIZE: usize = 4096;

/// Write one frame with its length prefix.
pub async fn write_record<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frame.len() > MAX_RECORD_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("record of {} bytes exceeds {MAX_RECORD_SIZE}", frame.len()),
        ));
    }
    writer.write_all(&(frame.len() as u16).to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Read one frame. `Ok(None)` on clean end-of-stream before a prefix.
pub async fn read_record<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 2];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = usize::from(u16::from_be_bytes(prefix));
    if len > MAX_RECORD_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("record of {len} bytes exceeds {MAX_RECORD_SIZE}"),
        ));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}
