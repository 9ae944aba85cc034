//! `Content-Length` framing over any async byte stream.

use crate::connection::error::{ConnectionError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are treated as a protocol violation.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Write one framed body and flush.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed body.
///
/// Returns `Ok(None)` on a clean end of stream between frames. Unknown
/// header lines (e.g. `Content-Type`) are skipped.
pub async fn read_frame<R>(reader: &mut R, line: &mut String) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut content_length: Option<usize> = None;

    loop {
        line.clear();
        let bytes_read = reader.read_line(line).await?;
        if bytes_read == 0 {
            return match content_length {
                None => Ok(None),
                Some(_) => Err(ConnectionError::Closed),
            };
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            // Blank line ends the header block, but only once we know the length
            if content_length.is_some() {
                break;
            }
            continue;
        }

        if let Some((name, value)) = trimmed.split_once(':')
            && name.trim().eq_ignore_ascii_case("Content-Length")
        {
            let len = value.trim().parse::<usize>().map_err(|_| {
                ConnectionError::Protocol(format!("invalid Content-Length: {}", value.trim()))
            })?;
            content_length = Some(len);
        }
    }

    let len = content_length.unwrap_or(0);
    if len > MAX_FRAME_BYTES {
        return Err(ConnectionError::Protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            len, MAX_FRAME_BYTES
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
