//! Length-prefixed framing shared by requests and responses.
//!
//! Every frame starts with an 8 byte prefix holding two big-endian `u32`s,
//! the header length and the body length, followed by exactly that many
//! header and body bytes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size of the `header_length` + `body_length` prefix
pub const PREFIX_LEN: usize = 8;

/// Largest frame accepted from the wire (100MB)
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Read exactly one frame, prefix included.
///
/// Blocks until the whole frame has arrived. A stream that ends before the
/// first byte yields [`Error::ConnectionClosed`]; one that ends mid-frame is
/// a short read and yields [`Error::InvalidFrame`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                Error::ConnectionClosed
            } else {
                Error::InvalidFrame(format!("short read: {} of {} prefix bytes", filled, PREFIX_LEN))
            });
        }
        filled += n;
    }

    let (header_length, body_length) = parse_prefix(&prefix);
    if header_length == 0 {
        return Err(Error::InvalidFrame("zero header length".to_string()));
    }

    let len = header_length as usize + body_length as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::InvalidFrame(format!("Message too large: {} bytes", len)));
    }

    let mut frame = vec![0u8; PREFIX_LEN + len];
    frame[..PREFIX_LEN].copy_from_slice(&prefix);
    reader
        .read_exact(&mut frame[PREFIX_LEN..])
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::InvalidFrame(format!("short read: expected {} more bytes", len))
            } else {
                e.into()
            }
        })?;

    Ok(frame)
}

/// Write an already encoded frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

fn parse_prefix(prefix: &[u8; PREFIX_LEN]) -> (u32, u32) {
    let header_length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let body_length = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    (header_length, body_length)
}

/// Split a complete frame into its header and body sections.
///
/// The lengths in the prefix must account for every byte after it.
pub(crate) fn split(frame: &[u8]) -> Result<(&[u8], &[u8])> {
    if frame.len() < PREFIX_LEN {
        return Err(Error::InvalidFrame(format!(
            "frame of {} bytes has no prefix",
            frame.len()
        )));
    }

    let mut prefix = [0u8; PREFIX_LEN];
    prefix.copy_from_slice(&frame[..PREFIX_LEN]);
    let (header_length, body_length) = parse_prefix(&prefix);

    let rest = &frame[PREFIX_LEN..];
    let header_length = header_length as usize;
    if rest.len() != header_length + body_length as usize {
        return Err(Error::InvalidFrame(format!(
            "prefix announces {} + {} bytes, frame carries {}",
            header_length,
            body_length,
            rest.len()
        )));
    }

    Ok(rest.split_at(header_length))
}
