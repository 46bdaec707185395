//! Frame I/O over byte streams.
//!
//! Reads and writes length-delimited [`Frame`]s over any tokio
//! `AsyncRead`/`AsyncWrite`. The header is validated before the payload
//! buffer is allocated, so a hostile `payload_size` costs at most
//! [`FrameHeader::MAX_PAYLOAD_SIZE`].

use authnet_proto::{Frame, FrameHeader};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetError;

/// Read one frame.
///
/// Returns `Ok(None)` on a clean EOF before the first header byte.
///
/// # Errors
///
/// - `NetError::Io` on socket failure or EOF inside a frame
/// - `NetError::Protocol` if the header or payload is invalid
///
/// # Cancel Safety
///
/// Not cancel-safe: a partially read frame is lost if the future is dropped.
/// Run it in a dedicated task rather than inside `select!`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(FrameHeader::SIZE);
    buf.resize(FrameHeader::SIZE, 0);

    let mut filled = 0;
    while filled < FrameHeader::SIZE {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed inside frame header",
            )
            .into());
        }
        filled += n;
    }

    let payload_size = FrameHeader::from_bytes(&buf)?.payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;
    }

    Ok(Some(Frame::decode(&buf)?))
}

/// Encode and write one frame, then flush.
///
/// # Errors
///
/// - `NetError::Protocol` if the payload exceeds the frame size limit
/// - `NetError::Io` on socket failure
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf)?;

    writer.write_all(&buf).await?;
    writer.flush().await?;

    Ok(())
}
