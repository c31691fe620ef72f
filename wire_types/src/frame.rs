//! Frame encoding and async frame IO.

use crate::messages::FrameHeader;
use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The serialized header must fit the one-byte length prefix.
pub const MAX_HEADER_LEN: usize = u8::MAX as usize;

// Streams must not be able to make the czar allocate unbounded buffers.
const MAX_PAYLOAD_LEN: u32 = 512 * 1024 * 1024;

/// Framing errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The serialized header exceeds [`MAX_HEADER_LEN`].
    #[error("frame header too large: {0} bytes")]
    HeaderTooLarge(usize),

    /// The header declares an implausible payload size.
    #[error("payload size {0} exceeds the frame limit")]
    PayloadTooLarge(u32),

    /// The header bytes did not decode.
    #[error("malformed frame header: {0}")]
    BadHeader(#[from] prost::DecodeError),

    /// The underlying stream failed.
    #[error("frame io: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a frame: length byte, header, payload.
///
/// The header's `payload_size` is overwritten with `payload.len()`.
pub fn encode_frame(header: &FrameHeader, payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut header = header.clone();
    header.payload_size = payload.len() as u32;
    if header.payload_size > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(header.payload_size));
    }

    let header_bytes = header.encode_to_vec();
    if header_bytes.len() > MAX_HEADER_LEN {
        return Err(FrameError::HeaderTooLarge(header_bytes.len()));
    }

    let mut buf = BytesMut::with_capacity(1 + header_bytes.len() + payload.len());
    buf.put_u8(header_bytes.len() as u8);
    buf.put_slice(&header_bytes);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Write one frame to `writer`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &FrameHeader,
    payload: &[u8],
) -> Result<(), FrameError> {
    let bytes = encode_frame(header, payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame from `reader`.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(FrameHeader, Bytes), FrameError> {
    let header_len = reader.read_u8().await? as usize;
    let mut header_bytes = vec![0u8; header_len];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::decode(header_bytes.as_slice())?;

    if header.payload_size > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(header.payload_size));
    }
    let mut payload = vec![0u8; header.payload_size as usize];
    reader.read_exact(&mut payload).await?;
    Ok((header, payload.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{QueuedType, SqlRequest};

    #[tokio::test]
    async fn frame_round_trip() {
        let request = SqlRequest {
            job_id: 3,
            attempt_count: 0,
            db: "LSST".to_string(),
            chunk_id: 6630,
            sub_chunk_ids: vec![],
            queries: vec!["SELECT 1".to_string()],
        };
        let header = FrameHeader::queued(17, QueuedType::Sql);
        let payload = request.encode_to_vec();

        let (mut a, mut b) = tokio::io::duplex(4096);
        write_frame(&mut a, &header, &payload).await.unwrap();
        let (got_header, got_payload) = read_frame(&mut b).await.unwrap();

        assert_eq!(got_header.id, 17);
        assert_eq!(got_header.payload_size as usize, payload.len());
        let got = SqlRequest::decode(got_payload.as_ref()).unwrap();
        assert_eq!(got, request);
    }

    #[tokio::test]
    async fn short_read_is_io_error() {
        let encoded = encode_frame(&FrameHeader::queued(1, QueuedType::Echo), b"abcdef").unwrap();
        let truncated = &encoded[..encoded.len() - 2];
        let mut reader = std::io::Cursor::new(truncated.to_vec());
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));
    }

    #[test]
    fn header_size_guard() {
        // a header with a huge id still fits comfortably
        let header = FrameHeader::queued(u64::MAX, QueuedType::Sql);
        let bytes = encode_frame(&header, b"x").unwrap();
        assert!(bytes.len() < 40);
    }
}
