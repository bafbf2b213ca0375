//! Frame decoding — turns a connection's byte stream into tagged frames.

use std::io::ErrorKind;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use brook_protocol::{MAX_MESSAGE_SIZE, TAG_MESSAGE, TAG_STREAM};

/// One decoded unit from the wire.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A control-message payload. May be truncated — see [`read_frame`].
    Message(Vec<u8>),
    /// Raw bytes follow out-of-band; the decode loop must stand aside.
    Stream,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The remote closed the connection. Terminal for the decode loop.
    #[error("connection closed")]
    Closed,

    /// The frame started with a byte that is neither tag. The loop skips
    /// and keeps reading.
    #[error("unknown frame tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::Closed,
            _ => Self::Io(err),
        }
    }
}

/// Read one frame from `reader`.
///
/// A `STREAM` tag returns immediately with no further read — everything
/// after it belongs to the stream consumer, not this codec. A `MESSAGE`
/// tag is followed by exactly **one** bounded read of up to
/// [`MAX_MESSAGE_SIZE`] bytes, not a read-to-completion loop; an encoded
/// message longer than the bound is truncated here and fails to decode
/// downstream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, DecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut tag = [0u8; 1];
    match reader.read(&mut tag).await {
        Ok(0) => return Err(DecodeError::Closed),
        Ok(_) => {}
        Err(e) => return Err(e.into()),
    }

    match tag[0] {
        TAG_STREAM => Ok(Frame::Stream),
        TAG_MESSAGE => {
            let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
            let n = match reader.read(&mut buf).await {
                Ok(0) => return Err(DecodeError::Closed),
                Ok(n) => n,
                Err(e) => return Err(e.into()),
            };
            buf.truncate(n);
            Ok(Frame::Message(buf))
        }
        other => Err(DecodeError::UnknownTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_tag_reads_nothing_further() {
        let bytes = [TAG_STREAM, 0xAA, 0xBB, 0xCC];
        let mut reader = &bytes[..];

        assert_eq!(read_frame(&mut reader).await.unwrap(), Frame::Stream);
        // the stream bytes are still unread
        assert_eq!(reader, &[0xAA, 0xBB, 0xCC]);
    }

    #[tokio::test]
    async fn message_tag_yields_payload() {
        let mut bytes = vec![TAG_MESSAGE];
        bytes.extend_from_slice(b"payload");
        let mut reader = &bytes[..];

        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame, Frame::Message(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn message_payload_is_bounded_to_a_single_read() {
        let mut bytes = vec![TAG_MESSAGE];
        bytes.extend_from_slice(&vec![0x7; MAX_MESSAGE_SIZE + 100]);
        let mut reader = &bytes[..];

        let frame = read_frame(&mut reader).await.unwrap();
        match frame {
            Frame::Message(payload) => assert_eq!(payload.len(), MAX_MESSAGE_SIZE),
            other => panic!("expected message frame, got {other:?}"),
        }
        // the overflow stays in the reader, to be misread later — the
        // documented truncation hazard of the bounded single read
        assert_eq!(reader.len(), 100);
    }

    #[tokio::test]
    async fn unknown_tag_is_reported() {
        let bytes = [0x9, 0x1, 0x2];
        let mut reader = &bytes[..];

        match read_frame(&mut reader).await {
            Err(DecodeError::UnknownTag(0x9)) => {}
            other => panic!("expected unknown tag error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_reader_is_closed() {
        let mut reader: &[u8] = &[];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(DecodeError::Closed)
        ));
    }

    #[tokio::test]
    async fn message_tag_with_no_payload_is_closed() {
        let bytes = [TAG_MESSAGE];
        let mut reader = &bytes[..];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(DecodeError::Closed)
        ));
    }
}
