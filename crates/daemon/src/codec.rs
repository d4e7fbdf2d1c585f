//! Length-prefixed bincode frames
//!
//! Each frame is a big-endian `u32` byte count followed by that many bytes
//!  of a bincode-encoded [`Request`](common::sync::Request) or
//!  [`Response`](common::sync::Response).

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body (1 MiB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),
}

/// Encode `message` as one complete frame, prefix included
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(body.len()));
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next frame
///
/// Returns `None` if the stream ends cleanly between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, CodecError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(bincode::deserialize(&body)?))
}

#[cfg(test)]
mod tests {
    use common::prelude::*;

    use super::*;

    #[tokio::test]
    async fn test_frames_over_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let requests = vec![
            Request::Subscribe { ids: Vec::new() },
            Request::SetValue {
                id: Path::new("test.string"),
                value: "y".to_string(),
            },
        ];
        for request in &requests {
            write_frame(&mut client, request).await.unwrap();
        }
        drop(client);

        let mut received = Vec::new();
        while let Some(request) = read_frame::<_, Request>(&mut server).await.unwrap() {
            received.push(request);
        }
        assert_eq!(received, requests);
    }

    #[tokio::test]
    async fn test_oversized_prefix_is_rejected() {
        let mut bytes: &[u8] = &((MAX_FRAME_LEN as u32) + 1).to_be_bytes();
        let err = read_frame::<_, Request>(&mut bytes).await.unwrap_err();
        assert!(matches!(err, CodecError::TooLarge(len) if len == MAX_FRAME_LEN + 1));
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let mut frame = encode(&Request::GetAll).unwrap();
        frame.extend_from_slice(&[0, 0, 0, 9, 1, 2]);
        let mut bytes: &[u8] = &frame;
        assert_eq!(
            read_frame::<_, Request>(&mut bytes).await.unwrap(),
            Some(Request::GetAll)
        );
        assert!(matches!(
            read_frame::<_, Request>(&mut bytes).await,
            Err(CodecError::Io(_))
        ));
    }
}
