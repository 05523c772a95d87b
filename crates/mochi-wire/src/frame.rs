use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;
use crate::limits::check_structure;

/// Writes a length-prefixed CBOR frame: a 4-byte big-endian length followed
/// by the CBOR-deterministic encoding of `value`.
pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), WireError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| WireError::Codec(e.to_string()))?;
    let len = buf.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&buf).await?;
    Ok(())
}

/// Reads a length-prefixed CBOR frame, rejecting the declared length before
/// allocating if it exceeds `max_bytes`, then validates the decoded
/// structure's nesting/pair bounds before deserializing into `T`.
pub async fn read_frame<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
    max_bytes: usize,
) -> Result<T, WireError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_bytes {
        return Err(WireError::FrameTooLarge(len, max_bytes));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    let structural: ciborium::value::Value =
        ciborium::de::from_reader(buf.as_slice()).map_err(|e| WireError::Codec(e.to_string()))?;
    check_structure(&structural).map_err(WireError::StructureTooLarge)?;

    ciborium::de::from_reader(buf.as_slice()).map_err(|e| WireError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: i64,
        b: String,
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let mut buf = Vec::new();
        let sample = Sample {
            a: 42,
            b: "hi".into(),
        };
        write_frame(&mut buf, &sample).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Sample = read_frame(&mut cursor, 4096).await.unwrap();
        assert_eq!(decoded, sample);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected_before_allocating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(10_000_000u32).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<Sample, WireError> = read_frame(&mut cursor, 4096).await;
        assert!(matches!(result, Err(WireError::FrameTooLarge(_, _))));
    }
}
