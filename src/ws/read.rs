use tokio::io::{AsyncRead, AsyncReadExt};

use super::consts::*;
use super::encoding::apply_mask;
use super::error::{DecodeError, FrameError, ProtocolError};
use super::frame::{Frame, Headers};

const LENGTH_HIGH_BIT: u64 = 1 << 63;

pub async fn read_length_u16<T: AsyncRead + Unpin>(reader: &mut T) -> Result<u64, FrameError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).await?;
    Ok(u64::from(u16::from_be_bytes(buf)))
}
pub async fn read_length_u64<T: AsyncRead + Unpin>(reader: &mut T) -> Result<u64, FrameError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).await?;
    Ok(u64::from_be_bytes(buf))
}

pub async fn read_mask<T: AsyncRead + Unpin>(reader: &mut T) -> Result<[u8; 4], FrameError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

// rejects lengths the wire format forbids or we refuse to allocate
fn payload_length(length: u64, max: usize) -> Result<usize, ProtocolError> {
    if length & LENGTH_HIGH_BIT != 0 {
        return Err(ProtocolError::InvalidLength);
    }
    match usize::try_from(length) {
        Ok(length) if length <= max => Ok(length),
        _ => Err(ProtocolError::MessageTooBig { size: length, max }),
    }
}

pub async fn read_frame<T: AsyncRead + Unpin>(
    reader: &mut T,
    max_payload: usize,
) -> Result<Frame, FrameError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).await?;
    let headers = Headers::decode(buf[0], buf[1])?;

    let length = match headers.length {
        LENGTH_U16 => read_length_u16(reader).await?,
        LENGTH_U64 => read_length_u64(reader).await?,
        value => u64::from(value),
    };
    let length = payload_length(length, max_payload)?;
    let mask_key = if headers.mask {
        Some(read_mask(reader).await?)
    } else {
        None
    };

    // reading payload data
    let mut payload = vec![0; length];
    reader.read_exact(&mut payload).await?;

    if let Some(key) = mask_key {
        // unmasking the message
        apply_mask(&mut payload, key);
    }

    Ok(Frame {
        fin: headers.fin,
        opcode: headers.opcode,
        masked: headers.mask,
        mask_key,
        payload,
    })
}

/// Decodes one frame from the front of `buf`, returning it together with
/// the number of bytes it occupied.
///
/// A buffer holding only part of a frame yields `DecodeError::Incomplete`
/// with the count of missing bytes (as far as the header lets us know), so
/// callers can tell a short read from a malformed frame.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize), DecodeError> {
    if buf.len() < 2 {
        return Err(DecodeError::Incomplete {
            needed: 2 - buf.len(),
        });
    }
    let headers = Headers::decode(buf[0], buf[1])?;
    let header_len = 2 + headers.remaining_len();
    if buf.len() < header_len {
        return Err(DecodeError::Incomplete {
            needed: header_len - buf.len(),
        });
    }

    let mut cursor = 2;
    let length = match headers.length {
        LENGTH_U16 => {
            let bytes = [buf[2], buf[3]];
            cursor += 2;
            u64::from(u16::from_be_bytes(bytes))
        }
        LENGTH_U64 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[2..10]);
            cursor += 8;
            u64::from_be_bytes(bytes)
        }
        value => u64::from(value),
    };
    let length = payload_length(length, usize::MAX - header_len)?;
    let mask_key = if headers.mask {
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[cursor..cursor + 4]);
        Some(key)
    } else {
        None
    };

    let total = header_len + length;
    if buf.len() < total {
        return Err(DecodeError::Incomplete {
            needed: total - buf.len(),
        });
    }
    let mut payload = buf[header_len..total].to_vec();
    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    let frame = Frame {
        fin: headers.fin,
        opcode: headers.opcode,
        masked: headers.mask,
        mask_key,
        payload,
    };
    Ok((frame, total))
}
