use super::consts::*;
use super::error::Error;
use super::frame::Frame;
use super::state::Role;

const LENGTH_U16_FIELD: &[u8] = &[LENGTH_U16];
const LENGTH_U64_FIELD: &[u8] = &[LENGTH_U64];

pub fn encode_length(length: usize) -> Vec<u8> {
    if length <= 125 {
        // the first byte is the length
        vec![length as u8]
    } else if length <= 65535 {
        // the first byte is 126, read the next 2 bytes as u16 for a length
        [LENGTH_U16_FIELD, &(length as u16).to_be_bytes()].concat()
    } else {
        // the first byte is 127, read the next 8 bytes as u64 for a length
        [LENGTH_U64_FIELD, &(length as u64).to_be_bytes()].concat()
    }
}

pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Serializes `frame` exactly as described by its fields, masking the
/// payload when a mask key is present.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, Error> {
    frame.validate()?;

    let first_byte = frame.opcode.encode() | if frame.fin { FIN_MASK } else { 0 };
    let mut length = encode_length(frame.payload.len());
    if frame.masked {
        length[0] |= MASKED_MASK;
    }

    let mut buffer = Vec::with_capacity(MAX_HEADER_LEN + frame.payload.len());
    buffer.push(first_byte);
    buffer.extend_from_slice(&length);
    match frame.mask_key {
        Some(key) => {
            buffer.extend_from_slice(&key);
            let start = buffer.len();
            buffer.extend_from_slice(&frame.payload);
            apply_mask(&mut buffer[start..], key);
        }
        None => buffer.extend_from_slice(&frame.payload),
    }
    Ok(buffer)
}

/// Encodes `frame` for sending from `role`: clients mask with a freshly
/// drawn key, servers never mask.
pub fn encode_for(frame: Frame, role: Role) -> Result<Vec<u8>, Error> {
    let frame = match role {
        Role::Client => frame.with_mask(rand::random()),
        Role::Server => frame.without_mask(),
    };
    encode_frame(&frame)
}
