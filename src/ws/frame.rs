use super::close::CloseFrame;
use super::consts::*;
use super::error::{Error, ProtocolError};
use super::opcode::Opcode;

#[derive(Debug)]
pub(crate) struct Headers {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask: bool,
    pub length: u8,
}
impl Headers {
    pub fn decode(first: u8, second: u8) -> Result<Self, ProtocolError> {
        if has_rsv(first) {
            return Err(ProtocolError::ReservedBits);
        }
        let headers = Headers {
            fin: is_fin(first),
            opcode: Opcode::decode(first)?,
            mask: is_mask(second),
            length: second & LENGTH_MASK,
        };
        if headers.opcode.is_control() {
            if !headers.fin {
                return Err(ProtocolError::FragmentedControlFrame);
            }
            if usize::from(headers.length) > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolError::ControlFrameTooLarge(u64::from(
                    headers.length,
                )));
            }
        }
        Ok(headers)
    }

    pub fn remaining_len(&self) -> usize {
        let length = match self.length {
            LENGTH_U16 => 2,
            LENGTH_U64 => 8,
            _ => 0,
        };
        let mask = if self.mask { 4 } else { 0 };
        length + mask
    }
}

/// One frame, with its payload always held unmasked.
///
/// `mask_key` is the key the frame travelled (or will travel) with; a decoded
/// frame keeps it so that decoding an encoded frame yields the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub mask_key: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Frame {
            fin,
            opcode,
            masked: false,
            mask_key: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Frame::new(true, Opcode::Text, payload)
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Frame::new(true, Opcode::Binary, payload)
    }

    pub fn continuation(fin: bool, payload: impl Into<Vec<u8>>) -> Self {
        Frame::new(fin, Opcode::Continuation, payload)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Frame::new(true, Opcode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Frame::new(true, Opcode::Pong, payload)
    }

    /// A Close frame; `None` sends an empty payload.
    pub fn close(close: Option<&CloseFrame>) -> Self {
        let payload = close.map(CloseFrame::encode).unwrap_or_default();
        Frame::new(true, Opcode::Close, payload)
    }

    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.masked = true;
        self.mask_key = Some(key);
        self
    }

    pub fn without_mask(mut self) -> Self {
        self.masked = false;
        self.mask_key = None;
        self
    }

    /// Checks the constraints a well-formed frame must meet before encoding.
    pub fn validate(&self) -> Result<(), Error> {
        if self.opcode.is_control() {
            if self.payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(Error::Contract("control frame payload exceeds 125 bytes"));
            }
            if !self.fin {
                return Err(Error::Contract("control frame must not be fragmented"));
            }
        }
        if self.masked != self.mask_key.is_some() {
            return Err(Error::Contract("mask flag and mask key disagree"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_header_bits() {
        let headers = Headers::decode(0x81, 0x85).unwrap();
        assert!(headers.fin);
        assert_eq!(headers.opcode, Opcode::Text);
        assert!(headers.mask);
        assert_eq!(headers.length, 5);
        assert_eq!(headers.remaining_len(), 4);
    }

    #[test]
    fn counts_extended_length_bytes() {
        assert_eq!(Headers::decode(0x02, 126).unwrap().remaining_len(), 2);
        assert_eq!(Headers::decode(0x02, 0x80 | 127).unwrap().remaining_len(), 12);
    }

    #[test]
    fn rejects_reserved_bits() {
        for first in [0xC1, 0xA1, 0x91] {
            assert_eq!(
                Headers::decode(first, 0).unwrap_err(),
                ProtocolError::ReservedBits
            );
        }
    }

    #[test]
    fn rejects_malformed_control_headers() {
        assert_eq!(
            Headers::decode(0x09, 0).unwrap_err(),
            ProtocolError::FragmentedControlFrame
        );
        assert_eq!(
            Headers::decode(0x89, 126).unwrap_err(),
            ProtocolError::ControlFrameTooLarge(126)
        );
    }

    #[test]
    fn validate_rejects_contract_violations() {
        assert!(Frame::ping(vec![0; 126]).validate().is_err());
        let mut fragmented = Frame::pong("x");
        fragmented.fin = false;
        assert!(fragmented.validate().is_err());
        let mut unkeyed = Frame::text("x");
        unkeyed.masked = true;
        assert!(unkeyed.validate().is_err());
        assert!(Frame::binary(vec![0; 70_000]).validate().is_ok());
        assert!(Frame::ping(vec![0; 125]).validate().is_ok());
    }
}
