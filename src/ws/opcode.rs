use super::consts::OPCODE_MASK;
use super::error::ProtocolError;

/// The six opcodes RFC 6455 defines. Reserved values never make it into this
/// type, they are rejected by [`Opcode::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}
impl Opcode {
    // create a new opcode from unchanged input byte
    pub fn decode(byte: u8) -> Result<Self, ProtocolError> {
        use Opcode::*;
        match byte & OPCODE_MASK {
            0x0 => Ok(Continuation),
            0x1 => Ok(Text),
            0x2 => Ok(Binary),
            0x8 => Ok(Close),
            0x9 => Ok(Ping),
            0xA => Ok(Pong),
            value => Err(ProtocolError::InvalidOpcode(value)),
        }
    }
    pub fn encode(self) -> u8 {
        use Opcode::*;
        match self {
            Continuation => 0x0,
            Text => 0x1,
            Binary => 0x2,
            Close => 0x8,
            Ping => 0x9,
            Pong => 0xA,
        }
    }
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
    pub fn is_data(self) -> bool {
        !self.is_control()
    }
}
