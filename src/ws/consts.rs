pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV_MASK: u8 = 0b0111_0000;
pub const OPCODE_MASK: u8 = 0b0000_1111;
pub const LENGTH_MASK: u8 = 0b0111_1111;
pub const MASKED_MASK: u8 = 0b1000_0000;

// values of the 7 bit length field announcing an extended length
pub const LENGTH_U16: u8 = 126;
pub const LENGTH_U64: u8 = 127;

pub const MAX_CONTROL_PAYLOAD: usize = 125;
pub const MAX_HEADER_LEN: usize = 14;

pub const WS_MAGIC_CONST: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const WS_VERSION: &str = "13";
pub const WS_UPGRADE_TOKEN: &str = "websocket";
pub const CONNECTION_UPGRADE_TOKEN: &str = "upgrade";

pub const fn is_fin(byte: u8) -> bool {
    (byte & FIN_MASK) == FIN_MASK
}
pub const fn has_rsv(byte: u8) -> bool {
    (byte & RSV_MASK) != 0
}
pub const fn is_mask(byte: u8) -> bool {
    (byte & MASKED_MASK) == MASKED_MASK
}
