use std::fmt;

use super::consts::MAX_CONTROL_PAYLOAD;
use super::error::ProtocolError;

/// Status codes carried by Close frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000, the purpose of the connection was fulfilled.
    Normal,
    /// 1001, an endpoint is going away.
    Away,
    /// 1002, protocol error.
    Protocol,
    /// 1003, received a data type it cannot accept.
    Unsupported,
    /// 1005, no status code was present. Never sent on the wire.
    Status,
    /// 1006, closed without a Close frame. Never sent on the wire.
    Abnormal,
    /// 1007, message data inconsistent with its type.
    Invalid,
    /// 1008, policy violation.
    Policy,
    /// 1009, message too big to process.
    Size,
    /// 1010, client expected an extension the server did not negotiate.
    Extension,
    /// 1011, unexpected server condition.
    Error,
    Other(u16),
}

impl CloseCode {
    /// Whether the code may appear in a Close frame.
    pub fn is_sendable(self) -> bool {
        matches!(u16::from(self), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        use CloseCode::*;
        match code {
            1000 => Normal,
            1001 => Away,
            1002 => Protocol,
            1003 => Unsupported,
            1005 => Status,
            1006 => Abnormal,
            1007 => Invalid,
            1008 => Policy,
            1009 => Size,
            1010 => Extension,
            1011 => Error,
            code => Other(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        use CloseCode::*;
        match code {
            Normal => 1000,
            Away => 1001,
            Protocol => 1002,
            Unsupported => 1003,
            Status => 1005,
            Abnormal => 1006,
            Invalid => 1007,
            Policy => 1008,
            Size => 1009,
            Extension => 1010,
            Error => 1011,
            Other(code) => code,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

/// Status code and reason of a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseFrame {
    /// Builds a close frame, cutting the reason on a char boundary so the
    /// payload stays within the control frame limit.
    pub fn new(code: CloseCode, reason: &str) -> Self {
        let limit = MAX_CONTROL_PAYLOAD - 2;
        let mut end = reason.len().min(limit);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        CloseFrame {
            code,
            reason: reason[..end].to_string(),
        }
    }

    pub fn normal() -> Self {
        CloseFrame::new(CloseCode::Normal, "")
    }

    /// Parses a Close payload. An empty payload carries no status code.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, ProtocolError> {
        match payload {
            [] => Ok(None),
            [_] => Err(ProtocolError::InvalidClosePayload),
            [high, low, reason @ ..] => {
                let code = CloseCode::from(u16::from_be_bytes([*high, *low]));
                if !code.is_sendable() {
                    return Err(ProtocolError::InvalidClosePayload);
                }
                let reason =
                    std::str::from_utf8(reason).map_err(|_| ProtocolError::InvalidClosePayload)?;
                Ok(Some(CloseFrame {
                    code,
                    reason: reason.to_string(),
                }))
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let code: u16 = self.code.into();
        [&code.to_be_bytes()[..], self.reason.as_bytes()].concat()
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_code_and_reason() {
        let payload = CloseFrame::new(CloseCode::Normal, "bye").encode();
        assert_eq!(payload, [0x03, 0xE8, b'b', b'y', b'e']);
        let parsed = CloseFrame::parse(&payload).unwrap().unwrap();
        assert_eq!(parsed.code, CloseCode::Normal);
        assert_eq!(parsed.reason, "bye");
    }

    #[test]
    fn empty_payload_has_no_code() {
        assert_eq!(CloseFrame::parse(&[]).unwrap(), None);
    }

    #[test]
    fn rejects_structurally_invalid_payloads() {
        assert_eq!(
            CloseFrame::parse(&[0x03]),
            Err(ProtocolError::InvalidClosePayload)
        );
        // 1005 must never be sent
        assert_eq!(
            CloseFrame::parse(&[0x03, 0xED]),
            Err(ProtocolError::InvalidClosePayload)
        );
        assert_eq!(
            CloseFrame::parse(&[0x03, 0xE8, 0xFF, 0xFE]),
            Err(ProtocolError::InvalidClosePayload)
        );
    }

    #[test]
    fn accepts_application_codes() {
        let parsed = CloseFrame::parse(&[0x0F, 0xA0]).unwrap().unwrap();
        assert_eq!(parsed.code, CloseCode::Other(4000));
    }

    #[test]
    fn truncates_reason_on_char_boundary() {
        let reason = "é".repeat(100);
        let frame = CloseFrame::new(CloseCode::Away, &reason);
        assert!(frame.encode().len() <= MAX_CONTROL_PAYLOAD);
        assert_eq!(frame.reason.len() % 2, 0);
    }
}
