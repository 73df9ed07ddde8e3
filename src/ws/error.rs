use std::io;

use hyper::StatusCode;
use thiserror::Error;

use super::close::CloseCode;

/// A peer broke the framing or message rules of RFC 6455.
///
/// These never reach the application as a decode error. The connection
/// answers them with a Close frame carrying [`ProtocolError::close_code`] and
/// the pending `recv` reports them once the connection is down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid opcode {0:#X}")]
    InvalidOpcode(u8),
    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLarge(u64),
    #[error("control frame is fragmented")]
    FragmentedControlFrame,
    #[error("payload length has the most significant bit set")]
    InvalidLength,
    #[error("client frame is not masked")]
    UnmaskedFrame,
    #[error("server frame is masked")]
    MaskedFrame,
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
    #[error("data frame while a fragmented message is in progress")]
    InterleavedMessage,
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed close payload")]
    InvalidClosePayload,
    #[error("message of {size} bytes exceeds the limit of {max}")]
    MessageTooBig { size: u64, max: usize },
}

impl ProtocolError {
    pub fn close_code(&self) -> CloseCode {
        match self {
            ProtocolError::InvalidUtf8 => CloseCode::Invalid,
            ProtocolError::MessageTooBig { .. } => CloseCode::Size,
            _ => CloseCode::Protocol,
        }
    }
}

/// Reasons an opening handshake is refused, on either side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("method {0} is not GET")]
    MethodNotAllowed(String),
    #[error("HTTP version older than HTTP/1.1")]
    UnsupportedHttpVersion,
    #[error("missing Host header")]
    MissingHost,
    #[error("Upgrade header does not name websocket")]
    MissingUpgrade,
    #[error("Connection header does not contain upgrade")]
    MissingConnectionUpgrade,
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
    #[error("unsupported Sec-WebSocket-Version, expected 13")]
    UnsupportedVersion,
    #[error("unexpected response status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("Sec-WebSocket-Accept does not match the key")]
    AcceptMismatch,
    #[error("transport closed before the handshake completed")]
    Incomplete,
    #[error("unsupported url: {0}")]
    InvalidUrl(&'static str),
}

impl HandshakeError {
    /// Status the server answers with when it refuses a request.
    pub fn status(&self) -> StatusCode {
        match self {
            HandshakeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HandshakeError::UnsupportedHttpVersion => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            HandshakeError::UnsupportedVersion => StatusCode::UPGRADE_REQUIRED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Outcome of decoding a frame from an in-memory buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ends before the frame does; retry with more input.
    #[error("incomplete frame, {needed} more bytes required")]
    Incomplete { needed: usize },
    #[error(transparent)]
    Invalid(#[from] ProtocolError),
}

/// Outcome of reading a frame from a transport.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("invalid frame: {0}")]
    Contract(&'static str),
    #[error("connection is closing")]
    ConnectionClosing,
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("handshake timed out")]
    Timeout,
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(err) => Error::Io(err),
            FrameError::Protocol(err) => Error::Protocol(err),
        }
    }
}

// io::Error is not Clone, the connection keeps a copy for late receivers
pub(crate) fn duplicate_io(err: &io::Error) -> io::Error {
    io::Error::new(err.kind(), err.to_string())
}
