pub mod close;
mod connection;
pub mod consts;
mod dialer;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod handshake;
mod listener;
mod message;
pub mod opcode;
pub mod read;
mod session;
mod state;
pub mod write;

pub use close::{CloseCode, CloseFrame};
pub use connection::Connection;
pub use dialer::{connect, connect_stream, connect_with};
pub use encoding::{apply_mask, encode_for, encode_frame};
pub use error::{DecodeError, Error, FrameError, HandshakeError, ProtocolError};
pub use frame::Frame;
pub use listener::{accept, Listener};
pub use message::Message;
pub use opcode::Opcode;
pub use read::{decode_frame, read_frame};
pub use state::{Role, State};
pub use write::write_frame;
