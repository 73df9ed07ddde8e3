//! WebSocket (RFC 6455) client and server over any tokio byte stream.
//!
//! [`ws::connect`] and [`ws::Listener`] run the HTTP Upgrade handshake and
//! return a [`ws::Connection`], which reassembles messages, answers pings and
//! closes on protocol violations in a background task while the application
//! sends and receives through `&self` methods.

pub mod config;
pub mod shared;
pub mod ws;

pub use config::Config;
pub use shared::types::Result;
pub use ws::{
    accept, connect, connect_stream, connect_with, CloseCode, CloseFrame, Connection, Error,
    Listener, Message, Role, State,
};
