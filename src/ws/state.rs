use tokio::time::Instant;

use super::close::CloseFrame;

/// Which end of the connection this endpoint is. Decides the masking
/// direction of outgoing and incoming frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Connection lifecycle. Ordered, a connection only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Everything about a connection that several tasks observe, published
/// through one watch channel.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    pub state: State,
    /// Set when entering `Closing`; the connection is forced closed after it.
    pub deadline: Option<Instant>,
    pub peer_close: Option<CloseFrame>,
    pub last_pong: Option<Instant>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle {
            state: State::Connecting,
            deadline: None,
            peer_close: None,
            last_pong: None,
        }
    }
}
