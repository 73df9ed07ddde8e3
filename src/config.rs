use std::time::Duration;

/// Limits and timeouts applied to every connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest reassembled message accepted from the peer.
    pub max_message_size: usize,
    /// Largest single frame payload accepted from the peer; outgoing
    /// messages above it are sent fragmented.
    pub max_frame_size: usize,
    /// Capacity of the delivery queue and of the outgoing data queue.
    pub message_queue: usize,
    /// How long `Closing` may last before the transport is dropped anyway.
    pub close_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Config {
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;
    pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;

    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    #[must_use]
    pub fn message_queue(mut self, capacity: usize) -> Self {
        self.message_queue = capacity.max(1);
        self
    }

    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
            max_frame_size: Self::DEFAULT_MAX_FRAME_SIZE,
            message_queue: 32,
            close_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}
