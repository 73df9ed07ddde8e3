use super::frame::Frame;
use super::opcode::Opcode;

/// An application-level message, reassembled from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }

    pub fn into_data(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        }
    }

    /// Splits the message into frames carrying at most `max_frame` payload
    /// bytes each: the first frame has the message opcode, the rest are
    /// continuations, and only the last one has `fin` set.
    pub fn into_frames(self, max_frame: usize) -> Vec<Frame> {
        let opcode = match self {
            Message::Text(_) => Opcode::Text,
            Message::Binary(_) => Opcode::Binary,
        };
        let data = self.into_data();
        if data.len() <= max_frame || max_frame == 0 {
            return vec![Frame::new(true, opcode, data)];
        }
        let count = (data.len() + max_frame - 1) / max_frame;
        data.chunks(max_frame)
            .enumerate()
            .map(|(i, chunk)| {
                let opcode = if i == 0 { opcode } else { Opcode::Continuation };
                Frame::new(i + 1 == count, opcode, chunk)
            })
            .collect()
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}
