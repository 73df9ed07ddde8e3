use std::io::ErrorKind;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::{oneshot, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use super::close::CloseFrame;
use super::connection::Shared;
use super::error::{Error, FrameError, ProtocolError};
use super::frame::Frame;
use super::message::Message;
use super::opcode::Opcode;
use super::read::read_frame;
use super::state::{Lifecycle, Role, State};
use crate::shared::types::Outbox;

struct Assembly {
    opcode: Opcode,
    buffer: Vec<u8>,
}

enum Flow {
    Continue,
    Deliver(Message),
    Finished,
}

fn check_size(size: usize, max: usize) -> Result<(), ProtocolError> {
    if size > max {
        return Err(ProtocolError::MessageTooBig {
            size: size as u64,
            max,
        });
    }
    Ok(())
}

fn complete(opcode: Opcode, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    match opcode {
        Opcode::Text => String::from_utf8(payload)
            .map(Message::Text)
            .map_err(|_| ProtocolError::InvalidUtf8),
        _ => Ok(Message::Binary(payload)),
    }
}

struct Session {
    shared: Arc<Shared>,
    assembly: Option<Assembly>,
}

impl Session {
    fn check_mask(&self, frame: &Frame) -> Result<(), ProtocolError> {
        match (self.shared.role, frame.masked) {
            (Role::Server, false) => Err(ProtocolError::UnmaskedFrame),
            (Role::Client, true) => Err(ProtocolError::MaskedFrame),
            _ => Ok(()),
        }
    }

    async fn handle(&mut self, frame: Frame) -> Result<Flow, ProtocolError> {
        self.check_mask(&frame)?;

        if self.shared.state() >= State::Closing {
            // waiting for the peer's Close, everything else is dropped
            if frame.opcode == Opcode::Close {
                if let Ok(Some(close)) = CloseFrame::parse(&frame.payload) {
                    debug!(code = %close.code, "close acknowledged by peer");
                    self.shared.update(|l| l.peer_close = Some(close));
                }
                return Ok(Flow::Finished);
            }
            return Ok(Flow::Continue);
        }

        let max = self.shared.config.max_message_size;
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                if self.assembly.is_some() {
                    return Err(ProtocolError::InterleavedMessage);
                }
                check_size(frame.payload.len(), max)?;
                if frame.fin {
                    return complete(frame.opcode, frame.payload).map(Flow::Deliver);
                }
                self.assembly = Some(Assembly {
                    opcode: frame.opcode,
                    buffer: frame.payload,
                });
                Ok(Flow::Continue)
            }
            Opcode::Continuation => {
                let assembly = self
                    .assembly
                    .as_mut()
                    .ok_or(ProtocolError::UnexpectedContinuation)?;
                check_size(assembly.buffer.len() + frame.payload.len(), max)?;
                assembly.buffer.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(Flow::Continue);
                }
                match self.assembly.take() {
                    Some(assembly) => complete(assembly.opcode, assembly.buffer).map(Flow::Deliver),
                    None => Ok(Flow::Continue),
                }
            }
            Opcode::Ping => {
                debug!(len = frame.payload.len(), "answering ping");
                let _ = self.shared.enqueue_control(Frame::pong(frame.payload));
                Ok(Flow::Continue)
            }
            Opcode::Pong => {
                self.shared.update(|l| l.last_pong = Some(Instant::now()));
                Ok(Flow::Continue)
            }
            Opcode::Close => {
                self.answer_close(&frame.payload).await;
                Ok(Flow::Finished)
            }
        }
    }

    /// Echoes the peer's Close and waits for the echo to be written.
    async fn answer_close(&mut self, payload: &[u8]) {
        let reply = match CloseFrame::parse(payload) {
            Ok(Some(close)) => {
                info!(code = %close.code, reason = %close.reason, "peer closed the connection");
                self.shared.update(|l| l.peer_close = Some(close.clone()));
                Some(close)
            }
            Ok(None) => {
                info!("peer closed the connection without a status");
                None
            }
            Err(err) => {
                warn!(error = %err, "malformed close frame");
                let reply = CloseFrame::new(err.close_code(), &err.to_string());
                self.shared.record_failure(Error::Protocol(err)).await;
                Some(reply)
            }
        };
        self.shared.transition(State::Closing);
        let ack = self.shared.enqueue_control(Frame::close(reply.as_ref()));
        let _ = timeout(self.shared.config.close_timeout, ack).await;
    }

    /// Fails the connection: sends a Close naming the violation and starts
    /// waiting for the peer's answer. Returns the ack of that Close.
    async fn violation(
        &mut self,
        err: ProtocolError,
    ) -> Option<oneshot::Receiver<crate::Result<()>>> {
        warn!(error = %err, "protocol violation");
        self.assembly = None;
        let close = CloseFrame::new(err.close_code(), &err.to_string());
        self.shared.record_failure(Error::Protocol(err)).await;
        if self.shared.transition(State::Closing) {
            return Some(self.shared.enqueue_control(Frame::close(Some(&close))));
        }
        None
    }
}

/// Resolves once the connection is closed, or once it has been closing for
/// longer than the grace period.
async fn expired(lifecycle: &mut watch::Receiver<Lifecycle>) {
    loop {
        let (state, deadline) = {
            let current = lifecycle.borrow_and_update();
            (current.state, current.deadline)
        };
        match (state, deadline) {
            (State::Closed, _) => return,
            (State::Closing, Some(deadline)) => {
                tokio::select! {
                    _ = sleep_until(deadline) => return,
                    changed = lifecycle.changed() => if changed.is_err() { return },
                }
            }
            _ => {
                if lifecycle.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn deliver(shared: &Shared, outbox: &Outbox, message: Message) {
    tokio::select! {
        sent = outbox.send(message) => {
            if sent.is_err() {
                debug!("connection handle dropped, discarding message");
            }
        }
        _ = shared.closing() => {
            debug!("connection closing, discarding message");
        }
    }
}

async fn transport_ended(shared: &Shared, err: std::io::Error) {
    if shared.state() >= State::Closing && err.kind() == ErrorKind::UnexpectedEof {
        debug!("peer released the transport");
        return;
    }
    warn!(error = %err, "transport read failed");
    shared.record_failure(Error::Io(err)).await;
}

/// The only task reading from the transport. Runs until the connection is
/// closed and then drops `outbox`, which ends every pending `recv`.
pub(crate) async fn read_messages<T: AsyncRead + Unpin>(
    mut reader: T,
    shared: Arc<Shared>,
    outbox: Outbox,
) {
    let mut session = Session {
        shared: shared.clone(),
        assembly: None,
    };
    let mut lifecycle = shared.subscribe();
    let max_frame = shared.config.max_frame_size;

    loop {
        let result = tokio::select! {
            result = read_frame(&mut reader, max_frame) => result,
            _ = expired(&mut lifecycle) => {
                if shared.state() == State::Closing {
                    info!("peer did not answer close in time");
                }
                break;
            }
        };
        let frame = match result {
            Ok(frame) => frame,
            Err(FrameError::Io(err)) => {
                transport_ended(&shared, err).await;
                break;
            }
            Err(FrameError::Protocol(err)) if shared.state() == State::Open => {
                // framing is lost, nothing after this header can be decoded
                if let Some(ack) = session.violation(err).await {
                    let _ = timeout(shared.config.close_timeout, ack).await;
                }
                break;
            }
            Err(FrameError::Protocol(err)) => {
                debug!(error = %err, "undecodable frame while closing");
                break;
            }
        };
        debug!(opcode = ?frame.opcode, fin = frame.fin, len = frame.payload.len(), "frame received");

        match session.handle(frame).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Deliver(message)) => deliver(&shared, &outbox, message).await,
            Ok(Flow::Finished) => break,
            Err(err) if shared.state() == State::Open => {
                session.violation(err).await;
            }
            Err(err) => {
                debug!(error = %err, "invalid frame while closing");
                break;
            }
        }
    }

    shared.transition(State::Closed);
    info!("connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_text_and_binary() {
        assert_eq!(
            complete(Opcode::Text, b"hi".to_vec()).unwrap(),
            Message::Text("hi".into())
        );
        assert_eq!(
            complete(Opcode::Binary, vec![0xFF]).unwrap(),
            Message::Binary(vec![0xFF])
        );
        assert_eq!(
            complete(Opcode::Text, vec![0xFF, 0xFE]),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(check_size(10, 10).is_ok());
        assert_eq!(
            check_size(11, 10),
            Err(ProtocolError::MessageTooBig { size: 11, max: 10 })
        );
    }
}
