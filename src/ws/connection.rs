use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::close::{CloseCode, CloseFrame};
use super::error::Error;
use super::frame::Frame;
use super::message::Message;
use super::session::read_messages;
use super::state::{Lifecycle, Role, State};
use super::write::{write_messages, Outgoing};
use crate::config::Config;
use crate::shared::types::*;

/// State shared by the connection handle, the reader task and the writer
/// task.
pub(crate) struct Shared {
    pub id: Uuid,
    pub role: Role,
    pub config: Config,
    lifecycle: watch::Sender<Lifecycle>,
    control: ControlSender,
    data: DataSender,
    failure: Mutex<Option<Error>>,
}

impl Shared {
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    pub fn state(&self) -> State {
        self.lifecycle.borrow().state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.borrow().clone()
    }

    pub fn update(&self, modify: impl FnOnce(&mut Lifecycle)) {
        self.lifecycle.send_modify(modify);
    }

    /// Moves the connection forward to `next`. Returns false when it already
    /// was there or further along.
    pub fn transition(&self, next: State) -> bool {
        let grace = self.config.close_timeout;
        let moved = self.lifecycle.send_if_modified(|lifecycle| {
            if lifecycle.state >= next {
                return false;
            }
            if next >= State::Closing && lifecycle.deadline.is_none() {
                lifecycle.deadline = Some(Instant::now() + grace);
            }
            lifecycle.state = next;
            true
        });
        if moved {
            info!(id = %self.id, state = ?next, "connection state changed");
        }
        moved
    }

    /// Queues a frame ahead of all application data.
    pub fn enqueue_control(&self, frame: Frame) -> oneshot::Receiver<Result<()>> {
        let (done, ack) = oneshot::channel();
        // a closed queue drops `done`, which the ack reports as closing
        let _ = self.control.send(Outgoing {
            frames: vec![frame],
            done,
        });
        ack
    }

    async fn enqueue_data(&self, frames: Vec<Frame>) -> Result<()> {
        if self.state() != State::Open {
            return Err(Error::ConnectionClosing);
        }
        let (done, ack) = oneshot::channel();
        tokio::select! {
            sent = self.data.send(Outgoing { frames, done }) => {
                sent.map_err(|_| Error::ConnectionClosing)?
            }
            _ = self.closing() => return Err(Error::ConnectionClosing),
        }
        ack.await.unwrap_or(Err(Error::ConnectionClosing))
    }

    /// Keeps the first error that brought the connection down.
    pub async fn record_failure(&self, err: Error) {
        let mut failure = self.failure.lock().await;
        if failure.is_none() {
            *failure = Some(err);
        }
    }

    pub async fn fail(&self, err: Error) {
        self.record_failure(err).await;
        self.transition(State::Closed);
    }

    /// Resolves once the connection has left `Open`.
    pub async fn closing(&self) {
        let mut lifecycle = self.subscribe();
        let _ = lifecycle.wait_for(|l| l.state >= State::Closing).await;
    }

    pub async fn closed(&self) {
        let mut lifecycle = self.subscribe();
        let _ = lifecycle.wait_for(|l| l.state == State::Closed).await;
    }
}

/// An established WebSocket connection.
///
/// A background task reads and answers frames for as long as the connection
/// lives; another one owns the write side. All methods take `&self`, so a
/// connection wrapped in an `Arc` can be driven from several tasks: sends
/// never interleave on the wire, and `recv` hands each message to exactly one
/// caller.
pub struct Connection {
    shared: Arc<Shared>,
    inbox: Mutex<Inbox>,
}

impl Connection {
    /// Wraps a stream on which the opening handshake already completed.
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(stream: S, role: Role, config: Config) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (control, control_rx) = mpsc::unbounded_channel();
        let (data, data_rx) = mpsc::channel(config.message_queue.max(1));
        let (outbox, inbox) = mpsc::channel(config.message_queue.max(1));
        let (lifecycle, _) = watch::channel(Lifecycle::default());

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            role,
            config,
            lifecycle,
            control,
            data,
            failure: Mutex::new(None),
        });

        // Open before the reader runs: frames may already be buffered
        shared.transition(State::Open);
        let span = info_span!("ws", id = %shared.id, role = ?role);
        tokio::spawn(
            write_messages(writer, control_rx, data_rx, shared.clone()).instrument(span.clone()),
        );
        tokio::spawn(read_messages(reader, shared.clone(), outbox).instrument(span));

        Connection {
            shared,
            inbox: Mutex::new(inbox),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// When the last Pong arrived, solicited or not.
    pub fn last_pong(&self) -> Option<Instant> {
        self.shared.lifecycle().last_pong
    }

    /// The status the peer closed with, once its Close frame arrived.
    pub fn close_frame(&self) -> Option<CloseFrame> {
        self.shared.lifecycle().peer_close
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    /// Sends one message, fragmented when it exceeds the configured frame
    /// size. Resolves once every frame is written.
    pub async fn send(&self, message: Message) -> Result<()> {
        let frames = message.into_frames(self.shared.config.max_frame_size);
        self.shared.enqueue_data(frames).await
    }

    pub async fn ping(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let frame = Frame::ping(payload);
        frame.validate()?;
        self.shared.enqueue_data(vec![frame]).await
    }

    /// Waits for the next message. `Ok(None)` is the end of the stream; the
    /// first call after an abnormal end returns the error that caused it.
    pub async fn recv(&self) -> Result<Option<Message>> {
        let mut inbox = self.inbox.lock().await;
        if let Some(message) = inbox.recv().await {
            return Ok(Some(message));
        }
        match self.shared.failure.lock().await.take() {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    /// Starts the closing handshake and waits until the connection is
    /// closed, which takes at most the configured close timeout. Calling it
    /// again only waits.
    pub async fn close(&self, frame: Option<CloseFrame>) -> Result<()> {
        let close = frame.unwrap_or_else(CloseFrame::normal);
        if !close.code.is_sendable() {
            return Err(Error::Contract("close code may not be sent"));
        }
        let frame = Frame::close(Some(&close));
        frame.validate()?;

        let mut sent = Ok(());
        if self.shared.transition(State::Closing) {
            info!(id = %self.shared.id, code = %close.code, "closing connection");
            sent = self
                .shared
                .enqueue_control(frame)
                .await
                .unwrap_or(Err(Error::ConnectionClosing));
        }
        self.shared.closed().await;
        sent
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.shared.transition(State::Closing) {
            let frame = CloseFrame::new(CloseCode::Away, "");
            let _ = self.shared.enqueue_control(Frame::close(Some(&frame)));
        }
    }
}
