use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::ws::error::Error;
use crate::ws::Message;
use crate::ws::write::Outgoing;

pub type StdResult<T, E> = std::result::Result<T, E>;
pub type Result<T> = StdResult<T, Error>;

/// Completion of one queued write.
pub(crate) type Ack = oneshot::Sender<Result<()>>;

pub(crate) type ControlSender = UnboundedSender<Outgoing>;
pub(crate) type ControlReceiver = UnboundedReceiver<Outgoing>;
pub(crate) type DataSender = Sender<Outgoing>;
pub(crate) type DataReceiver = Receiver<Outgoing>;

pub(crate) type Outbox = Sender<Message>;
pub(crate) type Inbox = Receiver<Message>;
