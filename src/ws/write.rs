use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::connection::Shared;
use super::encoding::encode_for;
use super::error::{duplicate_io, Error};
use super::frame::Frame;
use super::opcode::Opcode;
use super::state::{Lifecycle, Role, State};
use crate::shared::types::*;

/// A queued write: the frames of one message (or one control frame), sent
/// back to back.
pub(crate) struct Outgoing {
    pub frames: Vec<Frame>,
    pub done: Ack,
}

/// Encodes `frame` for `role` and writes all of its bytes.
pub async fn write_frame<T: AsyncWrite + Unpin>(
    writer: &mut T,
    frame: Frame,
    role: Role,
) -> Result<()> {
    let buffer = encode_for(frame, role)?;
    writer.write_all(&buffer).await?;
    writer.flush().await?;
    Ok(())
}

async fn write_frames<T: AsyncWrite + Unpin>(
    writer: &mut T,
    frames: Vec<Frame>,
    role: Role,
) -> Result<()> {
    for frame in &frames {
        frame.validate()?;
    }
    for frame in frames {
        write_frame(writer, frame, role).await?;
    }
    Ok(())
}

async fn closed(lifecycle: &mut watch::Receiver<Lifecycle>) {
    let _ = lifecycle.wait_for(|l| l.state == State::Closed).await;
}

/// The only task writing to the transport. Control replies are drained
/// before application data; after a Close frame went out, data is refused.
pub(crate) async fn write_messages<T: AsyncWrite + Unpin>(
    mut writer: T,
    mut control: ControlReceiver,
    mut data: DataReceiver,
    shared: Arc<Shared>,
) {
    let role = shared.role;
    let mut lifecycle = shared.subscribe();
    let mut close_sent = false;

    loop {
        let Outgoing { frames, done } = tokio::select! {
            biased;
            _ = closed(&mut lifecycle) => break,
            Some(outgoing) = control.recv() => outgoing,
            Some(outgoing) = data.recv() => outgoing,
            else => break,
        };
        if close_sent {
            let _ = done.send(Err(Error::ConnectionClosing));
            continue;
        }

        let sends_close = frames.iter().any(|f| f.opcode == Opcode::Close);
        let result = tokio::select! {
            result = write_frames(&mut writer, frames, role) => result,
            _ = closed(&mut lifecycle) => Err(Error::ConnectionClosing),
        };
        match result {
            Ok(()) => {
                if sends_close {
                    debug!("close frame sent");
                    close_sent = true;
                }
                let _ = done.send(Ok(()));
            }
            Err(Error::Io(err)) => {
                warn!(error = %err, "transport write failed");
                shared.fail(Error::Io(duplicate_io(&err))).await;
                let _ = done.send(Err(Error::Io(err)));
                break;
            }
            Err(err) => {
                let _ = done.send(Err(err));
            }
        }
    }

    // queued writes still waiting are answered by dropping their acks
    drop(control);
    drop(data);
    match timeout(shared.config.close_timeout, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(error = %err, "transport shutdown failed"),
        Err(_) => debug!("transport shutdown timed out"),
    }
    debug!("writer stopped");
}
