use std::convert::Infallible;
use std::net::SocketAddr;

use futures::future;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Body, Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::connection::Connection;
use super::error::{Error, HandshakeError};
use super::handshake;
use super::state::Role;
use crate::config::Config;
use crate::shared::types::*;

fn internal_error() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

// Serves exactly one HTTP request on `stream`. The request either upgrades
// or is answered with an error status, after which hyper drops the stream.
async fn upgrade<S>(stream: S) -> Result<Upgraded>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, receiver) = oneshot::channel::<StdResult<OnUpgrade, HandshakeError>>();
    let mut sender = Some(sender);

    let service = service_fn(move |mut req: Request<Body>| {
        let response = match handshake::validate_request(&req) {
            Ok(key) => match handshake::switching_protocols(&key) {
                Ok(response) => {
                    if let Some(sender) = sender.take() {
                        let _ = sender.send(Ok(hyper::upgrade::on(&mut req)));
                    }
                    response
                }
                Err(err) => {
                    warn!(error = %err, "building handshake response failed");
                    internal_error()
                }
            },
            Err(err) => {
                warn!(uri = %req.uri(), error = %err, "rejecting websocket handshake");
                let response = handshake::rejection(&err);
                if let Some(sender) = sender.take() {
                    let _ = sender.send(Err(err));
                }
                response
            }
        };
        future::ok::<_, Infallible>(response)
    });

    Http::new()
        .http1_only(true)
        .http1_keep_alive(false)
        .serve_connection(stream, service)
        .with_upgrades()
        .await?;

    let on_upgrade = receiver.await.map_err(|_| HandshakeError::Incomplete)??;
    Ok(on_upgrade.await?)
}

/// Runs the server side of the opening handshake on an accepted stream.
/// On failure the stream is closed and no connection exists.
pub async fn accept<S>(stream: S, config: Config) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let upgraded = timeout(config.handshake_timeout, upgrade(stream))
        .await
        .map_err(|_| Error::Timeout)??;
    Ok(Connection::from_stream(upgraded, Role::Server, config))
}

type Accepted = Result<(Connection, SocketAddr)>;

// Accepts transports and hands each to its own handshake task, so a peer
// that never finishes its request only holds up itself.
async fn accept_loop(inner: TcpListener, config: Config, accepted: mpsc::Sender<Accepted>) {
    loop {
        let (stream, peer) = match inner.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "transport accept failed");
                if accepted.send(Err(err.into())).await.is_err() {
                    return;
                }
                continue;
            }
        };
        debug!(%peer, "transport accepted");
        let config = config.clone();
        let accepted = accepted.clone();
        tokio::spawn(async move {
            let result = accept(stream, config).await.map(|conn| (conn, peer));
            if let Err(err) = &result {
                debug!(%peer, error = %err, "handshake failed");
            }
            // a dropped listener drops the connection with it
            let _ = accepted.send(result).await;
        });
    }
}

/// Accepts WebSocket connections on a TCP socket.
///
/// Handshakes run concurrently in the background; `accept` yields them in
/// the order they complete. Dropping the listener stops accepting.
pub struct Listener {
    local_addr: SocketAddr,
    accepted: Mutex<mpsc::Receiver<Accepted>>,
    acceptor: JoinHandle<()>,
}

impl Listener {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::bind_with(addr, Config::default()).await
    }

    pub async fn bind_with<A: ToSocketAddrs>(addr: A, config: Config) -> Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        let local_addr = inner.local_addr()?;
        let (sender, accepted) = mpsc::channel(config.message_queue.max(1));
        let acceptor = tokio::spawn(accept_loop(inner, config, sender));
        Ok(Listener {
            local_addr,
            accepted: Mutex::new(accepted),
            acceptor,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    /// Returns the next finished handshake. A failed handshake is returned
    /// as an error; the listener keeps working for later calls.
    pub async fn accept(&self) -> Result<(Connection, SocketAddr)> {
        let mut accepted = self.accepted.lock().await;
        match accepted.recv().await {
            Some(result) => result,
            None => Err(Error::ConnectionClosing),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}
