use hyper::client::conn;
use hyper::upgrade::Upgraded;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use super::connection::Connection;
use super::error::{Error, HandshakeError};
use super::handshake;
use super::state::Role;
use crate::config::Config;
use crate::shared::types::*;

async fn upgrade<S>(stream: S, url: &Url) -> Result<Upgraded>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let key = handshake::generate_key();
    let request = handshake::build_request(url, &key)?;

    let (mut sender, connection) = conn::handshake(stream).await?;
    // drives the HTTP exchange and hands the stream over on upgrade; it
    // drops the stream if the sender goes away first
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            debug!(error = %err, "handshake connection ended");
        }
    });

    let response = sender.send_request(request).await?;
    handshake::validate_response(&response, &key)?;
    Ok(hyper::upgrade::on(response).await?)
}

/// Runs the client side of the opening handshake on an already open
/// stream, which may be TLS wrapped for `wss://` urls.
pub async fn connect_stream<S>(stream: S, url: &Url, config: Config) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let upgraded = timeout(config.handshake_timeout, upgrade(stream, url))
        .await
        .map_err(|_| Error::Timeout)??;
    Ok(Connection::from_stream(upgraded, Role::Client, config))
}

pub async fn connect(url: &str) -> Result<Connection> {
    connect_with(url, Config::default()).await
}

/// Opens a TCP connection to a `ws://` url and performs the handshake.
pub async fn connect_with(url: &str, config: Config) -> Result<Connection> {
    let url = Url::parse(url)?;
    if url.scheme() != "ws" {
        return Err(HandshakeError::InvalidUrl("only ws:// urls can be dialed directly").into());
    }
    let host = url
        .host_str()
        .ok_or(HandshakeError::InvalidUrl("missing host"))?;
    let port = url.port_or_known_default().unwrap_or(80);
    // IPv6 hosts come bracketed from the url
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let stream = TcpStream::connect((host, port)).await?;
    debug!(%url, "transport connected");
    connect_stream(stream, &url, config).await
}
