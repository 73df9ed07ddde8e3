use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ws_duplex::{connect_with, Config, Connection, Listener, Message};

#[derive(Debug, Parser)]
#[command(name = "ws-duplex", about = "WebSocket echo server and line client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// How long a closing handshake may take, in milliseconds
    #[arg(long, default_value_t = 5000)]
    close_timeout_ms: u64,
    #[arg(long, default_value_t = Config::DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Echo every message back to its sender
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
    /// Send stdin lines as text messages and print the replies
    Connect {
        #[arg(default_value = "ws://127.0.0.1:8080/")]
        url: String,
    },
}

async fn echo(connection: Connection) -> ws_duplex::Result<()> {
    while let Some(message) = connection.recv().await? {
        connection.send(message).await?;
    }
    Ok(())
}

async fn serve(addr: SocketAddr, config: Config) -> Result<()> {
    let listener = Listener::bind_with(addr, config).await?;
    info!("Listening at ws://{}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((connection, peer)) => {
                info!(%peer, id = %connection.id(), "client connected");
                tokio::spawn(async move {
                    if let Err(e) = echo(connection).await {
                        warn!(%peer, error = %e, "connection ended with an error");
                    }
                });
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

async fn client(url: &str, config: Config) -> Result<()> {
    let connection = Arc::new(
        connect_with(url, config)
            .await
            .with_context(|| format!("connecting to {}", url))?,
    );
    info!(id = %connection.id(), "connected to {}", url);

    let printer = {
        let connection = connection.clone();
        tokio::spawn(async move {
            loop {
                match connection.recv().await {
                    Ok(Some(Message::Text(text))) => println!("{}", text),
                    Ok(Some(Message::Binary(data))) => println!("<{} bytes>", data.len()),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "connection failed");
                        break;
                    }
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line == "exit" {
            break;
        }
        connection.send_text(line).await?;
    }

    connection.close(None).await?;
    printer.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::default()
        .close_timeout(Duration::from_millis(cli.close_timeout_ms))
        .max_message_size(cli.max_message_size);

    match cli.command {
        Command::Serve { addr } => serve(addr, config).await,
        Command::Connect { url } => client(&url, config).await,
    }
}
