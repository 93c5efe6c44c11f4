//! # outport
//!
//! Command-line producer and consumer for outport streams.
//!
//! `outport listen` consumes operations and logs each one; `outport send`
//! delivers a single operation. The role (client or server) comes from the
//! loaded configuration.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use outport_core::{ConnectionMode, WebSocketConfig, logging};
use outport_driver::{
    DriverFacade, OperationDispatcher, OperationHandler, OperationType, PayloadSender,
};
use outport_ws::{WsClient, WsServer};

/// Stream outport operations over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "outport", about = "Stream outport operations over WebSocket")]
struct Cli {
    /// JSON config file; defaults and `OUTPORT_*` overrides apply either way.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive operations and log each one until interrupted.
    Listen,
    /// Send a single operation.
    Send {
        /// Operation name (e.g. `save_block`) or numeric tag.
        #[arg(long)]
        operation: OperationType,

        /// Operation data, sent verbatim.
        data: String,
    },
}

/// Logs every operation it receives.
struct LogOperations;

#[async_trait]
impl OperationHandler for LogOperations {
    async fn handle(&self, operation: OperationType, data: &[u8]) -> anyhow::Result<()> {
        let preview: String = String::from_utf8_lossy(data).chars().take(120).collect();
        tracing::info!(%operation, bytes = data.len(), %preview, "operation received");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logging::init_json_subscriber(&cli.log_level);
    } else {
        logging::init_subscriber(&cli.log_level);
    }

    let config = WebSocketConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    tracing::info!(
        url = %config.url,
        mode = ?config.mode,
        ack = config.with_acknowledge,
        "config loaded"
    );

    match cli.command {
        Command::Listen => listen(&config).await,
        Command::Send { operation, data } => send(&config, operation, data.into_bytes()).await,
    }
}

async fn listen(config: &WebSocketConfig) -> Result<()> {
    let dispatcher = Arc::new(OperationDispatcher::new());
    let handler: Arc<dyn OperationHandler> = Arc::new(LogOperations);
    dispatcher.register_all(&handler);

    match config.mode {
        ConnectionMode::Server => {
            let server = WsServer::new(config).context("Failed to create server")?;
            server.register_payload_handler(dispatcher);
            let serving = server.clone();
            let mut handle = tokio::spawn(async move { serving.listen().await });

            tokio::select! {
                res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
                res = &mut handle => {
                    res.context("Server task panicked")?.context("Server stopped")?;
                    return Ok(());
                }
            }

            tracing::info!("Shutting down...");
            server.close().await;
            let _ = handle.await;
        }
        ConnectionMode::Client => {
            let client = Arc::new(
                WsClient::with_payload_handler(config, dispatcher)
                    .context("Failed to create client")?,
            );
            let listening = client.clone();
            let handle = tokio::spawn(async move { listening.listen().await });

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutting down...");
            client.close().await;
            let _ = handle.await;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn send(config: &WebSocketConfig, operation: OperationType, data: Vec<u8>) -> Result<()> {
    match config.mode {
        ConnectionMode::Client => {
            let client = WsClient::new(config).context("Failed to create client")?;
            deliver(&DriverFacade::new(client), operation, data).await
        }
        ConnectionMode::Server => {
            let server = WsServer::new(config).context("Failed to create server")?;
            let serving = server.clone();
            let handle = tokio::spawn(async move { serving.listen().await });

            tracing::info!("waiting for a consumer to connect");
            let retry = config.retry_duration();
            let connected = async {
                while server.connection_count() == 0 && !handle.is_finished() {
                    tokio::time::sleep(retry.min(Duration::from_millis(200))).await;
                }
            };
            tokio::select! {
                () = connected => {}
                res = tokio::signal::ctrl_c() => {
                    res.context("Failed to listen for ctrl-c")?;
                    server.close().await;
                    return Ok(());
                }
            }
            if handle.is_finished() {
                return handle
                    .await
                    .context("Server task panicked")?
                    .context("Server stopped before a consumer connected");
            }

            let result = deliver(&DriverFacade::new(server), operation, data).await;
            let _ = handle.await;
            result
        }
    }
}

/// Send one operation, closing the transport afterwards or on ctrl-c.
async fn deliver<S: PayloadSender>(
    facade: &DriverFacade<S>,
    operation: OperationType,
    data: Vec<u8>,
) -> Result<()> {
    let outcome = tokio::select! {
        res = facade.send_raw(operation, data) => {
            res.with_context(|| format!("Failed to send {operation}")).map(|()| true)
        }
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for ctrl-c").map(|()| false)
        }
    };
    facade.close().await;

    if outcome? {
        tracing::info!(%operation, "operation delivered");
    } else {
        tracing::warn!(%operation, "interrupted before delivery");
    }
    Ok(())
}
