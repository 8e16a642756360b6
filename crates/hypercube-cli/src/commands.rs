//! Command handlers for the HyperCube CLI

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use hypercube_runtime::{HyperCubeClient, Msg, SessionState};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::shell;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Config => Self::handle_config_command(&config),
            Commands::Shell => {
                let client = Self::start_client(&config)?;
                let result = shell::run(&client, &config.cli.prompt).await;
                Self::stop_client(client, result).await
            }
            Commands::Send { json } => {
                serde_json::from_str::<serde_json::Value>(&json)?;
                let client = Self::start_client(&config)?;
                let result = Self::handle_send_command(&client, &config, json).await;
                Self::stop_client(client, result).await
            }
            Commands::Listen { count } => {
                let client = Self::start_client(&config)?;
                let result = Self::handle_listen_command(&client, count).await;
                Self::stop_client(client, result).await
            }
        }
    }

    fn start_client(config: &AppConfig) -> Result<HyperCubeClient> {
        let client = HyperCubeClient::with_tcp(config.client_config())?;
        info!(
            "Connecting to {}:{} as '{}'",
            config.server.host, config.server.port, config.identity.connection_name
        );
        client.init(&config.server.host)?;
        Ok(client)
    }

    async fn stop_client(client: HyperCubeClient, result: Result<()>) -> Result<()> {
        let stopped = client.deinit().await;
        result?;
        stopped?;
        Ok(())
    }

    /// Handle the config command
    fn handle_config_command(config: &AppConfig) -> Result<()> {
        print!("{}", config.to_toml()?);
        Ok(())
    }

    /// Wait for the session to open, send one message and print replies
    async fn handle_send_command(
        client: &HyperCubeClient,
        config: &AppConfig,
        json: String,
    ) -> Result<()> {
        let open_timeout = Duration::from_millis(config.cli.open_timeout_ms);
        if !Self::wait_until_connected(client, open_timeout).await {
            return Err(CliError::Connection(format!(
                "no session with {}:{} after {:?}",
                config.server.host, config.server.port, open_timeout
            )));
        }
        if client.status().state != SessionState::Open {
            warn!("Handshake not acknowledged yet, sending anyway");
        }

        client.send_msg(&Msg::command(json))?;
        info!("Message queued");

        let deadline = Instant::now() + Duration::from_millis(config.cli.reply_wait_ms);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if client.wait_for_data(remaining).await {
                shell::print_inbound(client);
            }
        }
        Ok(())
    }

    /// Wait for `Open`, settling for any connected state once the timeout passes
    async fn wait_until_connected(client: &HyperCubeClient, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if client.status().state == SessionState::Open {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        client.status().is_connected()
    }

    /// Print inbound messages until Ctrl-C or `count` messages
    async fn handle_listen_command(client: &HyperCubeClient, count: Option<usize>) -> Result<()> {
        info!("Listening for messages (Ctrl-C to stop)");
        let mut received = 0usize;

        loop {
            if count.is_some_and(|limit| received >= limit) {
                return Ok(());
            }
            tokio::select! {
                ready = client.wait_for_data(Duration::from_secs(1)) => {
                    if !ready {
                        continue;
                    }
                    while let Some(msg) = client.recv_msg() {
                        println!("{}", msg.payload);
                        received += 1;
                        if count.is_some_and(|limit| received >= limit) {
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted after {} messages", received);
                    return Ok(());
                }
            }
        }
    }
}
