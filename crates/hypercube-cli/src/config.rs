//! HyperCube CLI Configuration Management
//!
//! Configuration is layered with figment, later layers winning:
//! defaults, then `hypercube.toml` (or the `--config` file), then
//! `HYPERCUBE_*` environment variables, then command-line flags.
//!
//! Environment keys use a double underscore between section and field, for
//! example `HYPERCUBE_SERVER__PORT=6000`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use hypercube_core::{ClientConfig, DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_READ_CHUNK_LEN, DEFAULT_SERVER_PORT};

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the HyperCube CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub identity: IdentityConfig,
    pub limits: LimitsConfig,
    pub cli: CliConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name or address of the HyperCube server
    pub host: String,
    pub port: u16,
}

/// Reconnect timing, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub reconnect_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub connection_name: String,
    pub group_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_payload_len: usize,
    pub read_chunk_len: usize,
}

/// Front-end behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    pub verbose: bool,
    pub prompt: String,
    /// How long `send` waits for the session to open
    pub open_timeout_ms: u64,
    /// How long `send` keeps printing replies before exiting
    pub reply_wait_ms: u64,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub group: Option<String>,
    pub verbose: bool,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for AppConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: DEFAULT_SERVER_PORT,
            },
            session: SessionConfig {
                reconnect_interval_ms: client.reconnect_interval.as_millis() as u64,
                reconnect_delay_ms: client.reconnect_delay.as_millis() as u64,
                connect_timeout_ms: client.connect_timeout.as_millis() as u64,
            },
            identity: IdentityConfig {
                connection_name: client.connection_name,
                group_name: client.group_name,
            },
            limits: LimitsConfig {
                max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
                read_chunk_len: DEFAULT_READ_CHUNK_LEN,
            },
            cli: CliConfig {
                verbose: false,
                prompt: "hypercube> ".to_string(),
                open_timeout_ms: 5_000,
                reply_wait_ms: 2_000,
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with the standard priority order:
    /// 1. Command line arguments (highest priority)
    /// 2. Environment variables
    /// 3. Configuration file (`--config`, else `hypercube.toml` and the user config file)
    /// 4. Default values (lowest priority)
    pub fn load(config_file: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "configuration file {} not found",
                        path.display()
                    )));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(user_file) = Self::default_config_path() {
                    figment = figment.merge(Toml::file(user_file));
                }
                figment = figment.merge(Toml::file("hypercube.toml"));
            }
        }

        figment = figment.merge(Env::prefixed("HYPERCUBE_").split("__"));
        figment = Self::apply_overrides(figment, overrides);

        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(mut figment: Figment, overrides: &CliOverrides) -> Figment {
        if let Some(server) = &overrides.server {
            figment = figment.merge(("server.host", server.clone()));
        }
        if let Some(port) = overrides.port {
            figment = figment.merge(("server.port", port));
        }
        if let Some(name) = &overrides.name {
            figment = figment.merge(("identity.connection_name", name.clone()));
        }
        if let Some(group) = &overrides.group {
            figment = figment.merge(("identity.group_name", group.clone()));
        }
        if overrides.verbose {
            figment = figment.merge(("cli.verbose", true));
        }
        figment
    }

    /// User configuration file, e.g. `~/.config/hypercube/hypercube.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hypercube").join("hypercube.toml"))
    }

    /// Client settings derived from this configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_port: self.server.port,
            reconnect_interval: Duration::from_millis(self.session.reconnect_interval_ms),
            reconnect_delay: Duration::from_millis(self.session.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.session.connect_timeout_ms),
            max_payload_len: self.limits.max_payload_len,
            read_chunk_len: self.limits.read_chunk_len,
            connection_name: self.identity.connection_name.clone(),
            group_name: self.identity.group_name.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(CliError::Config("server host must not be empty".to_string()));
        }
        self.client_config().validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
