//! HyperCube CLI
//!
//! Terminal front end for the HyperCube client: an interactive shell plus
//! one-shot `send`, `listen` and `config` commands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod shell;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, CliOverrides};
pub use error::{CliError, Result};
