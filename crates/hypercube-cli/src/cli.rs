//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Server host name or address
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Server TCP port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Connection name announced in the handshake
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Group created during the handshake
    #[arg(long, global = true)]
    pub group: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Interactive shell (default)
    Shell,
    /// Connect, send one JSON message and print any replies
    Send {
        /// JSON payload for the COMMAND subsystem
        json: String,
    },
    /// Print inbound messages until Ctrl-C
    Listen {
        /// Stop after this many messages
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    /// The subcommand to run, defaulting to the shell
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Shell)
    }
}
