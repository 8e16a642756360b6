//! Interactive shell
//!
//! One command per line. A line starting with `{` is sent as a COMMAND
//! message without the `send` keyword.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use hypercube_runtime::{HyperCubeClient, Msg};

use crate::error::{CliError, Result};

const HELP: &str = "\
Commands:
  send <json>          send a COMMAND message
  echo <text>          ask the server to echo <text>
  ping                 send a localPing
  group <name>         create a group
  subscribe <name>     subscribe to a group
  publish <group-id>   publish to a group
  recv                 print queued inbound messages
  status               show session status and counters
  help                 show this help
  quit | exit          leave the shell";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Send(String),
    Echo(String),
    Ping,
    Group(String),
    Subscribe(String),
    Publish(u64),
    Recv,
    Status,
    Help,
    Quit,
    Empty,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        if line.starts_with('{') {
            serde_json::from_str::<serde_json::Value>(line)?;
            return Ok(Self::Send(line.to_string()));
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let require = |what: &str| -> Result<String> {
            if rest.is_empty() {
                Err(CliError::InvalidCommand(format!("{} needs {}", word, what)))
            } else {
                Ok(rest.to_string())
            }
        };

        match word.to_ascii_lowercase().as_str() {
            "send" => {
                let json = require("a JSON payload")?;
                serde_json::from_str::<serde_json::Value>(&json)?;
                Ok(Self::Send(json))
            }
            "echo" => Ok(Self::Echo(require("some text")?)),
            "ping" => Ok(Self::Ping),
            "group" => Ok(Self::Group(require("a group name")?)),
            "subscribe" | "sub" => Ok(Self::Subscribe(require("a group name")?)),
            "publish" | "pub" => {
                let id = require("a group id")?;
                id.parse()
                    .map(Self::Publish)
                    .map_err(|_| CliError::InvalidCommand(format!("'{}' is not a group id", id)))
            }
            "recv" => Ok(Self::Recv),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            _ => Err(CliError::InvalidCommand(format!(
                "unknown command '{}', try 'help'",
                word
            ))),
        }
    }
}

/// Run the shell until `quit` or end of input
pub async fn run(client: &HyperCubeClient, prompt: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            return Ok(());
        };

        let command = match ShellCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        debug!("shell command: {:?}", command);

        if command == ShellCommand::Quit {
            return Ok(());
        }
        if let Err(e) = execute(client, command) {
            warn!("{}", e);
        }
        print_inbound(client);
    }
}

fn execute(client: &HyperCubeClient, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Send(json) => client.send_msg(&Msg::command(json))?,
        ShellCommand::Echo(text) => client.send_echo(&text)?,
        ShellCommand::Ping => client.send_local_ping()?,
        ShellCommand::Group(name) => client.create_group(&name)?,
        ShellCommand::Subscribe(name) => client.subscribe(&name)?,
        ShellCommand::Publish(group_id) => client.publish(group_id)?,
        ShellCommand::Recv => {
            if !print_inbound(client) {
                println!("(no messages)");
            }
        }
        ShellCommand::Status => print_status(client)?,
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Quit | ShellCommand::Empty => {}
    }
    Ok(())
}

/// Print every queued inbound message, returning whether any were printed
pub fn print_inbound(client: &HyperCubeClient) -> bool {
    let mut printed = false;
    while let Some(msg) = client.recv_msg() {
        println!("<< {}", msg.payload);
        printed = true;
    }
    printed
}

fn print_status(client: &HyperCubeClient) -> Result<()> {
    let status = client.status();
    println!(
        "state: {}  open for data: {}  system id: {}",
        status.state,
        client.is_open_for_data(),
        client.identity().system_id
    );
    println!("{}", serde_json::to_string_pretty(&client.stats())?);
    Ok(())
}
