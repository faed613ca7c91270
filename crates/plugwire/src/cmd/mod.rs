use clap::{Args, Subcommand};
use std::path::PathBuf;

use plugwire_client::ClientConfig;
use plugwire_frame::{ChannelConfig, Message};

use crate::exit::CliResult;
#[cfg(not(unix))]
use crate::exit::{CliError, USAGE};
use crate::output::OutputFormat;

#[cfg(unix)]
pub mod listen;
pub mod send;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a reference compiler worker over stdio or a socket.
    Worker(WorkerArgs),
    /// Send one compile request to a worker and print the reply.
    Send(SendArgs),
    /// Accept worker connections and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub format: OutputFormat,
    pub max_payload: usize,
}

impl RunContext {
    pub fn client_config<M: Message>(&self, name: &str) -> ClientConfig {
        ClientConfig::named(name).with_channel(
            ChannelConfig::for_message::<M>().with_max_payload_size(self.max_payload),
        )
    }
}

pub fn run(command: Command, ctx: RunContext) -> CliResult<i32> {
    match command {
        Command::Worker(args) => worker::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        #[cfg(unix)]
        Command::Listen(args) => listen::run(args, ctx),
        #[cfg(not(unix))]
        Command::Listen(_) => Err(CliError::new(
            USAGE,
            "listen requires Unix domain socket support",
        )),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Connect to a host listening on this socket instead of using stdio.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Connect to a worker socket instead of spawning a worker.
    #[arg(long, value_name = "PATH", conflicts_with = "command")]
    pub socket: Option<PathBuf>,
    /// Source file to compile (repeatable).
    #[arg(long = "file", short = 'f', value_name = "PATH", required = true)]
    pub files: Vec<PathBuf>,
    /// Request id. Default: next generated id.
    #[arg(long)]
    pub id: Option<u32>,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Worker command line to spawn, after `--`.
    #[arg(last = true, value_name = "WORKER")]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Answer compile requests the way `plugwire worker` does.
    #[arg(long)]
    pub reply: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
