mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use plugwire_frame::DEFAULT_MAX_PAYLOAD;

use crate::cmd::{Command, RunContext};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "plugwire",
    version,
    about = "Framed message transport between a plugin host and its compiler worker"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). Default: warn for `worker`, info otherwise.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// Largest accepted frame payload in bytes.
    #[arg(
        long,
        value_name = "BYTES",
        env = "PLUGWIRE_MAX_PAYLOAD",
        default_value_t = DEFAULT_MAX_PAYLOAD,
        global = true
    )]
    max_payload: usize,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .unwrap_or_else(|| LogLevel::default_for(&cli.command));
    init_logging(cli.log_format, level);

    let ctx = RunContext {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        max_payload: cli.max_payload,
    };

    match cmd::run(cli.command, ctx) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worker_subcommand() {
        let cli = Cli::try_parse_from(["plugwire", "worker"]).expect("worker args should parse");
        assert!(matches!(cli.command, Command::Worker(ref args) if args.socket.is_none()));
        assert_eq!(cli.max_payload, DEFAULT_MAX_PAYLOAD);
        assert_eq!(cli.log_level, None);
    }

    #[test]
    fn explicit_log_level_is_kept() {
        let cli = Cli::try_parse_from(["plugwire", "worker", "--log-level", "debug"])
            .expect("worker args should parse");
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn parses_send_with_worker_command() {
        let cli = Cli::try_parse_from([
            "plugwire",
            "send",
            "--file",
            "Kits.cs",
            "-f",
            "Util.cs",
            "--id",
            "42",
            "--",
            "plugwire",
            "worker",
            "--log-level",
            "debug",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.id, Some(42));
        assert_eq!(args.command, ["plugwire", "worker", "--log-level", "debug"]);
        assert_eq!(args.timeout, "5s");
    }

    #[test]
    fn rejects_socket_with_worker_command() {
        let err = Cli::try_parse_from([
            "plugwire",
            "send",
            "--socket",
            "/tmp/worker.sock",
            "--file",
            "Kits.cs",
            "--",
            "plugwire",
            "worker",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn send_requires_a_file() {
        let err = Cli::try_parse_from(["plugwire", "send", "--socket", "/tmp/worker.sock"])
            .expect_err("missing --file should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_listen_with_global_max_payload() {
        let cli = Cli::try_parse_from([
            "plugwire",
            "listen",
            "/tmp/host.sock",
            "--count",
            "3",
            "--reply",
            "--max-payload",
            "1024",
        ])
        .expect("listen args should parse");

        assert_eq!(cli.max_payload, 1024);
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.count, Some(3));
        assert!(args.reply);
    }
}
