use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use crate::cmd::Command;

/// Filter directives in this variable take precedence over `--log-level`,
/// e.g. `PLUGWIRE_LOG=plugwire_client=trace,warn`.
pub const LOG_FILTER_ENV: &str = "PLUGWIRE_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Level used when `--log-level` is absent.
    ///
    /// A worker's stderr usually ends up in its host's console, so it only
    /// reports problems by default.
    pub fn default_for(command: &Command) -> Self {
        match command {
            Command::Worker(_) => LogLevel::Warn,
            Command::Send(_) | Command::Listen(_) | Command::Version(_) => LogLevel::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Directive string for the subscriber filter. A non-blank override wins.
fn filter_directive(env_override: Option<String>, level: LogLevel) -> String {
    env_override
        .map(|directive| directive.trim().to_string())
        .filter(|directive| !directive.is_empty())
        .unwrap_or_else(|| level.as_str().to_string())
}

fn build_filter(env_override: Option<String>, level: LogLevel) -> EnvFilter {
    let directive = filter_directive(env_override, level);
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("warning: ignoring {LOG_FILTER_ENV}={directive:?}: {err}");
        EnvFilter::new(level.as_str())
    })
}

/// Logs always go to stderr: a stdio worker's stdout carries frames.
///
/// Thread names are included so lines from a connection's `<name>-read` and
/// `<name>-write` loops can be told apart.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = build_filter(std::env::var(LOG_FILTER_ENV).ok(), level);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
