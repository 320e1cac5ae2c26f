//! Command-line interface for mediagrid.
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

/// Logging verbosity accepted by `--log-level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No log output at all.
    Off,
    /// Errors only.
    Error,
    /// Errors and warnings.
    Warn,
    /// Normal operational logging.
    Info,
    /// Verbose diagnostics.
    Debug,
    /// Everything, including per-round tracing.
    Trace,
}

impl LogLevel {
    /// The `tracing` filter this level maps to.
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Directive string understood by `EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Command-line interface for mediagrid.
#[derive(Parser)]
#[command(name = "mediagrid", version, author)]
#[command(about = "A service registry and job dispatcher for media processing clusters", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Store runtime state in system directories instead of the home
    /// directory. Requires write access to /var/lib.
    #[arg(long = "sys", global = true)]
    pub sys: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mediagrid.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the registry node with the given configuration.
    Start {
        /// Path to the configuration file (defaults to `mediagrid.yaml`).
        #[arg(short, long, default_value = "mediagrid.yaml")]
        config: String,
    },

    /// Parse a configuration file and print the resolved settings.
    Validate {
        /// Path to the configuration file (defaults to `mediagrid.yaml`).
        #[arg(short, long, default_value = "mediagrid.yaml")]
        config: String,

        /// Emit machine-readable JSON output instead of a summary.
        #[arg(long)]
        json: bool,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
