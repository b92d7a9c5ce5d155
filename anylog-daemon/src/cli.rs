//! CLI argument definitions for anylog-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Anylog syslog ingestion daemon.
///
/// Receives syslog over UDP, parses it into structured records,
/// runs them through the configured processor/writer chain, and
/// optionally advertises an anycast route while the node is healthy.
#[derive(Parser, Debug)]
#[command(name = "anylog-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to anylog.toml configuration file.
    #[arg(short, long, default_value = "/etc/anylog/anylog.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub check_config: bool,
}
