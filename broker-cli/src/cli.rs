use std::path::PathBuf;

use clap::Parser;

/// Command-line flags for the MCP coordination broker. Every flag mirrors
/// one of `BrokerConfig::from_env`'s environment variables and overrides it
/// when set, the same override-the-environment style as
/// `server/distri-server-cli/src/cli.rs`.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the downstream MCP servers config file (overrides MCP_CONFIG_FILE).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated transports to expose, e.g. "stdio,http" (overrides MCP_INTERFACE_MODE).
    #[arg(long)]
    pub interface_mode: Option<String>,

    /// HTTP bind host (overrides MCP_HTTP_HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP bind port (overrides MCP_HTTP_PORT).
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level passed to `tracing_subscriber`'s `EnvFilter`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
