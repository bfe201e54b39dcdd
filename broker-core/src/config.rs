use std::path::PathBuf;
use std::time::Duration;

use broker_types::session::DEFAULT_SESSION_TTL_MINUTES;

use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;

const DEFAULT_CONFIG_FILE: &str = "mcp_servers.json";
const DEFAULT_INTERFACE_MODE: &str = "stdio";
const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
const DEFAULT_HTTP_PORT: u16 = 8787;

/// Process-wide configuration, spec.md §5 "loaded once at startup and
/// treated as immutable for the lifetime of the broker".
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub mcp_config_file: PathBuf,
    pub interface_mode: String,
    pub http_host: String,
    pub http_port: u16,
    pub default_session_ttl: Duration,
    pub heartbeat_interval: Duration,
}

impl BrokerConfig {
    /// Reads `MCP_CONFIG_FILE`, `MCP_INTERFACE_MODE`, `MCP_HTTP_HOST`,
    /// `MCP_HTTP_PORT` (spec.md §6 "Environment variables"), falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            mcp_config_file: std::env::var("MCP_CONFIG_FILE")
                .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
                .into(),
            interface_mode: std::env::var("MCP_INTERFACE_MODE").unwrap_or_else(|_| DEFAULT_INTERFACE_MODE.to_string()),
            http_host: std::env::var("MCP_HTTP_HOST").unwrap_or_else(|_| DEFAULT_HTTP_HOST.to_string()),
            http_port: std::env::var("MCP_HTTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HTTP_PORT),
            default_session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_MINUTES as u64 * 60),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// `MCP_INTERFACE_MODE` may list several transports, e.g. `"stdio,http"`.
    pub fn interface_modes(&self) -> Vec<String> {
        self.interface_mode
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_mode_is_a_one_element_list() {
        let mut config = BrokerConfig::from_env();
        config.interface_mode = "stdio".to_string();
        assert_eq!(config.interface_modes(), vec!["stdio".to_string()]);
    }

    #[test]
    fn comma_separated_modes_are_split_and_trimmed() {
        let mut config = BrokerConfig::from_env();
        config.interface_mode = "stdio, http , websocket".to_string();
        assert_eq!(
            config.interface_modes(),
            vec!["stdio".to_string(), "http".to_string(), "websocket".to_string()]
        );
    }
}
