use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the `mcp_servers.json` configuration file, spec.md §4.4/§6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerTransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default = "default_auto_restart")]
        auto_restart: bool,
        #[serde(default)]
        description: Option<String>,
    },
    Http {
        url: String,
        #[serde(default = "default_auto_restart")]
        auto_restart: bool,
        #[serde(default)]
        description: Option<String>,
    },
}

fn default_auto_restart() -> bool {
    true
}

impl ServerTransportConfig {
    pub fn auto_restart(&self) -> bool {
        match self {
            ServerTransportConfig::Stdio { auto_restart, .. } => *auto_restart,
            ServerTransportConfig::Http { auto_restart, .. } => *auto_restart,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpServersFile {
    #[serde(default)]
    pub servers: HashMap<String, ServerTransportConfig>,
}

/// Origin of a tool surfaced through `tools/list`, spec.md §3/§4.5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOrigin {
    Coordinator,
    Vscode,
    External { server_name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub origin: ToolOrigin,
}

impl ToolDescriptor {
    /// Injects `agent_id: string (required)` into the schema, per spec.md
    /// §4.4 step 6 — external tools learn a parameter their upstream never
    /// sees; the dispatcher strips it back out on forward (§4.1 routing rule 3).
    pub fn with_injected_agent_id(mut self) -> Self {
        if let Value::Object(schema) = &mut self.input_schema {
            let properties = schema
                .entry("properties")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Value::Object(props) = properties {
                props.insert(
                    "agent_id".to_string(),
                    serde_json::json!({"type": "string", "description": "Calling agent's id"}),
                );
            }
            let required = schema
                .entry("required")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(req) = required {
                let already = req.iter().any(|v| v.as_str() == Some("agent_id"));
                if !already {
                    req.push(Value::String("agent_id".to_string()));
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Starting,
    Running,
    Failed,
    Stopped,
}

/// A supervised downstream MCP server process, spec.md §3 `ExternalServer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServerInfo {
    pub name: String,
    pub transport_kind: &'static str,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub os_pid: Option<u32>,
    pub tools: Vec<ToolDescriptor>,
    pub started_at: DateTime<Utc>,
    pub auto_restart: bool,
    pub state: ServerState,
}
