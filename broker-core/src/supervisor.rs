use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use broker_types::{BrokerError, BrokerResult, ExternalServerInfo, McpServersFile, ServerState, ServerTransportConfig, ToolDescriptor, ToolOrigin};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex as AsyncMutex, RwLock};

use crate::event_bus::{publish_event, EventSink};
use crate::frame_accumulator::FrameAccumulator;

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const PROTOCOL_VERSION: &str = "2024-11-05";
const RESTART_DELAY: Duration = Duration::from_secs(1);

type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

/// One spawned child-process MCP server, spec.md §4.4.
struct ChildServer {
    name: String,
    config: ServerTransportConfig,
    process: Option<Child>,
    stdin: Option<Arc<AsyncMutex<ChildStdin>>>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    tools: Vec<ToolDescriptor>,
    state: ServerState,
    started_at: chrono::DateTime<Utc>,
    accumulator: Arc<std::sync::Mutex<FrameAccumulator>>,
}

impl ChildServer {
    fn info(&self) -> ExternalServerInfo {
        let (command, args, transport_kind) = match &self.config {
            ServerTransportConfig::Stdio { command, args, .. } => {
                (Some(command.clone()), args.clone(), "stdio")
            }
            ServerTransportConfig::Http { .. } => (None, Vec::new(), "http"),
        };
        ExternalServerInfo {
            name: self.name.clone(),
            transport_kind,
            command,
            args,
            os_pid: self.process.as_ref().and_then(|c| c.id()),
            tools: self.tools.clone(),
            started_at: self.started_at,
            auto_restart: self.config.auto_restart(),
            state: self.state,
        }
    }

    /// Send one JSON-RPC request and wait for its matching reply.
    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> BrokerResult<Value> {
        let stdin = self
            .stdin
            .clone()
            .ok_or_else(|| BrokerError::UpstreamError(format!("{} is not running", self.name)))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let mut line = serde_json::to_string(&request).map_err(BrokerError::from)?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        {
            let mut guard = stdin.lock().await;
            if guard.write_all(line.as_bytes()).await.is_err() {
                self.pending.lock().unwrap().remove(&id);
                return Err(BrokerError::UpstreamError(format!("{} stdin closed", self.name)));
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(upstream_error))) => Err(BrokerError::UpstreamError(upstream_error)),
            Ok(Err(_)) => Err(BrokerError::UpstreamError(format!("{} closed before replying", self.name))),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                self.accumulator.lock().unwrap().discard();
                Err(BrokerError::Timeout(format!("{} did not reply to {method}", self.name)))
            }
        }
    }
}

/// Spawns and supervises downstream MCP servers, spec.md §4.4.
///
/// Owns the set of child-process handles exclusively (spec.md §3
/// "Ownership summary"); nothing else mutates it.
#[derive(Clone)]
pub struct DownstreamSupervisor {
    servers: Arc<RwLock<HashMap<String, ChildServer>>>,
    tool_index: Arc<RwLock<HashMap<String, String>>>,
    sink: Arc<dyn EventSink>,
    pid_dir: std::path::PathBuf,
}

impl DownstreamSupervisor {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            servers: Arc::new(RwLock::new(HashMap::new())),
            tool_index: Arc::new(RwLock::new(HashMap::new())),
            sink,
            pid_dir: std::env::temp_dir(),
        }
    }

    /// Loads `{servers: {...}}` from `path`; supplies an empty config when
    /// the file is missing (spec.md §4.4 "Configuration").
    pub fn load_config(path: &std::path::Path) -> BrokerResult<McpServersFile> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(BrokerError::from),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(McpServersFile::default()),
            Err(err) => Err(BrokerError::Internal(err.to_string())),
        }
    }

    pub async fn start_all(&self, config: McpServersFile) {
        for (name, cfg) in config.servers {
            self.start_server(name, cfg).await;
        }
    }

    /// Starts every configured server and spawns a [`Self::monitor`] task
    /// for each one whose process actually came up, so auto-restart (spec.md
    /// §4.4) happens without the caller having to track server names itself.
    pub async fn start_all_and_monitor(self: &Arc<Self>, config: McpServersFile) {
        self.start_all(config).await;
        let running: Vec<String> = self
            .servers
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.process.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        for name in running {
            tokio::spawn(Arc::clone(self).monitor(name));
        }
    }

    pub async fn start_server(&self, name: String, config: ServerTransportConfig) {
        let ServerTransportConfig::Stdio { .. } = &config else {
            // HTTP type is recognized but a no-op for discovery, spec.md §4.4.
            self.servers.write().await.insert(
                name.clone(),
                ChildServer {
                    name,
                    config,
                    process: None,
                    stdin: None,
                    pending: Arc::new(std::sync::Mutex::new(HashMap::new())),
                    next_id: Arc::new(AtomicU64::new(1)),
                    tools: Vec::new(),
                    accumulator: Arc::new(std::sync::Mutex::new(FrameAccumulator::new())),
                    state: ServerState::Stopped,
                    started_at: Utc::now(),
                },
            );
            return;
        };

        let spawned = self.spawn_and_handshake(&name, &config).await;
        match spawned {
            Ok((child_server, tools)) => {
                self.index_tools(&name, &tools).await;
                let mut servers = self.servers.write().await;
                servers.insert(name, ChildServer { tools, ..child_server });
            }
            Err(err) => {
                tracing::warn!(server = %name, error = %err, "downstream server failed to start; continuing with empty tool set");
                self.servers.write().await.insert(
                    name.clone(),
                    ChildServer {
                        name,
                        config,
                        process: None,
                        stdin: None,
                        pending: Arc::new(std::sync::Mutex::new(HashMap::new())),
                        next_id: Arc::new(AtomicU64::new(1)),
                        tools: Vec::new(),
                        accumulator: Arc::new(std::sync::Mutex::new(FrameAccumulator::new())),
                        state: ServerState::Failed,
                        started_at: Utc::now(),
                    },
                );
            }
        }
    }

    async fn spawn_and_handshake(
        &self,
        name: &str,
        config: &ServerTransportConfig,
    ) -> BrokerResult<(ChildServer, Vec<ToolDescriptor>)> {
        let ServerTransportConfig::Stdio { command, args, env, .. } = config else {
            return Err(BrokerError::Internal("not a stdio server".to_string()));
        };

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(env.clone())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|err| BrokerError::UpstreamError(format!("failed to spawn {name}: {err}")))?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.write_pid_file(name, pid);
        }

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BrokerError::Internal("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BrokerError::Internal("child has no stdout".to_string()))?;

        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let accumulator = Arc::new(std::sync::Mutex::new(FrameAccumulator::new()));
        spawn_reader(stdout, pending.clone(), accumulator.clone());

        let child_server = ChildServer {
            name: name.to_string(),
            config: config.clone(),
            process: Some(child),
            stdin: Some(Arc::new(AsyncMutex::new(stdin))),
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            tools: Vec::new(),
            accumulator,
            state: ServerState::Starting,
            started_at: Utc::now(),
        };

        let init_result = child_server
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {"name": "mcp-broker", "version": env!("CARGO_PKG_VERSION")},
                    "capabilities": {},
                })),
                DISCOVERY_TIMEOUT,
            )
            .await;

        if let Err(err) = init_result {
            tracing::warn!(server = %name, error = %err, "initialize failed or timed out");
            return Ok((
                ChildServer {
                    state: ServerState::Failed,
                    ..child_server
                },
                Vec::new(),
            ));
        }

        let tools = self.discover_tools(&child_server).await.unwrap_or_default();

        Ok((
            ChildServer {
                state: ServerState::Running,
                ..child_server
            },
            tools,
        ))
    }

    async fn discover_tools(&self, server: &ChildServer) -> BrokerResult<Vec<ToolDescriptor>> {
        let response = server
            .request("tools/list", Some(json!({})), DISCOVERY_TIMEOUT)
            .await?;
        let raw_tools = response
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let tools = raw_tools
            .into_iter()
            .filter_map(|raw| {
                let name = raw.get("name")?.as_str()?.to_string();
                let description = raw
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let input_schema = raw.get("inputSchema").or_else(|| raw.get("input_schema")).cloned().unwrap_or(json!({}));
                Some(
                    ToolDescriptor {
                        name,
                        description,
                        input_schema,
                        origin: ToolOrigin::External {
                            server_name: server.name.clone(),
                        },
                    }
                    // spec.md §4.4 step 6: inject agent_id into the schema.
                    .with_injected_agent_id(),
                )
            })
            .collect();
        Ok(tools)
    }

    async fn index_tools(&self, server_name: &str, tools: &[ToolDescriptor]) {
        let mut index = self.tool_index.write().await;
        for tool in tools {
            // First-seen wins on collision, spec.md §4.4 "Tool routing".
            index.entry(tool.name.clone()).or_insert_with(|| server_name.to_string());
        }
    }

    /// Re-runs discovery on every alive child and rebuilds the routing map.
    pub async fn refresh_tools(&self) {
        let names: Vec<String> = self.servers.read().await.keys().cloned().collect();
        self.tool_index.write().await.clear();
        for name in names {
            let tools = {
                let servers = self.servers.read().await;
                let Some(server) = servers.get(&name) else { continue };
                if server.state != ServerState::Running {
                    continue;
                }
                self.discover_tools(server).await.unwrap_or_default()
            };
            self.index_tools(&name, &tools).await;
            if let Some(server) = self.servers.write().await.get_mut(&name) {
                server.tools = tools;
            }
        }
    }

    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.servers
            .read()
            .await
            .values()
            .flat_map(|s| s.tools.clone())
            .collect()
    }

    pub async fn server_for_tool(&self, tool_name: &str) -> Option<String> {
        self.tool_index.read().await.get(tool_name).cloned()
    }

    /// Forwards a tool call to the owning child, spec.md §4.1 routing rule 3.
    pub async fn call_tool(&self, server_name: &str, tool_name: &str, arguments: Value) -> BrokerResult<Value> {
        let servers = self.servers.read().await;
        let server = servers
            .get(server_name)
            .ok_or_else(|| BrokerError::NotFound(format!("downstream server {server_name} not found")))?;
        server
            .request(
                "tools/call",
                Some(json!({"name": tool_name, "arguments": arguments})),
                CALL_TIMEOUT,
            )
            .await
    }

    pub async fn list_servers(&self) -> Vec<ExternalServerInfo> {
        self.servers.read().await.values().map(ChildServer::info).collect()
    }

    /// Best-effort termination of every running child on broker shutdown.
    /// A child that won't die within its own `kill()` call is logged and
    /// left behind rather than blocking shutdown indefinitely.
    pub async fn shutdown(&self) {
        let mut servers = self.servers.write().await;
        for (name, server) in servers.iter_mut() {
            server.state = ServerState::Stopped;
            if let Some(mut process) = server.process.take() {
                if let Err(err) = process.kill().await {
                    tracing::warn!(server = %name, error = %err, "failed to terminate downstream server");
                }
            }
            server.stdin = None;
            self.remove_pid_file(name);
        }
    }

    fn write_pid_file(&self, name: &str, pid: u32) {
        let path = self.pid_dir.join(format!("mcp-broker-{name}.pid"));
        if let Err(err) = std::fs::write(&path, pid.to_string()) {
            tracing::warn!(server = %name, error = %err, "failed to write pid file");
        }
    }

    fn remove_pid_file(&self, name: &str) {
        let path = self.pid_dir.join(format!("mcp-broker-{name}.pid"));
        let _ = std::fs::remove_file(path);
    }

    /// Watches a child for unexpected exit; on death, cleans up and
    /// reschedules a restart if `auto_restart` is set, spec.md §4.4 step 7.
    pub async fn monitor(self: Arc<Self>, name: String) {
        let mut child = {
            let mut servers = self.servers.write().await;
            let Some(server) = servers.get_mut(&name) else { return };
            server.process.take()
        };
        let Some(mut child) = child.take() else { return };

        let _ = child.wait().await;
        self.remove_pid_file(&name);

        let (config, auto_restart) = {
            let mut servers = self.servers.write().await;
            let Some(server) = servers.get_mut(&name) else { return };
            server.state = ServerState::Failed;
            server.process = None;
            server.stdin = None;
            (server.config.clone(), server.config.auto_restart())
        };

        publish_event(
            self.sink.as_ref(),
            "downstream.server.exited",
            json!({"server": name}),
        )
        .await;

        if auto_restart {
            let supervisor = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RESTART_DELAY).await;
                supervisor.start_server(name, config).await;
            });
        }
    }
}

fn spawn_reader(
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
    accumulator: Arc<std::sync::Mutex<FrameAccumulator>>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let parsed = accumulator.lock().unwrap().push_line(&line);
                    if let Some(value) = parsed {
                        if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
                            if let Some(tx) = pending.lock().unwrap().remove(&id) {
                                let reply = match value.get("error") {
                                    Some(error) => Err(error.to_string()),
                                    None => Ok(value.get("result").cloned().unwrap_or(value)),
                                };
                                let _ = tx.send(reply);
                            }
                        }
                    }
                }
                Ok(None) => {
                    accumulator.lock().unwrap().discard();
                    break;
                }
                Err(_) => {
                    accumulator.lock().unwrap().discard();
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::NoopSink;

    #[test]
    fn missing_config_file_yields_defaults() {
        let path = std::path::Path::new("/nonexistent/mcp_servers.json");
        let config = DownstreamSupervisor::load_config(path).unwrap();
        assert!(config.servers.is_empty());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_servers.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(DownstreamSupervisor::load_config(&path).is_err());
    }

    #[test]
    fn well_formed_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_servers.json");
        std::fs::write(
            &path,
            r#"{"servers": {"search": {"type": "stdio", "command": "search-mcp", "args": []}}}"#,
        )
        .unwrap();
        let config = DownstreamSupervisor::load_config(&path).unwrap();
        assert!(config.servers.contains_key("search"));
    }

    #[tokio::test]
    async fn unknown_server_call_is_not_found() {
        let supervisor = DownstreamSupervisor::new(Arc::new(NoopSink));
        let err = supervisor
            .call_tool("ghost", "whatever", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }

    #[tokio::test]
    async fn first_seen_wins_on_tool_name_collision() {
        let supervisor = DownstreamSupervisor::new(Arc::new(NoopSink));
        let tool = ToolDescriptor {
            name: "shared_tool".to_string(),
            description: String::new(),
            input_schema: json!({}),
            origin: ToolOrigin::External { server_name: "a".to_string() },
        };
        supervisor.index_tools("a", &[tool.clone()]).await;
        supervisor.index_tools("b", &[tool]).await;
        assert_eq!(supervisor.server_for_tool("shared_tool").await, Some("a".to_string()));
    }
}
