use std::collections::HashMap;
use std::sync::Arc;

use broker_types::{
    BrokerError, BrokerResult, ClientContext, CoordinationStrategy, CreateTaskOptions,
    CrossCodebaseDependency, DependencyType, Priority, RegisterAgentOptions, ToolDescriptor, ToolOrigin,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::activity;
use crate::codebase_registry::CodebaseRegistry;
use crate::heartbeat::HeartbeatScheduler;
use crate::identifier::CodebaseIdentifier;
use crate::session_manager::SessionManager;
use crate::supervisor::DownstreamSupervisor;
use crate::task_registry::{CreateTaskOutcome, TaskRegistry};
use crate::tool_filter::ToolFilter;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "mcp-broker";

const NATIVE_TOOL_NAMES: &[&str] = &[
    "register_agent",
    "unregister_agent",
    "heartbeat",
    "register_codebase",
    "list_codebases",
    "get_codebase_status",
    "add_codebase_dependency",
    "create_task",
    "create_cross_codebase_task",
    "create_agent_task",
    "register_task_set",
    "get_next_task",
    "complete_task",
    "get_task_board",
    "get_detailed_task_board",
    "get_agent_task_history",
    "discover_codebase_info",
];

fn native_tool_descriptors() -> Vec<ToolDescriptor> {
    fn tool(name: &str, description: &str, schema: Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema,
            origin: ToolOrigin::Coordinator,
        }
    }

    vec![
        tool(
            "register_agent",
            "Register a new coordinating agent.",
            json!({"type": "object", "properties": {"name": {"type": "string"}, "capabilities": {"type": "array", "items": {"type": "string"}}}, "required": ["name", "capabilities"]}),
        ),
        tool(
            "unregister_agent",
            "Unregister an agent.",
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}, "force": {"type": "boolean"}}, "required": ["agent_id"]}),
        ),
        tool(
            "heartbeat",
            "Record agent liveness.",
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}}, "required": ["agent_id"]}),
        ),
        tool(
            "register_codebase",
            "Register a codebase.",
            json!({"type": "object", "properties": {"name": {"type": "string"}, "workspace_path": {"type": "string"}}, "required": ["name", "workspace_path"]}),
        ),
        tool("list_codebases", "List known codebases.", json!({"type": "object", "properties": {}})),
        tool(
            "get_codebase_status",
            "Get a codebase's status and dependencies.",
            json!({"type": "object", "properties": {"codebase_id": {"type": "string"}}, "required": ["codebase_id"]}),
        ),
        tool(
            "add_codebase_dependency",
            "Record a dependency edge between codebases.",
            json!({"type": "object", "properties": {"source": {"type": "string"}, "target": {"type": "string"}, "type": {"type": "string"}}, "required": ["source", "target", "type"]}),
        ),
        tool(
            "create_task",
            "Create a task, assigning it immediately if possible.",
            json!({"type": "object", "properties": {"title": {"type": "string"}, "description": {"type": "string"}}, "required": ["title", "description"]}),
        ),
        tool(
            "create_cross_codebase_task",
            "Create a task spanning multiple codebases.",
            json!({"type": "object", "properties": {"title": {"type": "string"}, "description": {"type": "string"}, "primary_codebase_id": {"type": "string"}, "affected_codebases": {"type": "array", "items": {"type": "string"}}}, "required": ["title", "description", "primary_codebase_id", "affected_codebases"]}),
        ),
        tool(
            "create_agent_task",
            "Create a task addressed directly to one agent.",
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}, "title": {"type": "string"}, "description": {"type": "string"}}, "required": ["agent_id", "title", "description"]}),
        ),
        tool(
            "register_task_set",
            "Create a batch of tasks addressed directly to one agent.",
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}, "task_set": {"type": "array"}}, "required": ["agent_id", "task_set"]}),
        ),
        tool(
            "get_next_task",
            "Pop the next pending task from an agent's inbox.",
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}}, "required": ["agent_id"]}),
        ),
        tool(
            "complete_task",
            "Complete an agent's in-progress task.",
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}}, "required": ["agent_id"]}),
        ),
        tool("get_task_board", "List tasks, optionally scoped to a codebase.", json!({"type": "object", "properties": {"codebase_id": {"type": "string"}}})),
        tool(
            "get_detailed_task_board",
            "List tasks with full detail, optionally scoped to a codebase.",
            json!({"type": "object", "properties": {"codebase_id": {"type": "string"}, "include_task_details": {"type": "boolean"}}}),
        ),
        tool(
            "get_agent_task_history",
            "List an agent's pending/in-progress/completed tasks.",
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}, "include_planned": {"type": "boolean"}, "include_completed": {"type": "boolean"}, "limit": {"type": "integer"}}, "required": ["agent_id"]}),
        ),
        tool(
            "discover_codebase_info",
            "Identify a workspace path as a canonical codebase.",
            json!({"type": "object", "properties": {"workspace_path": {"type": "string"}, "custom_id": {"type": "string"}}, "required": ["workspace_path"]}),
        ),
    ]
}

enum RouteOutcome {
    Native(Value),
    Forwarded(Value),
}

/// Single entry point for every decoded JSON-RPC request, spec.md §4.1.
/// Routes system methods, native tool calls, and external tool calls, and
/// wraps every `tools/call` in a heartbeat + activity update.
#[derive(Clone)]
pub struct Dispatcher {
    tasks: TaskRegistry,
    codebases: CodebaseRegistry,
    sessions: SessionManager,
    supervisor: Arc<DownstreamSupervisor>,
    filter: ToolFilter,
    heartbeat: Option<HeartbeatScheduler>,
}

impl Dispatcher {
    pub fn new(
        tasks: TaskRegistry,
        codebases: CodebaseRegistry,
        sessions: SessionManager,
        supervisor: Arc<DownstreamSupervisor>,
    ) -> Self {
        Self {
            tasks,
            codebases,
            sessions,
            supervisor,
            filter: ToolFilter::new(),
            heartbeat: None,
        }
    }

    /// Wires in the optional per-agent idle-timer scheduler, spec.md §4.9:
    /// "a timer is (re)armed after every dispatcher-wrapped call on that
    /// agent". Without this, liveness still works via the direct
    /// pre/post-call heartbeat below, just not during idle gaps.
    pub fn with_heartbeat_scheduler(mut self, scheduler: HeartbeatScheduler) -> Self {
        self.heartbeat = Some(scheduler);
        self
    }

    /// Handles one decoded request. Returns `None` for notifications
    /// (requests without an `id`) that require no reply.
    pub async fn handle(&self, request: &Value, ctx: &ClientContext) -> Option<Value> {
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(|v| v.as_str()).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        match method {
            "initialize" => Some(rpc_result(id, self.initialize_result())),
            "notifications/initialized" => id.map(|id| rpc_result(Some(id), json!({"acknowledged": true}))),
            "tools/list" => Some(rpc_result(id, self.tools_list_result(ctx).await)),
            "tools/call" => Some(self.handle_tools_call(id, params, ctx).await),
            other => Some(rpc_error(id, &BrokerError::MethodNotFound(other.to_string()))),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {
                "tools": {},
                "coordination": {
                    "taskAssignment": true,
                    "crossCodebase": true,
                    "fileConflictDetection": true,
                },
            },
        })
    }

    async fn tools_list_result(&self, ctx: &ClientContext) -> Value {
        let mut tools = native_tool_descriptors();
        tools.extend(self.supervisor.list_tools().await);
        let filtered = self.filter.filter(ctx, &tools);
        json!({"tools": filtered})
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Value, ctx: &ClientContext) -> Value {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let mut arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        if !ctx.is_local() {
            if let Some(descriptor) = self.find_tool_descriptor(&name).await {
                if !self.filter.allows(ctx, &descriptor) {
                    return rpc_error_with_data(
                        id,
                        -32601,
                        format!("tool '{name}' is not permitted for this connection"),
                        json!({"connection_type": ctx.connection_type}),
                    );
                }
            }
        }

        let agent_id = arguments.get("agent_id").and_then(|v| v.as_str()).map(str::to_string);
        if name != "register_agent" && agent_id.is_none() {
            return rpc_error(
                id,
                &BrokerError::BadRequest("agent_id is required; call register_agent first".to_string()),
            );
        }

        let known_agent = match &agent_id {
            Some(aid) => self.tasks.get_agent(aid).await.is_ok(),
            None => false,
        };

        if known_agent {
            let aid = agent_id.as_deref().unwrap();
            let _ = self.tasks.heartbeat(aid).await;
            if let Some(scheduler) = &self.heartbeat {
                scheduler.rearm(aid).await;
            }
            let activity = activity::infer(&name, &arguments);
            self.tasks.update_agent_activity(aid, activity.human_string, activity.files).await;
        }

        let outcome = self.route_tool_call(&name, &mut arguments).await;

        if known_agent {
            let aid = agent_id.as_deref().unwrap();
            let _ = self.tasks.heartbeat(aid).await;
            if let Some(scheduler) = &self.heartbeat {
                scheduler.rearm(aid).await;
            }
        }

        match outcome {
            Ok(RouteOutcome::Native(value)) => {
                let mut result = json!({"content": [{"type": "text", "text": value_to_text(&value)}]});
                if known_agent {
                    attach_heartbeat_metadata(&mut result, agent_id.as_deref().unwrap());
                }
                rpc_result(id, result)
            }
            Ok(RouteOutcome::Forwarded(value)) => {
                let mut result = parse_content_if_json(value);
                if known_agent {
                    attach_heartbeat_metadata(&mut result, agent_id.as_deref().unwrap());
                }
                rpc_result(id, result)
            }
            Err(err) => rpc_error(id, &err),
        }
    }

    /// Routing rules for `tools/call`, spec.md §4.1 (in order): native
    /// coordinator table, then a VS Code provider (never loaded here — no
    /// VS Code bridge is implemented, so this rule is permanently a no-op
    /// and falls through), then the external-tool index, then not-found.
    async fn route_tool_call(&self, name: &str, arguments: &mut Value) -> BrokerResult<RouteOutcome> {
        if NATIVE_TOOL_NAMES.contains(&name) {
            return self.call_native_guarded(name, arguments.clone()).await.map(RouteOutcome::Native);
        }

        if let Some(server_name) = self.supervisor.server_for_tool(name).await {
            if let Some(obj) = arguments.as_object_mut() {
                obj.remove("agent_id");
            }
            let value = self.supervisor.call_tool(&server_name, name, arguments.clone()).await?;
            return Ok(RouteOutcome::Forwarded(value));
        }

        Err(BrokerError::NotFound("Tool not found".to_string()))
    }

    /// Runs a native handler on its own task so a handler panic is caught
    /// and reported as an error instead of taking the broker down, mirroring
    /// `server/distri-core/src/tools/mcp.rs`'s `catch_unwind`-around-`spawn`
    /// pattern for MCP tool calls.
    async fn call_native_guarded(&self, name: &str, args: Value) -> BrokerResult<Value> {
        let dispatcher = self.clone();
        let name_owned = name.to_string();
        let handle = tokio::spawn(async move { dispatcher.call_native(&name_owned, &args).await });
        match handle.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                tracing::error!(tool = name, "native handler panicked and was recovered");
                Err(BrokerError::Internal(format!("tool '{name}' panicked")))
            }
            Err(join_error) => Err(BrokerError::Internal(join_error.to_string())),
        }
    }

    async fn call_native(&self, name: &str, args: &Value) -> BrokerResult<Value> {
        match name {
            "register_agent" => {
                let name = require_str(args, "name")?.to_string();
                let capabilities = require_str_array(args, "capabilities")?;
                let opts = RegisterAgentOptions {
                    codebase_id: opt_str(args, "codebase_id"),
                    workspace_path: opt_str(args, "workspace_path"),
                    cross_codebase_capable: opt_bool(args, "cross_codebase_capable", false),
                    metadata: opt_metadata(args, "metadata"),
                };
                let (agent, session) = self.tasks.register_agent(name, capabilities, opts, true).await?;
                let mut result = json!({
                    "agent_id": agent.id,
                    "codebase_id": agent.codebase_id,
                    "status": "registered",
                });
                if let Some(session) = session {
                    result["session_token"] = json!(session.token);
                    result["expires_at"] = json!(session.expires_at);
                }
                Ok(result)
            }
            "unregister_agent" => {
                let agent_id = require_str(args, "agent_id")?;
                let force = opt_bool(args, "force", false);
                self.tasks.unregister(agent_id, force).await?;
                if let Some(scheduler) = &self.heartbeat {
                    scheduler.cancel(agent_id).await;
                }
                Ok(json!({"status": "agent_unregistered"}))
            }
            "heartbeat" => {
                let agent_id = require_str(args, "agent_id")?;
                self.tasks.heartbeat(agent_id).await?;
                Ok(json!({"status": "heartbeat_received"}))
            }
            "register_codebase" => {
                let codebase_name = require_str(args, "name")?.to_string();
                let workspace_path = require_str(args, "workspace_path")?.to_string();
                let id = opt_str(args, "id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let mut metadata = opt_metadata(args, "metadata");
                if let Some(description) = opt_str(args, "description") {
                    metadata.entry("description".to_string()).or_insert(json!(description));
                }
                let codebase = self.codebases.register(id, codebase_name, Some(workspace_path), metadata).await;
                Ok(serde_json::to_value(codebase)?)
            }
            "list_codebases" => Ok(json!({"codebases": self.codebases.list().await})),
            "get_codebase_status" => {
                let codebase_id = require_str(args, "codebase_id")?;
                let codebase = self.codebases.get(codebase_id).await?;
                let dependencies = self.codebases.dependencies_for(codebase_id).await;
                Ok(json!({"codebase": codebase, "dependencies": dependencies}))
            }
            "add_codebase_dependency" => {
                let source = require_str(args, "source")?.to_string();
                let target = require_str(args, "target")?.to_string();
                let dependency_type = parse_dependency_type(require_str(args, "type")?)?;
                let metadata = opt_metadata(args, "metadata");
                let dependency = self.codebases.add_dependency(source, target, dependency_type, metadata).await;
                Ok(serde_json::to_value(dependency)?)
            }
            "create_task" => {
                let outcome = self.tasks.create_task(
                    require_str(args, "title")?.to_string(),
                    require_str(args, "description")?.to_string(),
                    parse_create_task_options(args)?,
                ).await;
                Ok(create_task_response(outcome))
            }
            "create_cross_codebase_task" => {
                let title = require_str(args, "title")?.to_string();
                let description = require_str(args, "description")?.to_string();
                let primary_codebase_id = require_str(args, "primary_codebase_id")?.to_string();
                let affected_codebases = require_str_array(args, "affected_codebases")?;
                let strategy = args
                    .get("coordination_strategy")
                    .and_then(|v| v.as_str())
                    .and_then(parse_strategy)
                    .unwrap_or(CoordinationStrategy::Parallel);
                let (main_task, dependents) = self
                    .tasks
                    .create_cross_codebase_task(title, description, primary_codebase_id, affected_codebases, strategy)
                    .await;
                Ok(json!({
                    "main_task_id": main_task.id,
                    "dependent_task_ids": dependents.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
                }))
            }
            "create_agent_task" => {
                let agent_id = require_str(args, "agent_id")?.to_string();
                let title = require_str(args, "title")?.to_string();
                let description = require_str(args, "description")?.to_string();
                let task = self
                    .tasks
                    .create_agent_task(&agent_id, title, description, parse_create_task_options(args)?)
                    .await?;
                Ok(json!({"task_id": task.id, "status": "queued", "codebase_id": task.codebase_id}))
            }
            "register_task_set" => {
                let agent_id = require_str(args, "agent_id")?.to_string();
                let task_set = args
                    .get("task_set")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| BrokerError::BadRequest("missing required field 'task_set'".to_string()))?;
                let mut task_ids = Vec::with_capacity(task_set.len());
                for entry in task_set {
                    let title = require_str(entry, "title")?.to_string();
                    let description = entry.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let task = self
                        .tasks
                        .create_agent_task(&agent_id, title, description, parse_create_task_options(entry)?)
                        .await?;
                    task_ids.push(task.id);
                }
                Ok(json!({"task_ids": task_ids}))
            }
            "get_next_task" => {
                let agent_id = require_str(args, "agent_id")?;
                match self.tasks.get_next_task(agent_id).await? {
                    Some(task) => Ok(serde_json::to_value(task)?),
                    None => Ok(json!({"message": "No tasks available"})),
                }
            }
            "complete_task" => {
                let agent_id = require_str(args, "agent_id")?;
                let task = self.tasks.complete_task(agent_id).await?;
                Ok(json!({"task_id": task.id, "status": "completed"}))
            }
            "get_task_board" => {
                let codebase_id = opt_str(args, "codebase_id");
                let tasks = self.tasks.task_board(codebase_id.as_deref()).await;
                Ok(json!({
                    "tasks": tasks.iter().map(|t| json!({"id": t.id, "title": t.title, "status": t.status})).collect::<Vec<_>>(),
                }))
            }
            "get_detailed_task_board" => {
                let codebase_id = opt_str(args, "codebase_id");
                let tasks = self.tasks.task_board(codebase_id.as_deref()).await;
                Ok(json!({"tasks": tasks}))
            }
            "get_agent_task_history" => {
                let agent_id = require_str(args, "agent_id")?;
                let include_planned = opt_bool(args, "include_planned", true);
                let include_completed = opt_bool(args, "include_completed", true);
                let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);
                let tasks = self
                    .tasks
                    .agent_task_history(agent_id, include_planned, include_completed, limit)
                    .await?;
                Ok(json!({"tasks": tasks}))
            }
            "discover_codebase_info" => {
                let workspace_path = require_str(args, "workspace_path")?.to_string();
                let custom_id = opt_str(args, "custom_id");
                let identity = CodebaseIdentifier::identify(&workspace_path, custom_id.as_deref()).await;
                self.codebases.ensure_exists(&identity.canonical_id).await;
                Ok(serde_json::to_value(identity)?)
            }
            other => Err(BrokerError::MethodNotFound(other.to_string())),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Backs `GET /mcp/capabilities`.
    pub fn capabilities(&self) -> Value {
        self.initialize_result()
    }

    /// Backs `GET /mcp/tools`, spec.md §6 — the tool surface filtered for
    /// the requester's trust level, same filter `tools/list` applies.
    pub async fn list_tools(&self, ctx: &ClientContext) -> Value {
        self.tools_list_result(ctx).await
    }

    /// Looks up a tool by name across the native table and the downstream
    /// index, for the §4.6 permission check ahead of routing. A name found
    /// in neither is left to `route_tool_call`'s own not-found error.
    async fn find_tool_descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        if let Some(tool) = native_tool_descriptors().into_iter().find(|t| t.name == name) {
            return Some(tool);
        }
        self.supervisor.list_tools().await.into_iter().find(|t| t.name == name)
    }
}

fn rpc_result(id: Option<Value>, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn rpc_error(id: Option<Value>, err: &BrokerError) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": err.code(), "message": err.to_string(), "data": err.data()}})
}

/// Same shape as [`rpc_error`] but for errors raised outside `BrokerError`,
/// namely the §4.6 tool-filter rejection, which carries `connection_type`
/// in its `data` rather than nothing.
fn rpc_error_with_data(id: Option<Value>, code: i32, message: String, data: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message, "data": data}})
}

fn attach_heartbeat_metadata(result: &mut Value, agent_id: &str) {
    if let Some(obj) = result.as_object_mut() {
        obj.insert(
            "_heartbeat_metadata".to_string(),
            json!({"agent_id": agent_id, "timestamp": Utc::now()}),
        );
    }
}

fn value_to_text(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Best-effort JSON parse of forwarded text content, spec.md §4.1 routing
/// rule 3 ("`result.content` is parsed JSON-if-possible for downstream
/// convenience"). Leaves non-JSON text untouched.
fn parse_content_if_json(mut value: Value) -> Value {
    if let Some(content) = value.get_mut("content").and_then(|c| c.as_array_mut()) {
        for item in content.iter_mut() {
            if item.get("type").and_then(|t| t.as_str()) != Some("text") {
                continue;
            }
            let parsed = item.get("text").and_then(|t| t.as_str()).and_then(|t| serde_json::from_str::<Value>(t).ok());
            if let (Some(parsed), Some(obj)) = (parsed, item.as_object_mut()) {
                obj.insert("parsed".to_string(), parsed);
            }
        }
    }
    value
}

fn require_str<'a>(args: &'a Value, key: &str) -> BrokerResult<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BrokerError::BadRequest(format!("missing required field '{key}'")))
}

fn require_str_array(args: &Value, key: &str) -> BrokerResult<Vec<String>> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .ok_or_else(|| BrokerError::BadRequest(format!("missing required field '{key}'")))
}

fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn opt_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn opt_metadata(args: &Value, key: &str) -> HashMap<String, Value> {
    args.get(key)
        .and_then(|v| v.as_object())
        .map(|obj| obj.clone().into_iter().collect())
        .unwrap_or_default()
}

fn parse_dependency_type(raw: &str) -> BrokerResult<DependencyType> {
    match raw {
        "blocks" => Ok(DependencyType::Blocks),
        "required_by" => Ok(DependencyType::RequiredBy),
        "related" => Ok(DependencyType::Related),
        other => Err(BrokerError::BadRequest(format!("unknown dependency type '{other}'"))),
    }
}

fn parse_priority(raw: &str) -> Option<Priority> {
    match raw {
        "urgent" => Some(Priority::Urgent),
        "high" => Some(Priority::High),
        "normal" => Some(Priority::Normal),
        "low" => Some(Priority::Low),
        _ => None,
    }
}

fn parse_strategy(raw: &str) -> Option<CoordinationStrategy> {
    match raw {
        "sequential" => Some(CoordinationStrategy::Sequential),
        "parallel" => Some(CoordinationStrategy::Parallel),
        "leader_follower" => Some(CoordinationStrategy::LeaderFollower),
        _ => None,
    }
}

fn parse_create_task_options(args: &Value) -> BrokerResult<CreateTaskOptions> {
    let mut metadata = opt_metadata(args, "metadata");
    let required_capabilities = args
        .get("required_capabilities")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
        .unwrap_or_default();
    if !required_capabilities.is_empty() {
        metadata.insert("required_capabilities".to_string(), json!(required_capabilities));
    }
    let file_paths = args
        .get("file_paths")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let cross_codebase_dependencies = match args.get("cross_codebase_dependencies") {
        Some(value) => serde_json::from_value::<Vec<CrossCodebaseDependency>>(value.clone())?,
        None => Vec::new(),
    };
    Ok(CreateTaskOptions {
        priority: args.get("priority").and_then(|v| v.as_str()).and_then(parse_priority),
        codebase_id: opt_str(args, "codebase_id"),
        file_paths,
        required_capabilities,
        cross_codebase_dependencies,
        metadata,
    })
}

fn create_task_response(outcome: CreateTaskOutcome) -> Value {
    match outcome {
        CreateTaskOutcome::Assigned { task_id, codebase_id, agent_id } => json!({
            "task_id": task_id, "status": "assigned", "assigned_to": agent_id, "codebase_id": codebase_id,
        }),
        CreateTaskOutcome::Queued { task_id, codebase_id } => json!({
            "task_id": task_id, "status": "queued", "codebase_id": codebase_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventSink, NoopSink};

    fn dispatcher() -> Dispatcher {
        let sink: Arc<dyn EventSink> = Arc::new(NoopSink);
        let codebases = CodebaseRegistry::new(sink.clone());
        let sessions = SessionManager::new();
        let tasks = TaskRegistry::new(codebases.clone(), sessions.clone(), sink.clone());
        let supervisor = Arc::new(DownstreamSupervisor::new(sink));
        Dispatcher::new(tasks, codebases, sessions, supervisor)
    }

    fn call(name: &str, arguments: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": name, "arguments": arguments}})
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dispatcher = dispatcher();
        let ctx = ClientContext::local();
        let response = dispatcher
            .handle(&json!({"jsonrpc": "2.0", "id": 1, "method": "bogus"}), &ctx)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn notification_without_id_gets_no_reply() {
        let dispatcher = dispatcher();
        let ctx = ClientContext::local();
        let response = dispatcher
            .handle(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}), &ctx)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn tools_call_without_agent_id_mentions_register_agent() {
        let dispatcher = dispatcher();
        let ctx = ClientContext::local();
        let response = dispatcher.handle(&call("get_task_board", json!({})), &ctx).await.unwrap();
        assert_eq!(response["error"]["code"], -32602);
        assert!(response["error"]["message"].as_str().unwrap().contains("register_agent"));
    }

    #[tokio::test]
    async fn walkthrough_register_assign_complete() {
        let dispatcher = dispatcher();
        let ctx = ClientContext::local();

        let register = dispatcher
            .handle(&call("register_agent", json!({"name": "Alpha", "capabilities": ["coding"]})), &ctx)
            .await
            .unwrap();
        let agent_id = register["result"]["content"][0]["text"]
            .as_str()
            .and_then(|t| serde_json::from_str::<Value>(t).ok())
            .unwrap()["agent_id"]
            .as_str()
            .unwrap()
            .to_string();

        let created = dispatcher
            .handle(
                &call(
                    "create_task",
                    json!({"title": "T1", "description": "d", "required_capabilities": ["coding"], "agent_id": agent_id}),
                ),
                &ctx,
            )
            .await
            .unwrap();
        assert!(created["result"]["_heartbeat_metadata"].is_object());

        let next = dispatcher
            .handle(&call("get_next_task", json!({"agent_id": agent_id})), &ctx)
            .await
            .unwrap();
        assert!(next["result"]["content"][0]["text"].as_str().unwrap().contains("T1"));

        let completed = dispatcher
            .handle(&call("complete_task", json!({"agent_id": agent_id})), &ctx)
            .await
            .unwrap();
        let body: Value = serde_json::from_str(completed["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(body["status"], "completed");
    }

    #[tokio::test]
    async fn remote_context_calling_an_unindexed_tool_is_not_found() {
        // No downstream server is registered in this harness, so `fs_read`
        // isn't in either the native table or the supervisor's tool index;
        // the §4.6 filter check is skipped and routing falls through to the
        // ordinary not-found error rather than a permission error.
        let dispatcher = dispatcher();
        let mut ctx = ClientContext::local();
        ctx.connection_type = broker_types::ConnectionType::Remote;
        ctx.security_level = broker_types::SecurityLevel::Restricted;
        let response = dispatcher.handle(&call("fs_read", json!({"agent_id": "a1"})), &ctx).await.unwrap();
        assert_eq!(response["error"]["code"], -1);
    }

    #[tokio::test]
    async fn remote_context_may_still_call_a_coordination_tool() {
        let dispatcher = dispatcher();
        let mut ctx = ClientContext::local();
        ctx.connection_type = broker_types::ConnectionType::Remote;
        ctx.security_level = broker_types::SecurityLevel::Sandboxed;
        let response = dispatcher.handle(&call("get_task_board", json!({"agent_id": "a1"})), &ctx).await.unwrap();
        assert_ne!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tools_list_includes_native_tools() {
        let dispatcher = dispatcher();
        let ctx = ClientContext::local();
        let response = dispatcher.handle(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}), &ctx).await.unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "register_agent"));
    }
}
