use broker_types::{ClientContext, ToolDescriptor};
use regex::Regex;
use std::sync::LazyLock;

/// Coordination tools always exposed regardless of trust level, spec.md §4.6.
const ALWAYS_ALLOWED: &[&str] = &[
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
    "memory_store",
    "memory_recall",
    "knowledge_graph_query",
    "sequential_thinking",
    "library_docs",
];

static DENY_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(fs_|file_|vscode_|terminal_|shell_|exec_|process_)").unwrap()
});

/// Filters the tool surface by trust level, spec.md §4.6.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolFilter;

impl ToolFilter {
    pub fn new() -> Self {
        Self
    }

    /// Whether `tool` may be exposed to / called from `ctx`.
    pub fn allows(&self, ctx: &ClientContext, tool: &ToolDescriptor) -> bool {
        if ctx.is_local() {
            return true;
        }
        if ALWAYS_ALLOWED.contains(&tool.name.as_str()) {
            return true;
        }
        if DENY_NAME_PATTERN.is_match(&tool.name) {
            return false;
        }
        if schema_references_path(&tool.input_schema) {
            return false;
        }
        true
    }

    pub fn filter<'a>(
        &self,
        ctx: &ClientContext,
        tools: impl IntoIterator<Item = &'a ToolDescriptor>,
    ) -> Vec<&'a ToolDescriptor> {
        tools.into_iter().filter(|t| self.allows(ctx, t)).collect()
    }
}

fn schema_references_path(schema: &serde_json::Value) -> bool {
    let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) else {
        return false;
    };
    properties.keys().any(|k| {
        let lower = k.to_lowercase();
        lower.contains("path") || lower.contains("filename") || lower == "cwd"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_types::ToolOrigin;
    use serde_json::json;

    fn tool(name: &str, schema: serde_json::Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            input_schema: schema,
            origin: ToolOrigin::External {
                server_name: "x".to_string(),
            },
        }
    }

    #[test]
    fn local_context_sees_everything() {
        let filter = ToolFilter::new();
        let ctx = ClientContext::local();
        let t = tool("vscode_open_file", json!({}));
        assert!(filter.allows(&ctx, &t));
    }

    #[test]
    fn remote_context_denies_filesystem_tool() {
        let filter = ToolFilter::new();
        let mut ctx = ClientContext::local();
        ctx.connection_type = broker_types::ConnectionType::Remote;
        ctx.security_level = broker_types::SecurityLevel::Sandboxed;
        let t = tool("fs_write", json!({}));
        assert!(!filter.allows(&ctx, &t));
    }

    #[test]
    fn remote_context_denies_path_schema() {
        let filter = ToolFilter::new();
        let mut ctx = ClientContext::local();
        ctx.connection_type = broker_types::ConnectionType::Remote;
        ctx.security_level = broker_types::SecurityLevel::Restricted;
        let t = tool(
            "read_thing",
            json!({"properties": {"file_path": {"type": "string"}}}),
        );
        assert!(!filter.allows(&ctx, &t));
    }

    #[test]
    fn remote_context_always_allows_coordination_tools() {
        let filter = ToolFilter::new();
        let mut ctx = ClientContext::local();
        ctx.connection_type = broker_types::ConnectionType::Web;
        ctx.security_level = broker_types::SecurityLevel::Sandboxed;
        let t = tool("heartbeat", json!({}));
        assert!(filter.allows(&ctx, &t));
    }
}
