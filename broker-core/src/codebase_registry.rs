use std::collections::HashMap;
use std::sync::Arc;

use broker_types::{BrokerError, BrokerResult, Codebase, CodebaseDependency, DependencyType};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::event_bus::{publish_event, EventSink};

/// CRUD over codebases plus cross-codebase dependency edges, spec.md §4.8.
#[derive(Clone)]
pub struct CodebaseRegistry {
    codebases: Arc<RwLock<HashMap<String, Codebase>>>,
    dependencies: Arc<RwLock<HashMap<(String, String), CodebaseDependency>>>,
    sink: Arc<dyn EventSink>,
}

impl CodebaseRegistry {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        let mut codebases = HashMap::new();
        let default = Codebase::default_codebase();
        codebases.insert(default.id.clone(), default);
        Self {
            codebases: Arc::new(RwLock::new(codebases)),
            dependencies: Arc::new(RwLock::new(HashMap::new())),
            sink,
        }
    }

    pub async fn register(
        &self,
        id: String,
        name: String,
        workspace_path: Option<String>,
        metadata: HashMap<String, Value>,
    ) -> Codebase {
        let mut codebase = Codebase::new(id.clone(), name, workspace_path);
        codebase.metadata = metadata;
        self.codebases.write().await.insert(id.clone(), codebase.clone());
        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::CODEBASE_REGISTERED,
            serde_json::json!({"codebase_id": id}),
        )
        .await;
        codebase
    }

    pub async fn get(&self, id: &str) -> BrokerResult<Codebase> {
        self.codebases
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("codebase {id} not found")))
    }

    pub async fn list(&self) -> Vec<Codebase> {
        self.codebases.read().await.values().cloned().collect()
    }

    pub async fn ensure_exists(&self, id: &str) {
        let mut codebases = self.codebases.write().await;
        codebases
            .entry(id.to_string())
            .or_insert_with(|| Codebase::new(id.to_string(), id.to_string(), None));
    }

    pub async fn add_agent(&self, codebase_id: &str, agent_id: &str) {
        self.ensure_exists(codebase_id).await;
        let mut codebases = self.codebases.write().await;
        if let Some(codebase) = codebases.get_mut(codebase_id) {
            codebase.agents.insert(agent_id.to_string());
            codebase.updated_at = chrono::Utc::now();
        }
    }

    pub async fn remove_agent(&self, codebase_id: &str, agent_id: &str) {
        let mut codebases = self.codebases.write().await;
        if let Some(codebase) = codebases.get_mut(codebase_id) {
            codebase.agents.remove(agent_id);
            codebase.updated_at = chrono::Utc::now();
        }
    }

    pub async fn add_active_task(&self, codebase_id: &str, task_id: &str) {
        let mut codebases = self.codebases.write().await;
        if let Some(codebase) = codebases.get_mut(codebase_id) {
            codebase.active_tasks.insert(task_id.to_string());
        }
    }

    pub async fn remove_active_task(&self, codebase_id: &str, task_id: &str) {
        let mut codebases = self.codebases.write().await;
        if let Some(codebase) = codebases.get_mut(codebase_id) {
            codebase.active_tasks.remove(task_id);
        }
    }

    pub async fn add_dependency(
        &self,
        source: String,
        target: String,
        dependency_type: DependencyType,
        metadata: HashMap<String, Value>,
    ) -> CodebaseDependency {
        let dependency = CodebaseDependency {
            source: source.clone(),
            target: target.clone(),
            dependency_type,
            metadata,
            created_at: chrono::Utc::now(),
        };
        self.dependencies
            .write()
            .await
            .insert((source, target), dependency.clone());
        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::CODEBASE_DEPENDENCY_ADDED,
            serde_json::to_value(&dependency).unwrap_or_default(),
        )
        .await;
        dependency
    }

    pub async fn dependencies_for(&self, codebase_id: &str) -> Vec<CodebaseDependency> {
        self.dependencies
            .read()
            .await
            .values()
            .filter(|d| d.source == codebase_id || d.target == codebase_id)
            .cloned()
            .collect()
    }

    /// `same_codebase?(p1, p2)`, spec.md §4.8 — delegates to the identifier
    /// so both entry points agree on canonicalization.
    pub async fn same_codebase(p1: &str, p2: &str) -> bool {
        crate::identifier::CodebaseIdentifier::same_codebase(p1, p2).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::NoopSink;

    #[tokio::test]
    async fn default_codebase_always_exists() {
        let registry = CodebaseRegistry::new(Arc::new(NoopSink));
        let default = registry.get("default").await.unwrap();
        assert_eq!(default.id, "default");
    }

    #[tokio::test]
    async fn register_and_get_round_trips() {
        let registry = CodebaseRegistry::new(Arc::new(NoopSink));
        registry
            .register("acme/widgets".to_string(), "widgets".to_string(), None, HashMap::new())
            .await;
        let fetched = registry.get("acme/widgets").await.unwrap();
        assert_eq!(fetched.name, "widgets");
    }

    #[tokio::test]
    async fn unknown_codebase_is_not_found() {
        let registry = CodebaseRegistry::new(Arc::new(NoopSink));
        assert!(registry.get("nope").await.is_err());
    }
}
