use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_CODEBASE_ID: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codebase {
    pub id: String,
    pub name: String,
    pub workspace_path: Option<String>,
    pub agents: HashSet<String>,
    pub active_tasks: HashSet<String>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Codebase {
    pub fn new(id: String, name: String, workspace_path: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            workspace_path,
            agents: HashSet::new(),
            active_tasks: HashSet::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn default_codebase() -> Self {
        Self::new(DEFAULT_CODEBASE_ID.to_string(), "default".to_string(), None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Blocks,
    RequiredBy,
    Related,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebaseDependency {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub dependency_type: DependencyType,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Output of `CodebaseIdentifier::identify`, spec.md §4.8.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum IdentificationMethod {
    GitRemote,
    GitLocal,
    FolderName,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebaseIdentity {
    pub canonical_id: String,
    pub display_name: String,
    pub workspace_path: String,
    pub repository_url: Option<String>,
    pub git_remote: Option<String>,
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
    pub method: IdentificationMethod,
}
