use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    // Ord derives in declaration order: Urgent < High < Normal < Low,
    // matching spec.md §4.2.1's "smaller = sooner" total order.
    Urgent,
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossCodebaseDependency {
    pub codebase_id: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub agent_id: Option<String>,
    pub codebase_id: String,
    pub file_paths: HashSet<String>,
    pub dependencies: Vec<String>,
    pub cross_codebase_dependencies: Vec<CrossCodebaseDependency>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
    pub block_reason: Option<String>,
}

impl Task {
    pub fn new(title: String, description: String, codebase_id: String, opts: CreateTaskOptions) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description,
            status: TaskStatus::Pending,
            priority: opts.priority.unwrap_or_default(),
            agent_id: None,
            codebase_id,
            file_paths: opts.file_paths.into_iter().collect(),
            dependencies: Vec::new(),
            cross_codebase_dependencies: opts.cross_codebase_dependencies,
            created_at: now,
            updated_at: now,
            metadata: opts.metadata,
            block_reason: None,
        }
    }

    pub fn required_capabilities(&self) -> Vec<String> {
        self.metadata
            .get("required_capabilities")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskOptions {
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub codebase_id: Option<String>,
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub cross_codebase_dependencies: Vec<CrossCodebaseDependency>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStrategy {
    Sequential,
    Parallel,
    LeaderFollower,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_urgent_first() {
        let mut priorities = vec![Priority::Low, Priority::Normal, Priority::Urgent, Priority::High];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
        );
    }
}
