use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OFFLINE_THRESHOLD_SECS: i64 = 30;
pub const ACTIVITY_HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

/// A registered coordination client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub current_task_id: Option<String>,
    pub codebase_id: String,
    pub workspace_path: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_activity: Option<String>,
    pub current_files: Vec<String>,
    pub activity_history: VecDeque<String>,
    pub metadata: HashMap<String, Value>,
}

impl Agent {
    pub fn new(
        id: String,
        name: String,
        capabilities: Vec<String>,
        codebase_id: String,
        workspace_path: Option<String>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        Self {
            id,
            name,
            capabilities,
            status: AgentStatus::Idle,
            current_task_id: None,
            codebase_id,
            workspace_path,
            last_heartbeat: Utc::now(),
            current_activity: None,
            current_files: Vec::new(),
            activity_history: VecDeque::new(),
            metadata,
        }
    }

    pub fn is_cross_codebase_capable(&self) -> bool {
        self.metadata
            .get("cross_codebase_capable")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        (now - self.last_heartbeat).num_seconds() < OFFLINE_THRESHOLD_SECS
    }

    pub fn has_capabilities(&self, required: &[String]) -> bool {
        required.is_empty()
            || required
                .iter()
                .all(|cap| self.capabilities.iter().any(|c| c == cap))
    }

    pub fn push_activity(&mut self, activity: String) {
        self.activity_history.push_front(activity);
        while self.activity_history.len() > ACTIVITY_HISTORY_CAP {
            self.activity_history.pop_back();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterAgentOptions {
    #[serde(default)]
    pub codebase_id: Option<String>,
    #[serde(default)]
    pub workspace_path: Option<String>,
    #[serde(default)]
    pub cross_codebase_capable: bool,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}
