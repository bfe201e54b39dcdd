use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A broker event published to the optional bus, spec.md §6 "Event subjects".
///
/// Mirrors the envelope shape of `distri-types::events::AgentEvent`
/// (timestamp + typed payload) but keyed by subject string instead of a
/// fixed enum, since the bus here is a generic subject-based pub/sub rather
/// than the teacher's in-process agent-event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerEvent {
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub payload: Value,
}

impl BrokerEvent {
    pub fn new(subject: impl Into<String>, payload: Value) -> Self {
        Self {
            subject: subject.into(),
            timestamp: Utc::now(),
            version: "1.0",
            payload,
        }
    }
}

pub mod subjects {
    pub fn agent_registered(codebase_id: &str) -> String {
        format!("agent.registered.{codebase_id}")
    }
    pub fn agent_heartbeat(agent_id: &str) -> String {
        format!("agent.heartbeat.{agent_id}")
    }
    pub const AGENT_UNREGISTERED: &str = "agent.unregistered";
    pub const AGENT_UNREGISTERED_WITH_REASSIGNMENT: &str = "agent.unregistered.with_reassignment";
    pub fn task_queued(codebase_id: &str) -> String {
        format!("task.queued.{codebase_id}")
    }
    pub fn task_assigned(codebase_id: &str) -> String {
        format!("task.assigned.{codebase_id}")
    }
    pub const TASK_STARTED: &str = "task.started";
    pub fn task_blocked(codebase_id: &str) -> String {
        format!("task.blocked.{codebase_id}")
    }
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_REASSIGNED: &str = "task.reassigned";
    pub const TASK_ACTIVITY_UPDATED: &str = "task.activity_updated";
    pub const CODEBASE_REGISTERED: &str = "codebase.registered";
    pub const CODEBASE_UPDATED: &str = "codebase.updated";
    pub const CODEBASE_DEPENDENCY_ADDED: &str = "codebase.dependency.added";
    pub const CROSS_CODEBASE_TASK_CREATED: &str = "cross-codebase.task.created";
}
