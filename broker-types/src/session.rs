use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, agent_id: String, metadata: HashMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            token,
            agent_id,
            created_at: now,
            expires_at: now + Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
            metadata,
            last_activity: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Transport-level classification of a connection, spec.md §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Local,
    Remote,
    Web,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Trusted,
    Sandboxed,
    Restricted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContext {
    pub connection_type: ConnectionType,
    pub security_level: SecurityLevel,
    pub remote_ip: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub client_info: Option<Value>,
    pub capabilities: Vec<String>,
    pub session_token: Option<String>,
}

impl ClientContext {
    pub fn local() -> Self {
        Self {
            connection_type: ConnectionType::Local,
            security_level: SecurityLevel::Trusted,
            remote_ip: None,
            origin: None,
            user_agent: None,
            client_info: None,
            capabilities: Vec::new(),
            session_token: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.connection_type == ConnectionType::Local
    }
}
