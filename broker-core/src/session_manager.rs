use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use broker_types::{BrokerError, BrokerResult, Session};
use chrono::Utc;
use rand::RngCore;
use serde_json::Value;
use tokio::sync::RwLock;

/// Owns all sessions exclusively; no other component mutates session state
/// (spec.md §3 "Ownership summary").
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    format!("mcp_{encoded}_{}", Utc::now().timestamp())
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(&self, agent_id: String, metadata: HashMap<String, Value>) -> Session {
        let token = generate_token();
        let session = Session::new(token.clone(), agent_id, metadata);
        self.sessions.write().await.insert(token, session.clone());
        session
    }

    pub async fn validate(&self, token: &str) -> BrokerResult<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(token)
            .ok_or_else(|| BrokerError::NotFound("session_not_found".to_string()))?;
        if session.is_expired(Utc::now()) {
            return Err(BrokerError::AuthRequired("session_expired".to_string()));
        }
        session.last_activity = Utc::now();
        Ok(session.clone())
    }

    pub async fn invalidate(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    pub async fn list_for_agent(&self, agent_id: &str) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Periodic sweep deleting expired entries, spec.md §4.6 "every ~5 min".
    pub async fn sweep_expired(&self) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "swept expired sessions");
        }
    }

    pub async fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_validate_round_trips() {
        let mgr = SessionManager::new();
        let session = mgr.create_session("agent-1".to_string(), HashMap::new()).await;
        let validated = mgr.validate(&session.token).await.unwrap();
        assert_eq!(validated.agent_id, "agent-1");
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let mgr = SessionManager::new();
        let err = mgr.validate("mcp_bogus_0").await.unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let mgr = SessionManager::new();
        let a = mgr.create_session("agent-1".to_string(), HashMap::new()).await;
        let b = mgr.create_session("agent-1".to_string(), HashMap::new()).await;
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn invalidate_removes_session() {
        let mgr = SessionManager::new();
        let session = mgr.create_session("agent-1".to_string(), HashMap::new()).await;
        mgr.invalidate(&session.token).await;
        assert!(mgr.validate(&session.token).await.is_err());
    }
}
