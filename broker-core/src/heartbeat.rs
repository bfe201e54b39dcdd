use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::task_registry::TaskRegistry;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

struct Timer {
    handle: JoinHandle<()>,
    reset: watch::Sender<()>,
}

/// Per-agent keep-alive timers, spec.md §4.9. Optional and redundant with the
/// dispatcher's own pre/post-call heartbeat (§4.1) — this keeps an agent
/// online across idle periods between tool calls rather than only on calls.
#[derive(Clone)]
pub struct HeartbeatScheduler {
    tasks: TaskRegistry,
    interval: Duration,
    timers: Arc<RwLock<HashMap<String, Timer>>>,
}

impl HeartbeatScheduler {
    pub fn new(tasks: TaskRegistry, interval: Duration) -> Self {
        Self {
            tasks,
            interval,
            timers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// (Re)arms `agent_id`'s timer. Spawns one the first time it's called
    /// for that agent; afterwards, resets the existing timer's deadline.
    pub async fn rearm(&self, agent_id: &str) {
        let mut timers = self.timers.write().await;
        if let Some(timer) = timers.get(agent_id) {
            let _ = timer.reset.send(());
            return;
        }

        let (reset_tx, mut reset_rx) = watch::channel(());
        let tasks = self.tasks.clone();
        let interval = self.interval;
        let id = agent_id.to_string();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if tasks.heartbeat(&id).await.is_err() {
                            break;
                        }
                    }
                    changed = reset_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        timers.insert(agent_id.to_string(), Timer { handle, reset: reset_tx });
    }

    /// Cancels `agent_id`'s timer, spec.md §4.9 "Cancellation on Unregister".
    pub async fn cancel(&self, agent_id: &str) {
        if let Some(timer) = self.timers.write().await.remove(agent_id) {
            timer.handle.abort();
        }
    }

    /// Cancels every outstanding timer, for broker shutdown.
    pub async fn shutdown(&self) {
        for (_, timer) in self.timers.write().await.drain() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebase_registry::CodebaseRegistry;
    use crate::event_bus::{EventSink, NoopSink};
    use crate::session_manager::SessionManager;

    fn scheduler(interval: Duration) -> HeartbeatScheduler {
        let sink: Arc<dyn EventSink> = Arc::new(NoopSink);
        let tasks = TaskRegistry::new(CodebaseRegistry::new(sink.clone()), SessionManager::new(), sink);
        HeartbeatScheduler::new(tasks, interval)
    }

    #[tokio::test]
    async fn rearm_is_idempotent_for_an_existing_timer() {
        let scheduler = scheduler(Duration::from_secs(60));
        scheduler.rearm("agent-1").await;
        scheduler.rearm("agent-1").await;
        assert_eq!(scheduler.timers.read().await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_removes_the_timer() {
        let scheduler = scheduler(Duration::from_secs(60));
        scheduler.rearm("agent-1").await;
        scheduler.cancel("agent-1").await;
        assert!(scheduler.timers.read().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_every_timer() {
        let scheduler = scheduler(Duration::from_secs(60));
        scheduler.rearm("agent-1").await;
        scheduler.rearm("agent-2").await;
        scheduler.shutdown().await;
        assert!(scheduler.timers.read().await.is_empty());
    }
}
