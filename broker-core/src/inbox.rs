use std::collections::VecDeque;

use broker_types::{BrokerError, BrokerResult, Task, TaskStatus};
use chrono::Utc;

pub const DEFAULT_COMPLETED_HISTORY: usize = 100;

/// One mailbox per agent id, serialized by its caller (spec.md §4.3).
/// `TaskRegistry` holds one of these per agent behind its own single-writer
/// lock, matching `distri/src/agent_store.rs`'s `Arc<RwLock<HashMap<...>>>`
/// convention rather than a literal actor/channel.
#[derive(Debug, Clone)]
pub struct Inbox {
    pub agent_id: String,
    pending: VecDeque<Task>,
    in_progress: Option<Task>,
    completed: VecDeque<Task>,
    max_history: usize,
}

impl Inbox {
    pub fn new(agent_id: String) -> Self {
        Self {
            agent_id,
            pending: VecDeque::new(),
            in_progress: None,
            completed: VecDeque::new(),
            max_history: DEFAULT_COMPLETED_HISTORY,
        }
    }

    /// Priority-insert, spec.md §4.2.1: stable insertion after the last
    /// existing entry whose priority is `<=` the new task's priority.
    pub fn add_task(&mut self, task: Task) {
        let insert_at = self
            .pending
            .iter()
            .rposition(|t| t.priority <= task.priority)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.pending.insert(insert_at, task);
    }

    pub fn get_next_task(&mut self) -> Option<Task> {
        let mut task = self.pending.pop_front()?;
        task.status = TaskStatus::InProgress;
        task.agent_id = Some(self.agent_id.clone());
        task.touch();
        self.in_progress = Some(task.clone());
        Some(task)
    }

    pub fn complete_current_task(&mut self) -> BrokerResult<Task> {
        let mut task = self
            .in_progress
            .take()
            .ok_or_else(|| BrokerError::StateViolation("no_task_in_progress".to_string()))?;
        task.status = TaskStatus::Completed;
        task.touch();
        self.completed.push_front(task.clone());
        while self.completed.len() > self.max_history {
            self.completed.pop_back();
        }
        Ok(task)
    }

    /// Returns the in-progress task to `pending` (head), e.g. on force
    /// unregister, spec.md §4.2 `Unregister`.
    pub fn requeue_in_progress(&mut self) -> Option<Task> {
        let mut task = self.in_progress.take()?;
        task.status = TaskStatus::Pending;
        task.agent_id = None;
        task.touch();
        self.pending.push_front(task.clone());
        Some(task)
    }

    pub fn in_progress(&self) -> Option<&Task> {
        self.in_progress.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        self.pending.iter().cloned().collect()
    }

    pub fn completed_tasks(&self) -> Vec<Task> {
        self.completed.iter().cloned().collect()
    }

    pub fn status_snapshot(&self) -> InboxStatus {
        InboxStatus {
            agent_id: self.agent_id.clone(),
            pending: self.pending_len(),
            in_progress: self.in_progress.as_ref().map(|t| t.id.clone()),
            completed: self.completed.len(),
            as_of: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InboxStatus {
    pub agent_id: String,
    pub pending: usize,
    pub in_progress: Option<String>,
    pub completed: usize,
    pub as_of: chrono::DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_types::{CreateTaskOptions, Priority};

    fn task(priority: Priority) -> Task {
        Task::new(
            "t".to_string(),
            "d".to_string(),
            "default".to_string(),
            CreateTaskOptions {
                priority: Some(priority),
                ..Default::default()
            },
        )
    }

    #[test]
    fn priority_ordering_matches_scenario_s4() {
        let mut inbox = Inbox::new("a1".to_string());
        let n1 = task(Priority::Normal);
        let h1 = task(Priority::High);
        let n2 = task(Priority::Normal);
        let u1 = task(Priority::Urgent);
        let l1 = task(Priority::Low);
        let ids = [n1.id.clone(), h1.id.clone(), n2.id.clone(), u1.id.clone(), l1.id.clone()];

        inbox.add_task(n1);
        inbox.add_task(h1);
        inbox.add_task(n2);
        inbox.add_task(u1);
        inbox.add_task(l1);

        let order: Vec<String> = (0..5)
            .map(|_| inbox.get_next_task().unwrap().id)
            .collect();
        assert_eq!(order, vec![ids[3].clone(), ids[1].clone(), ids[0].clone(), ids[2].clone(), ids[4].clone()]);
    }

    #[test]
    fn complete_without_in_progress_is_state_violation() {
        let mut inbox = Inbox::new("a1".to_string());
        let err = inbox.complete_current_task().unwrap_err();
        assert!(matches!(err, BrokerError::StateViolation(_)));
    }

    #[test]
    fn complete_moves_task_into_capped_history() {
        let mut inbox = Inbox::new("a1".to_string());
        inbox.max_history = 2;
        for _ in 0..3 {
            inbox.add_task(task(Priority::Normal));
            inbox.get_next_task();
            inbox.complete_current_task().unwrap();
        }
        assert_eq!(inbox.completed_tasks().len(), 2);
    }

    #[test]
    fn requeue_returns_in_progress_task_to_pending_head() {
        let mut inbox = Inbox::new("a1".to_string());
        inbox.add_task(task(Priority::Low));
        inbox.get_next_task();
        let requeued = inbox.requeue_in_progress().unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert_eq!(inbox.pending_len(), 1);
        assert!(inbox.in_progress().is_none());
    }
}
