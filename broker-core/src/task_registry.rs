use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use broker_types::{
    Agent, AgentStatus, BrokerError, BrokerResult, CoordinationStrategy, CreateTaskOptions,
    CrossCodebaseDependency, RegisterAgentOptions, Session, Task, TaskStatus,
};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::codebase_registry::CodebaseRegistry;
use crate::event_bus::{publish_event, EventSink};
use crate::inbox::Inbox;
use crate::session_manager::SessionManager;

/// Outcome of trying to place a task onto an agent, spec.md §4.2.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned { agent_id: String },
    NoAvailableAgents,
    FileConflicts { paths: Vec<String> },
}

/// Outcome of `CreateTask`: spec.md §7 "CreateTask never loses a task".
#[derive(Debug, Clone)]
pub enum CreateTaskOutcome {
    Assigned { task_id: String, codebase_id: String, agent_id: String },
    Queued { task_id: String, codebase_id: String },
}

struct State {
    agents: HashMap<String, Agent>,
    inboxes: HashMap<String, Inbox>,
    pending_tasks: VecDeque<Task>,
    file_locks: HashMap<(String, String), String>,
    tasks: HashMap<String, Task>,
    main_task_dependents: HashMap<String, Vec<String>>,
}

impl State {
    fn new() -> Self {
        Self {
            agents: HashMap::new(),
            inboxes: HashMap::new(),
            pending_tasks: VecDeque::new(),
            file_locks: HashMap::new(),
            tasks: HashMap::new(),
            main_task_dependents: HashMap::new(),
        }
    }

    fn name_is_live(&self, name: &str) -> bool {
        self.agents.values().any(|a| a.name == name)
    }
}

/// Registry of agents and tasks, spec.md §4.2. Owns the agent map, the
/// pending queue, the per-codebase file-lock map, the cross-codebase
/// dependency map, and every `Inbox` (spec.md §3 "Ownership summary").
/// Single-writer discipline via one `RwLock` around the whole aggregate,
/// matching `distri/src/agent_store.rs`'s `Arc<RwLock<HashMap<...>>>` style.
#[derive(Clone)]
pub struct TaskRegistry {
    state: Arc<RwLock<State>>,
    codebases: CodebaseRegistry,
    sessions: SessionManager,
    sink: Arc<dyn EventSink>,
}

impl TaskRegistry {
    pub fn new(codebases: CodebaseRegistry, sessions: SessionManager, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::new())),
            codebases,
            sessions,
            sink,
        }
    }

    pub async fn register_agent(
        &self,
        name: String,
        capabilities: Vec<String>,
        opts: RegisterAgentOptions,
        mint_session: bool,
    ) -> BrokerResult<(Agent, Option<Session>)> {
        {
            let state = self.state.read().await;
            if state.name_is_live(&name) {
                return Err(BrokerError::Conflict("Agent name already exists".to_string()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let codebase_id = opts.codebase_id.clone().unwrap_or_else(|| "default".to_string());
        self.codebases.ensure_exists(&codebase_id).await;
        self.codebases.add_agent(&codebase_id, &id).await;

        let mut metadata = opts.metadata.clone();
        metadata
            .entry("cross_codebase_capable".to_string())
            .or_insert(Value::Bool(opts.cross_codebase_capable));

        let agent = Agent::new(
            id.clone(),
            name,
            capabilities,
            codebase_id.clone(),
            opts.workspace_path.clone(),
            metadata,
        );

        {
            let mut state = self.state.write().await;
            state.agents.insert(id.clone(), agent.clone());
            // Inbox materialization is idempotent: "already started" is not an error.
            state.inboxes.entry(id.clone()).or_insert_with(|| Inbox::new(id.clone()));
        }

        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::agent_registered(&codebase_id),
            serde_json::json!({"agent_id": id, "codebase_id": codebase_id}),
        )
        .await;

        self.pending_sweep().await;

        let session = if mint_session {
            Some(self.sessions.create_session(id.clone(), HashMap::new()).await)
        } else {
            None
        };

        Ok((agent, session))
    }

    pub async fn heartbeat(&self, agent_id: &str) -> BrokerResult<()> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| BrokerError::NotFound(format!("agent {agent_id} not found")))?;
        agent.last_heartbeat = Utc::now();
        if agent.status == AgentStatus::Offline {
            agent.status = AgentStatus::Idle;
        }
        Ok(())
    }

    pub async fn unregister(&self, agent_id: &str, force: bool) -> BrokerResult<()> {
        let codebase_id;
        {
            let mut state = self.state.write().await;
            let agent = state
                .agents
                .get(agent_id)
                .ok_or_else(|| BrokerError::NotFound(format!("agent {agent_id} not found")))?
                .clone();
            codebase_id = agent.codebase_id.clone();

            if agent.status == AgentStatus::Busy {
                if !force {
                    return Err(BrokerError::StateViolation(
                        "has active task; complete or force".to_string(),
                    ));
                }
                if let Some(inbox) = state.inboxes.get_mut(agent_id) {
                    if let Some(mut requeued) = inbox.requeue_in_progress() {
                        requeued.agent_id = None;
                        state.pending_tasks.push_front(requeued.clone());
                        state.tasks.insert(requeued.id.clone(), requeued);
                    }
                }
            }

            state.agents.remove(agent_id);
            state.inboxes.remove(agent_id);
        }

        self.codebases.remove_agent(&codebase_id, agent_id).await;

        let subject = broker_types::events::subjects::AGENT_UNREGISTERED;
        publish_event(self.sink.as_ref(), subject, serde_json::json!({"agent_id": agent_id})).await;
        if force {
            publish_event(
                self.sink.as_ref(),
                broker_types::events::subjects::AGENT_UNREGISTERED_WITH_REASSIGNMENT,
                serde_json::json!({"agent_id": agent_id}),
            )
            .await;
            publish_event(
                self.sink.as_ref(),
                broker_types::events::subjects::TASK_REASSIGNED,
                serde_json::json!({"agent_id": agent_id}),
            )
            .await;
        }

        self.pending_sweep().await;
        Ok(())
    }

    pub async fn create_task(&self, title: String, description: String, opts: CreateTaskOptions) -> CreateTaskOutcome {
        let codebase_id = opts.codebase_id.clone().unwrap_or_else(|| "default".to_string());
        self.codebases.ensure_exists(&codebase_id).await;
        let task = Task::new(title, description, codebase_id, opts);
        self.submit(task).await
    }

    async fn submit(&self, task: Task) -> CreateTaskOutcome {
        let task_id = task.id.clone();
        let codebase_id = task.codebase_id.clone();
        {
            let mut state = self.state.write().await;
            state.tasks.insert(task.id.clone(), task.clone());
        }
        match self.assign_task(task.clone()).await {
            AssignOutcome::Assigned { agent_id } => CreateTaskOutcome::Assigned { task_id, codebase_id, agent_id },
            AssignOutcome::NoAvailableAgents => {
                self.add_to_pending(task).await;
                CreateTaskOutcome::Queued { task_id, codebase_id }
            }
            AssignOutcome::FileConflicts { .. } => CreateTaskOutcome::Queued { task_id, codebase_id },
        }
    }

    /// Places a task directly into one agent's inbox, bypassing the
    /// assignment algorithm, for `create_agent_task`/`register_task_set`
    /// (spec.md §6 — the caller already names the agent, so capability and
    /// availability filtering do not apply).
    pub async fn create_agent_task(
        &self,
        agent_id: &str,
        title: String,
        description: String,
        opts: CreateTaskOptions,
    ) -> BrokerResult<Task> {
        let codebase_id;
        let task = {
            let mut state = self.state.write().await;
            let agent = state
                .agents
                .get(agent_id)
                .cloned()
                .ok_or_else(|| BrokerError::NotFound(format!("agent {agent_id} not found")))?;
            codebase_id = opts.codebase_id.clone().unwrap_or_else(|| agent.codebase_id.clone());
            let mut task = Task::new(title, description, codebase_id.clone(), opts);
            task.agent_id = Some(agent_id.to_string());
            state.tasks.insert(task.id.clone(), task.clone());
            if let Some(inbox) = state.inboxes.get_mut(agent_id) {
                inbox.add_task(task.clone());
            } else {
                task.agent_id = None;
            }
            task
        };

        self.codebases.ensure_exists(&codebase_id).await;
        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::task_queued(&codebase_id),
            serde_json::json!({"task_id": task.id, "agent_id": agent_id}),
        )
        .await;
        Ok(task)
    }

    pub async fn add_to_pending(&self, task: Task) {
        let codebase_id = task.codebase_id.clone();
        {
            let mut state = self.state.write().await;
            state.tasks.insert(task.id.clone(), task.clone());
            state.pending_tasks.push_back(task);
        }
        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::task_queued(&codebase_id),
            serde_json::json!({}),
        )
        .await;
    }

    /// Assignment algorithm, spec.md §4.2.2.
    pub async fn assign_task(&self, task: Task) -> AssignOutcome {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let required = task.required_capabilities();

        let mut candidates: Vec<String> = state
            .agents
            .values()
            .filter(|a| a.status == AgentStatus::Idle)
            .filter(|a| a.is_online(now))
            .filter(|a| a.has_capabilities(&required))
            .filter(|a| {
                a.codebase_id == task.codebase_id
                    || (a.is_cross_codebase_capable() && !task.cross_codebase_dependencies.is_empty())
            })
            .map(|a| a.id.clone())
            .collect();

        if candidates.is_empty() {
            return AssignOutcome::NoAvailableAgents;
        }

        let conflicts: Vec<String> = task
            .file_paths
            .iter()
            .filter(|p| state.file_locks.contains_key(&(task.codebase_id.clone(), (*p).clone())))
            .cloned()
            .collect();

        if !conflicts.is_empty() {
            let mut blocked = task.clone();
            blocked.status = TaskStatus::Blocked;
            blocked.block_reason = Some(format!("file_conflicts: {}", conflicts.join(", ")));
            blocked.touch();
            state.tasks.insert(blocked.id.clone(), blocked.clone());
            state.pending_tasks.push_front(blocked);
            drop(state);
            publish_event(
                self.sink.as_ref(),
                broker_types::events::subjects::task_blocked(&task.codebase_id),
                serde_json::json!({"task_id": task.id, "paths": conflicts}),
            )
            .await;
            return AssignOutcome::FileConflicts { paths: conflicts };
        }

        // (a) same-codebase preferred, (b) fewest pending tasks in inbox, (c) insertion order.
        candidates.sort_by(|a_id, b_id| {
            let a = &state.agents[a_id];
            let b = &state.agents[b_id];
            let a_same = a.codebase_id == task.codebase_id;
            let b_same = b.codebase_id == task.codebase_id;
            b_same
                .cmp(&a_same)
                .then_with(|| {
                    let a_pending = state.inboxes.get(a_id).map(|i| i.pending_len()).unwrap_or(0);
                    let b_pending = state.inboxes.get(b_id).map(|i| i.pending_len()).unwrap_or(0);
                    a_pending.cmp(&b_pending)
                })
        });
        let chosen = candidates[0].clone();

        let mut assigned = task.clone();
        assigned.status = TaskStatus::Pending;
        assigned.touch();
        state.tasks.insert(assigned.id.clone(), assigned.clone());

        if let Some(inbox) = state.inboxes.get_mut(&chosen) {
            inbox.add_task(assigned.clone());
        }
        if let Some(agent) = state.agents.get_mut(&chosen) {
            agent.status = AgentStatus::Busy;
            agent.current_task_id = Some(assigned.id.clone());
        }
        for path in &assigned.file_paths {
            state
                .file_locks
                .insert((assigned.codebase_id.clone(), path.clone()), assigned.id.clone());
        }
        drop(state);

        self.codebases.add_active_task(&task.codebase_id, &task.id).await;
        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::task_assigned(&task.codebase_id),
            serde_json::json!({"task_id": task.id, "agent_id": chosen}),
        )
        .await;

        AssignOutcome::Assigned { agent_id: chosen }
    }

    /// Re-tries assignment of every pending task in order, spec.md §4.2.3.
    pub async fn pending_sweep(&self) {
        let pending: Vec<Task> = {
            let mut state = self.state.write().await;
            std::mem::take(&mut state.pending_tasks).into_iter().collect()
        };

        let mut still_pending = Vec::new();
        for task in pending {
            match self.assign_task(task.clone()).await {
                AssignOutcome::Assigned { .. } => {}
                AssignOutcome::NoAvailableAgents => still_pending.push(task),
                AssignOutcome::FileConflicts { .. } => {
                    // assign_task already re-enqueued the blocked task at the front.
                }
            }
        }

        let mut state = self.state.write().await;
        for task in still_pending.into_iter().rev() {
            state.pending_tasks.push_front(task);
        }
    }

    pub async fn get_next_task(&self, agent_id: &str) -> BrokerResult<Option<Task>> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(agent_id) {
            return Err(BrokerError::NotFound(format!("agent {agent_id} not found")));
        }
        let task = state
            .inboxes
            .get_mut(agent_id)
            .and_then(|inbox| inbox.get_next_task());
        if let Some(task) = &task {
            state.tasks.insert(task.id.clone(), task.clone());
            if let Some(agent) = state.agents.get_mut(agent_id) {
                agent.status = AgentStatus::Busy;
                agent.current_task_id = Some(task.id.clone());
            }
            for path in &task.file_paths {
                state
                    .file_locks
                    .insert((task.codebase_id.clone(), path.clone()), task.id.clone());
            }
        }
        drop(state);
        if let Some(task) = &task {
            publish_event(
                self.sink.as_ref(),
                broker_types::events::subjects::TASK_STARTED,
                serde_json::json!({"task_id": task.id, "agent_id": agent_id}),
            )
            .await;
        }
        Ok(task)
    }

    pub async fn complete_task(&self, agent_id: &str) -> BrokerResult<Task> {
        let (task, codebase_id) = {
            let mut state = self.state.write().await;
            if !state.agents.contains_key(agent_id) {
                return Err(BrokerError::NotFound(format!("agent {agent_id} not found")));
            }
            let task = state
                .inboxes
                .get_mut(agent_id)
                .ok_or_else(|| BrokerError::NotFound(format!("agent {agent_id} not found")))?
                .complete_current_task()?;

            let codebase_id = task.codebase_id.clone();
            state.file_locks.retain(|_, held_by| held_by != &task.id);
            state.tasks.insert(task.id.clone(), task.clone());
            if let Some(agent) = state.agents.get_mut(agent_id) {
                agent.status = AgentStatus::Idle;
                agent.current_task_id = None;
            }
            (task, codebase_id)
        };

        self.codebases.remove_active_task(&codebase_id, &task.id).await;
        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::TASK_COMPLETED,
            serde_json::json!({"task_id": task.id, "agent_id": agent_id}),
        )
        .await;

        self.pending_sweep().await;
        Ok(task)
    }

    pub async fn update_task_activity(&self, task_id: &str, tool: &str, args: &Value) {
        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::TASK_ACTIVITY_UPDATED,
            serde_json::json!({"task_id": task_id, "tool": tool, "args": args}),
        )
        .await;
    }

    pub async fn update_agent_activity(&self, agent_id: &str, human_string: String, files: Vec<String>) {
        let mut state = self.state.write().await;
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.current_activity = Some(human_string.clone());
            agent.current_files = files;
            agent.push_activity(human_string);
        }
    }

    pub async fn get_agent(&self, agent_id: &str) -> BrokerResult<Agent> {
        self.state
            .read()
            .await
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("agent {agent_id} not found")))
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.state.read().await.agents.values().cloned().collect()
    }

    pub async fn get_task(&self, task_id: &str) -> BrokerResult<Task> {
        self.state
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("task {task_id} not found")))
    }

    pub async fn task_board(&self, codebase_id: Option<&str>) -> Vec<Task> {
        self.state
            .read()
            .await
            .tasks
            .values()
            .filter(|t| codebase_id.map(|c| c == t.codebase_id).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub async fn agent_task_history(
        &self,
        agent_id: &str,
        include_planned: bool,
        include_completed: bool,
        limit: Option<usize>,
    ) -> BrokerResult<Vec<Task>> {
        let state = self.state.read().await;
        let inbox = state
            .inboxes
            .get(agent_id)
            .ok_or_else(|| BrokerError::NotFound(format!("agent {agent_id} not found")))?;
        let mut tasks = Vec::new();
        if include_planned {
            tasks.extend(inbox.pending_tasks());
        }
        if let Some(t) = inbox.in_progress() {
            tasks.push(t.clone());
        }
        if include_completed {
            tasks.extend(inbox.completed_tasks());
        }
        if let Some(limit) = limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    /// Produces one "main" task plus one dependent task per affected
    /// codebase, spec.md §4.2.4. The registry only tracks the mapping; it
    /// does not enforce `strategy` semantics itself.
    pub async fn create_cross_codebase_task(
        &self,
        title: String,
        description: String,
        primary_codebase_id: String,
        affected_codebases: Vec<String>,
        _strategy: CoordinationStrategy,
    ) -> (Task, Vec<Task>) {
        self.codebases.ensure_exists(&primary_codebase_id).await;
        let main_opts = CreateTaskOptions {
            codebase_id: Some(primary_codebase_id.clone()),
            ..Default::default()
        };
        let main_task = Task::new(title.clone(), description.clone(), primary_codebase_id, main_opts);
        self.submit(main_task.clone()).await;

        let mut dependents = Vec::new();
        for codebase_id in affected_codebases {
            self.codebases.ensure_exists(&codebase_id).await;
            let opts = CreateTaskOptions {
                codebase_id: Some(codebase_id.clone()),
                cross_codebase_dependencies: vec![CrossCodebaseDependency {
                    codebase_id: main_task.codebase_id.clone(),
                    task_id: main_task.id.clone(),
                }],
                ..Default::default()
            };
            let dependent = Task::new(title.clone(), description.clone(), codebase_id, opts);
            self.submit(dependent.clone()).await;
            dependents.push(dependent);
        }

        {
            let mut state = self.state.write().await;
            state
                .main_task_dependents
                .insert(main_task.id.clone(), dependents.iter().map(|t| t.id.clone()).collect());
        }

        publish_event(
            self.sink.as_ref(),
            broker_types::events::subjects::CROSS_CODEBASE_TASK_CREATED,
            serde_json::json!({"main_task_id": main_task.id}),
        )
        .await;

        (main_task, dependents)
    }

    pub async fn live_agent_names(&self) -> HashSet<String> {
        self.state.read().await.agents.values().map(|a| a.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::NoopSink;

    fn registry() -> TaskRegistry {
        let sink: Arc<dyn EventSink> = Arc::new(NoopSink);
        TaskRegistry::new(CodebaseRegistry::new(sink.clone()), SessionManager::new(), sink)
    }

    async fn register(registry: &TaskRegistry, name: &str, caps: &[&str]) -> Agent {
        registry
            .register_agent(
                name.to_string(),
                caps.iter().map(|c| c.to_string()).collect(),
                RegisterAgentOptions::default(),
                false,
            )
            .await
            .unwrap()
            .0
    }

    // S1. Register and assign.
    #[tokio::test]
    async fn scenario_s1_register_and_assign() {
        let registry = registry();
        let alpha = register(&registry, "Alpha", &["coding"]).await;

        let outcome = registry
            .create_task(
                "T1".to_string(),
                "d".to_string(),
                CreateTaskOptions {
                    required_capabilities: vec!["coding".to_string()],
                    ..Default::default()
                },
            )
            .await;
        let agent_id = match outcome {
            CreateTaskOutcome::Assigned { agent_id, .. } => agent_id,
            other => panic!("expected Assigned, got {other:?}"),
        };
        assert_eq!(agent_id, alpha.id);

        let task = registry.get_next_task(&alpha.id).await.unwrap().unwrap();
        let completed = registry.complete_task(&alpha.id).await.unwrap();
        assert_eq!(completed.id, task.id);
        assert_eq!(completed.status, TaskStatus::Completed);

        assert!(registry.get_next_task(&alpha.id).await.unwrap().is_none());
    }

    // S2. Duplicate name.
    #[tokio::test]
    async fn scenario_s2_duplicate_name_rejected() {
        let registry = registry();
        register(&registry, "Alpha", &["coding"]).await;
        let err = registry
            .register_agent(
                "Alpha".to_string(),
                vec!["coding".to_string()],
                RegisterAgentOptions::default(),
                false,
            )
            .await
            .unwrap_err();
        match err {
            BrokerError::Conflict(msg) => assert!(msg.contains("Agent name already exists")),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    // S3. File conflict.
    #[tokio::test]
    async fn scenario_s3_file_conflict_then_sweep_assigns() {
        let registry = registry();
        let a = register(&registry, "A", &["coding"]).await;
        let b = register(&registry, "B", &["coding"]).await;

        let outcome1 = registry
            .create_task(
                "T1".to_string(),
                "d".to_string(),
                CreateTaskOptions {
                    required_capabilities: vec!["coding".to_string()],
                    file_paths: vec!["lib/auth.ex".to_string()],
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(outcome1, CreateTaskOutcome::Assigned { .. }));

        let outcome2 = registry
            .create_task(
                "T2".to_string(),
                "d".to_string(),
                CreateTaskOptions {
                    required_capabilities: vec!["coding".to_string()],
                    file_paths: vec!["lib/auth.ex".to_string()],
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(outcome2, CreateTaskOutcome::Queued));
        assert!(registry.get_next_task(&b.id).await.unwrap().is_none());

        registry.get_next_task(&a.id).await.unwrap();
        registry.complete_task(&a.id).await.unwrap();

        let t2_for_b = registry.get_next_task(&b.id).await.unwrap();
        assert!(t2_for_b.is_some());
        assert_eq!(t2_for_b.unwrap().title, "T2");
    }

    #[tokio::test]
    async fn unknown_agent_heartbeat_is_not_found() {
        let registry = registry();
        assert!(registry.heartbeat("ghost").await.is_err());
    }

    #[tokio::test]
    async fn busy_agent_unregister_refused_without_force() {
        let registry = registry();
        let a = register(&registry, "A", &["coding"]).await;
        registry
            .create_task(
                "T1".to_string(),
                "d".to_string(),
                CreateTaskOptions {
                    required_capabilities: vec!["coding".to_string()],
                    ..Default::default()
                },
            )
            .await;
        registry.get_next_task(&a.id).await.unwrap();
        let err = registry.unregister(&a.id, false).await.unwrap_err();
        assert!(matches!(err, BrokerError::StateViolation(_)));
    }

    #[tokio::test]
    async fn force_unregister_requeues_in_progress_task() {
        let registry = registry();
        let a = register(&registry, "A", &["coding"]).await;
        let b = register(&registry, "B", &["coding"]).await;
        registry
            .create_task(
                "T1".to_string(),
                "d".to_string(),
                CreateTaskOptions {
                    required_capabilities: vec!["coding".to_string()],
                    ..Default::default()
                },
            )
            .await;
        registry.get_next_task(&a.id).await.unwrap();
        registry.unregister(&a.id, true).await.unwrap();

        let reassigned = registry.get_next_task(&b.id).await.unwrap();
        assert!(reassigned.is_some());
    }

    #[tokio::test]
    async fn no_available_agents_queues_task() {
        let registry = registry();
        let outcome = registry.create_task("T1".to_string(), "d".to_string(), CreateTaskOptions::default()).await;
        assert!(matches!(outcome, CreateTaskOutcome::Queued));
    }
}
