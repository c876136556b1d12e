//! Durable state store: session counters, quality gate values, and one
//! record per agent, all as JSON under `state/`.
//!
//! Loads are load-or-default: a missing or corrupted record is replaced by
//! its default rather than failing the session. Every agent mutation bumps
//! `sync_version` and is persisted atomically before the mutation is
//! considered applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::fs_util::{self, RecordRead};
use super::types::{
    default_quality_gates, AgentDefinition, AgentState, AgentStatus, CoordinationSession,
    QualityGate,
};
use super::{CoordinationError, CoordinationPaths};

/// Merged view of what the agents have reported about the project, rebuilt
/// on every sync pass and written to `state/project_state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub installed_dependencies: BTreeSet<String>,
    pub created_files: BTreeSet<String>,
    pub completed_subtasks: BTreeSet<String>,
    pub project_type: String,
    pub build_status: String,
    pub test_results: BTreeMap<String, serde_json::Value>,
    pub errors: Vec<String>,
    pub quality_score: f64,
    pub last_updated: DateTime<Utc>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            installed_dependencies: BTreeSet::new(),
            created_files: BTreeSet::new(),
            completed_subtasks: BTreeSet::new(),
            project_type: "unknown".to_string(),
            build_status: "unknown".to_string(),
            test_results: BTreeMap::new(),
            errors: Vec::new(),
            quality_score: 0.0,
            last_updated: Utc::now(),
        }
    }
}

/// Shape of the per-agent drop files under `agent_sync/`. Agents own these
/// files; the coordinator only reads them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentSyncDocument {
    #[serde(default)]
    pub project_state: SyncedProjectState,
    #[serde(default)]
    pub quality_gates_status: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncedProjectState {
    #[serde(default)]
    pub installed_dependencies: Vec<String>,
    #[serde(default)]
    pub created_files: Vec<String>,
    #[serde(default)]
    pub completed_subtasks: Vec<String>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub build_status: Option<String>,
    #[serde(default)]
    pub test_results: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub quality_score: f64,
}

/// What recording an agent failure amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// A retry was granted; `attempt` counts toward `max_retries`.
    Retry { attempt: u32 },
    /// Retries are exhausted; the failure is terminal.
    Exhausted,
    /// The agent was not Running, so nothing changed. Seen when a failure
    /// event is replayed after its transition was already applied.
    NotRunning,
}

#[derive(Debug)]
pub struct StateStore {
    paths: CoordinationPaths,
    pub session: CoordinationSession,
    pub gates: BTreeMap<String, QualityGate>,
    pub agents: BTreeMap<String, AgentState>,
}

impl StateStore {
    /// Load session, gates, and agent states from disk, defaulting anything
    /// missing or corrupt. Agents present in `definitions` but without a
    /// persisted record start Idle.
    pub async fn open(
        paths: CoordinationPaths,
        definitions: &[AgentDefinition],
    ) -> Result<Self, CoordinationError> {
        paths.ensure().await?;

        let session = match fs_util::read_json_lenient::<CoordinationSession>(
            &paths.state_dir.join("session.json"),
        )
        .await
        {
            RecordRead::Value(session) => session,
            RecordRead::Missing => CoordinationSession::new(),
            RecordRead::Corrupt => {
                warn!("Session record corrupted, starting a fresh session");
                CoordinationSession::new()
            }
        };

        let gates = match fs_util::read_json_lenient::<BTreeMap<String, QualityGate>>(
            &paths.state_dir.join("quality_gates.json"),
        )
        .await
        {
            RecordRead::Value(gates) => gates,
            RecordRead::Missing => default_quality_gates(),
            RecordRead::Corrupt => {
                warn!("Quality gate record corrupted, using defaults");
                default_quality_gates()
            }
        };

        let mut agents = BTreeMap::new();
        for definition in definitions {
            let path = paths.state_dir.join(format!("{}.json", definition.id));
            let state = match fs_util::read_json_lenient::<AgentState>(&path).await {
                RecordRead::Value(state) => state,
                RecordRead::Missing => AgentState::new(&definition.id),
                RecordRead::Corrupt => {
                    warn!(agent_id = %definition.id, "Agent state corrupted, resetting to idle");
                    AgentState::new(&definition.id)
                }
            };
            agents.insert(definition.id.clone(), state);
        }

        let store = Self {
            paths,
            session,
            gates,
            agents,
        };
        info!(
            session_id = %store.session.session_id,
            agents = store.agents.len(),
            gates = store.gates.len(),
            "State store opened"
        );
        Ok(store)
    }

    fn agent_mut(&mut self, agent_id: &str) -> Result<&mut AgentState, CoordinationError> {
        self.agents
            .get_mut(agent_id)
            .ok_or_else(|| CoordinationError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })
    }

    async fn persist_agent(&self, agent_id: &str) -> Result<(), CoordinationError> {
        if let Some(state) = self.agents.get(agent_id) {
            let path = self.paths.state_dir.join(format!("{agent_id}.json"));
            fs_util::write_json_atomic(&path, state).await?;
        }
        Ok(())
    }

    pub async fn persist_session(&mut self) -> Result<(), CoordinationError> {
        self.session.last_sync = Some(Utc::now());
        fs_util::write_json_atomic(&self.paths.state_dir.join("session.json"), &self.session).await
    }

    pub async fn persist_gates(&self) -> Result<(), CoordinationError> {
        fs_util::write_json_atomic(&self.paths.state_dir.join("quality_gates.json"), &self.gates)
            .await
    }

    pub async fn set_workflow_phase(&mut self, phase: &str) -> Result<(), CoordinationError> {
        self.session.workflow_phase = phase.to_string();
        self.persist_session().await
    }

    /// Idle/Failed -> Running.
    pub async fn mark_running(
        &mut self,
        agent_id: &str,
        task: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CoordinationError> {
        {
            let state = self.agent_mut(agent_id)?;
            if !matches!(state.status, AgentStatus::Idle | AgentStatus::Failed) {
                return Ok(());
            }
            state.status = AgentStatus::Running;
            state.current_task = task;
            state.last_activity = at;
            state.sync_version += 1;
        }
        info!(agent_id = %agent_id, "Agent started");
        self.persist_agent(agent_id).await
    }

    /// Running -> Completed; bumps the session task counter. Guarded on the
    /// Running edge so replaying the event is a no-op.
    pub async fn mark_completed(
        &mut self,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CoordinationError> {
        {
            let state = self.agent_mut(agent_id)?;
            if state.status != AgentStatus::Running {
                return Ok(());
            }
            state.status = AgentStatus::Completed;
            state.current_task = None;
            state.last_activity = at;
            state.sync_version += 1;
        }
        self.session.total_tasks_processed += 1;
        info!(agent_id = %agent_id, "Agent completed");
        self.persist_agent(agent_id).await?;
        self.persist_session().await
    }

    /// Running -> Failed. When a retry is still available it is consumed
    /// here (error_count moves toward max_retries) and the caller appends
    /// the recovery event. A failure for an agent that is not Running is a
    /// replayed event and changes nothing.
    pub async fn mark_failed(
        &mut self,
        agent_id: &str,
        max_retries: u32,
        at: DateTime<Utc>,
    ) -> Result<FailureDisposition, CoordinationError> {
        let disposition = {
            let state = self.agent_mut(agent_id)?;
            if state.status != AgentStatus::Running {
                return Ok(FailureDisposition::NotRunning);
            }
            state.status = AgentStatus::Failed;
            state.last_activity = at;
            state.sync_version += 1;
            if state.error_count < max_retries {
                state.error_count += 1;
                FailureDisposition::Retry {
                    attempt: state.error_count,
                }
            } else {
                FailureDisposition::Exhausted
            }
        };
        self.session.total_errors += 1;
        self.persist_agent(agent_id).await?;
        self.persist_session().await?;
        Ok(disposition)
    }

    /// Failed -> Idle, for the next scheduling pass.
    pub async fn reset_for_retry(
        &mut self,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CoordinationError> {
        {
            let state = self.agent_mut(agent_id)?;
            if state.status != AgentStatus::Failed {
                return Ok(());
            }
            state.status = AgentStatus::Idle;
            state.current_task = None;
            state.last_activity = at;
            state.sync_version += 1;
        }
        info!(agent_id = %agent_id, "Agent reset for retry");
        self.persist_agent(agent_id).await
    }

    /// Running -> Blocked, entered only via emergency stop. There is no
    /// automatic way out; a session restart is required.
    pub async fn mark_blocked_if_running(&mut self) -> Result<Vec<String>, CoordinationError> {
        let blocked: Vec<String> = self
            .agents
            .values_mut()
            .filter(|state| state.status == AgentStatus::Running)
            .map(|state| {
                state.status = AgentStatus::Blocked;
                state.last_activity = Utc::now();
                state.sync_version += 1;
                state.agent_id.clone()
            })
            .collect();
        for agent_id in &blocked {
            warn!(agent_id = %agent_id, "Agent blocked by emergency stop");
            self.persist_agent(agent_id).await?;
        }
        Ok(blocked)
    }

    pub async fn touch(
        &mut self,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CoordinationError> {
        {
            let state = self.agent_mut(agent_id)?;
            state.last_activity = at;
            state.sync_version += 1;
        }
        self.persist_agent(agent_id).await
    }

    /// Merge the per-agent drop files under `agent_sync/` into the project
    /// state document and fold any reported gate booleans into gate values.
    pub async fn sync_agent_states(&mut self) -> Result<(), CoordinationError> {
        let mut documents = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.paths.sync_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match fs_util::read_json_lenient::<AgentSyncDocument>(&path).await {
                RecordRead::Value(document) => documents.push(document),
                RecordRead::Missing | RecordRead::Corrupt => {}
            }
        }

        let merged = merge_sync_documents(&documents);
        fs_util::write_json_atomic(&self.paths.project_state_file, &merged).await?;

        for document in &documents {
            if let Some(tests_ok) = document.quality_gates_status.get("tests") {
                if let Some(gate) = self.gates.get_mut("tests_passing") {
                    gate.current_value = if *tests_ok { 100.0 } else { 0.0 };
                }
            }
            if let Some(build_ok) = document.quality_gates_status.get("build") {
                if let Some(gate) = self.gates.get_mut("build_success") {
                    gate.current_value = if *build_ok { 1.0 } else { 0.0 };
                }
            }
        }
        self.persist_gates().await?;
        self.persist_session().await?;

        debug!(documents = documents.len(), "Agent states synchronized");
        Ok(())
    }
}

/// Union the set-valued fields, take latest-wins for scalars that any agent
/// actually reported, and keep the highest quality score seen.
fn merge_sync_documents(documents: &[AgentSyncDocument]) -> ProjectState {
    let mut merged = ProjectState::default();
    for document in documents {
        let state = &document.project_state;
        merged
            .installed_dependencies
            .extend(state.installed_dependencies.iter().cloned());
        merged.created_files.extend(state.created_files.iter().cloned());
        merged
            .completed_subtasks
            .extend(state.completed_subtasks.iter().cloned());

        if let Some(project_type) = &state.project_type {
            if project_type != "unknown" {
                merged.project_type = project_type.clone();
            }
        }
        if let Some(build_status) = &state.build_status {
            if build_status != "unknown" {
                merged.build_status = build_status.clone();
            }
        }

        merged
            .test_results
            .extend(state.test_results.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.errors.extend(state.errors.iter().cloned());

        if state.quality_score > merged.quality_score {
            merged.quality_score = state.quality_score;
        }
    }
    merged.last_updated = Utc::now();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn failure_disposition_distinguishes_replay_from_exhaustion() {
        let dir = TempDir::new().unwrap();
        let paths = CoordinationPaths::new(
            dir.path(),
            ".ringmaster/coordination",
            ".ringmaster/agent_sync",
        );
        let definitions = vec![AgentDefinition {
            id: "worker".to_string(),
            program: "/bin/true".to_string(),
            args: vec![],
            description: String::new(),
            dependencies: vec![],
            locks: vec![],
            max_runtime_secs: 30,
            max_retries: 1,
        }];
        let mut store = StateStore::open(paths, &definitions).await.unwrap();
        let now = Utc::now();

        // A failure for an Idle agent is a replay: no counter movement.
        assert_eq!(
            store.mark_failed("worker", 1, now).await.unwrap(),
            FailureDisposition::NotRunning
        );
        assert_eq!(store.session.total_errors, 0);
        assert_eq!(store.agents["worker"].error_count, 0);

        store.mark_running("worker", None, now).await.unwrap();
        assert_eq!(
            store.mark_failed("worker", 1, now).await.unwrap(),
            FailureDisposition::Retry { attempt: 1 }
        );

        store.reset_for_retry("worker", now).await.unwrap();
        store.mark_running("worker", None, now).await.unwrap();
        assert_eq!(
            store.mark_failed("worker", 1, now).await.unwrap(),
            FailureDisposition::Exhausted
        );
        assert_eq!(store.session.total_errors, 2);
    }

    fn sync_doc(deps: &[&str], quality: f64, build: Option<&str>) -> AgentSyncDocument {
        AgentSyncDocument {
            project_state: SyncedProjectState {
                installed_dependencies: deps.iter().map(|s| s.to_string()).collect(),
                build_status: build.map(|s| s.to_string()),
                quality_score: quality,
                ..SyncedProjectState::default()
            },
            quality_gates_status: BTreeMap::new(),
        }
    }

    #[test]
    fn merge_unions_sets_and_keeps_highest_quality_score() {
        let merged = merge_sync_documents(&[
            sync_doc(&["serde", "tokio"], 6.5, Some("passing")),
            sync_doc(&["tokio", "clap"], 9.0, None),
        ]);
        assert_eq!(merged.installed_dependencies.len(), 3);
        assert_eq!(merged.build_status, "passing");
        assert!((merged.quality_score - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_ignores_unknown_scalars() {
        let merged = merge_sync_documents(&[sync_doc(&[], 0.0, Some("unknown"))]);
        assert_eq!(merged.build_status, "unknown");
    }
}
