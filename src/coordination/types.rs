//! Core records shared across the coordination engine.
//!
//! Everything here is persisted as JSON under the coordination root, so all
//! types derive serde and keep their on-disk field names stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Static definition of one coordinated agent, loaded from configuration
/// and immutable for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Stable identifier used in dependency lists and state files
    pub id: String,
    /// Executable to launch for this agent
    pub program: String,
    /// Arguments always passed before the per-run arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Human-readable description shown in status reports
    #[serde(default)]
    pub description: String,
    /// Agents that must reach Completed before this one may run
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Named resources that must be locked while this agent runs
    #[serde(default)]
    pub locks: Vec<String>,
    /// Hard wall-clock limit for one run, in seconds
    pub max_runtime_secs: u64,
    /// Retries granted after a failed run before the agent is terminal
    pub max_retries: u32,
}

impl AgentDefinition {
    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Blocked => "blocked",
        };
        f.write_str(label)
    }
}

/// Mutable per-agent record. Only the workflow loop mutates this, in response
/// to processed events; `sync_version` strictly increases with every mutation
/// so lost updates are detectable after a reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub error_count: u32,
    pub quality_score: f64,
    pub sync_version: u64,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Idle,
            current_task: None,
            last_activity: Utc::now(),
            error_count: 0,
            quality_score: 0.0,
            sync_version: 0,
        }
    }
}

/// Threshold check that can block further scheduling when unmet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGate {
    pub gate_id: String,
    pub description: String,
    pub threshold: f64,
    pub current_value: f64,
    pub required: bool,
    pub blocking: bool,
}

impl QualityGate {
    pub fn passes(&self) -> bool {
        self.current_value >= self.threshold
    }
}

/// The built-in gate set, used when no persisted gates exist yet.
pub fn default_quality_gates() -> BTreeMap<String, QualityGate> {
    let gates = [
        QualityGate {
            gate_id: "tests_passing".to_string(),
            description: "All tests must pass".to_string(),
            threshold: 100.0,
            current_value: 0.0,
            required: true,
            blocking: true,
        },
        QualityGate {
            gate_id: "code_quality".to_string(),
            description: "Code quality score above threshold".to_string(),
            threshold: 8.0,
            current_value: 0.0,
            required: true,
            blocking: true,
        },
        QualityGate {
            gate_id: "security_score".to_string(),
            description: "Security vulnerabilities below threshold".to_string(),
            threshold: 0.0,
            current_value: 0.0,
            required: true,
            blocking: true,
        },
        QualityGate {
            gate_id: "build_success".to_string(),
            description: "Build must succeed".to_string(),
            threshold: 1.0,
            current_value: 0.0,
            required: true,
            blocking: true,
        },
    ];
    gates
        .into_iter()
        .map(|gate| (gate.gate_id.clone(), gate))
        .collect()
}

/// Closed set of coordination event kinds. Records written by foreign tools
/// with a kind we do not know deserialize into `Unknown` and are skipped
/// with a warning instead of failing the whole drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStarted,
    AgentCompleted,
    AgentFailed,
    QualityGateCheck,
    QualityGateFailed,
    TaskCompleted,
    SyncRequest,
    ErrorRecovery,
    EmergencyStop,
    #[serde(untagged)]
    Unknown(String),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::AgentStarted => f.write_str("agent_started"),
            EventKind::AgentCompleted => f.write_str("agent_completed"),
            EventKind::AgentFailed => f.write_str("agent_failed"),
            EventKind::QualityGateCheck => f.write_str("quality_gate_check"),
            EventKind::QualityGateFailed => f.write_str("quality_gate_failed"),
            EventKind::TaskCompleted => f.write_str("task_completed"),
            EventKind::SyncRequest => f.write_str("sync_request"),
            EventKind::ErrorRecovery => f.write_str("error_recovery"),
            EventKind::EmergencyStop => f.write_str("emergency_stop"),
            EventKind::Unknown(other) => f.write_str(other),
        }
    }
}

/// Immutable, timestamped record of something an agent or the coordinator
/// did or observed. Only `processed` is ever updated, exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
    pub processed: bool,
}

/// Advisory, time-bounded claim on a named shared resource. Exists only
/// while held; deleted on release or discovered-expired reclaim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockLease {
    pub resource: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// One record per coordinator lifetime, persisted and reloaded across
/// restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub total_tasks_processed: u64,
    pub total_errors: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub workflow_phase: String,
    pub pid: u32,
    pub hostname: String,
}

impl CoordinationSession {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            total_tasks_processed: 0,
            total_errors: 0,
            last_sync: None,
            workflow_phase: "idle".to_string(),
            pid: std::process::id(),
            hostname: hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        }
    }
}

impl Default for CoordinationSession {
    fn default() -> Self {
        Self::new()
    }
}
