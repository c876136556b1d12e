//! Coordination engine: durable state, advisory locks, event ledger,
//! dependency scheduling, quality gates, and the bounded workflow loop.

pub mod events;
pub mod fs_util;
pub mod gates;
pub mod locks;
pub mod processor;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod workflow;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use events::EventLedger;
pub use gates::QualityGateEvaluator;
pub use locks::LockManager;
pub use runner::{AgentLauncher, Outcome, OutcomeStatus, ProcessRunner};
pub use state::{FailureDisposition, StateStore};
pub use types::{
    AgentDefinition, AgentState, AgentStatus, CoordinationEvent, CoordinationSession, EventKind,
    LockLease, QualityGate,
};
pub use workflow::{CoordinatorContext, StatusReport, WorkflowReport};

/// Errors raised by the coordination engine. Failures inside one agent's run
/// never surface here; they become events and retry handling instead.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupted record at {path}: {reason}")]
    CorruptedRecord { path: PathBuf, reason: String },

    #[error("event ledger append failed: {reason}")]
    LedgerAppend { reason: String },

    #[error("unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },
}

/// Filesystem layout of one coordination root. Each record category gets its
/// own subdirectory so external tooling can watch a single path.
#[derive(Debug, Clone)]
pub struct CoordinationPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub events_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub sync_dir: PathBuf,
    pub project_state_file: PathBuf,
}

impl CoordinationPaths {
    pub fn new(project_root: &Path, coordination_dir: &str, sync_dir: &str) -> Self {
        let root = project_root.join(coordination_dir);
        Self {
            state_dir: root.join("state"),
            events_dir: root.join("events"),
            locks_dir: root.join("locks"),
            sync_dir: project_root.join(sync_dir),
            project_state_file: root.join("state").join("project_state.json"),
            root,
        }
    }

    pub async fn ensure(&self) -> Result<(), CoordinationError> {
        for dir in [&self.root, &self.state_dir, &self.events_dir, &self.locks_dir, &self.sync_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
