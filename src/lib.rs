// Ringmaster Library - file-backed coordination of ordered agent processes
// This exposes the engine components for testing and integration

pub mod cli;
pub mod config;
pub mod coordination;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{CoordinationSettings, RingmasterConfig, WorkflowSettings};
pub use coordination::{
    AgentDefinition, AgentLauncher, AgentState, AgentStatus, CoordinationError,
    CoordinationEvent, CoordinationPaths, CoordinationSession, CoordinatorContext, EventKind,
    EventLedger, FailureDisposition, LockLease, LockManager, Outcome, OutcomeStatus,
    ProcessRunner, QualityGate, QualityGateEvaluator, StateStore, StatusReport, WorkflowReport,
};
pub use telemetry::init_telemetry;
