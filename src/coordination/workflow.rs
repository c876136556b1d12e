//! Workflow loop and coordinator context.
//!
//! [`CoordinatorContext`] owns every engine component explicitly (no module
//! globals), so independent sessions can coexist in one process and tests
//! can build as many as they need. One workflow cycle is
//! drain -> sync -> gate-check -> schedule -> run, bounded by `max_cycles`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RingmasterConfig;

use super::events::EventLedger;
use super::gates::QualityGateEvaluator;
use super::locks::LockManager;
use super::processor;
use super::runner::{AgentLauncher, ProcessRunner};
use super::scheduler;
use super::state::StateStore;
use super::types::{
    AgentDefinition, AgentState, CoordinationSession, EventKind, QualityGate,
};
use super::{CoordinationError, CoordinationPaths};

/// Holder id the coordinator uses for its own lock acquisitions.
const COORDINATOR_HOLDER: &str = "coordinator";

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    /// True when every defined agent reached Completed
    pub success: bool,
    pub cycles_run: u32,
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub session: CoordinationSession,
    pub agents: BTreeMap<String, AgentState>,
    pub quality_gates: BTreeMap<String, QualityGate>,
    pub pending_events: usize,
}

pub struct CoordinatorContext {
    pub config: RingmasterConfig,
    pub project_root: PathBuf,
    pub definitions: Vec<AgentDefinition>,
    pub locks: LockManager,
    pub ledger: EventLedger,
    pub store: StateStore,
    pub gates: QualityGateEvaluator,
    launcher: Box<dyn AgentLauncher>,
    stop_requested: Arc<AtomicBool>,
}

impl CoordinatorContext {
    /// Open (or resume) a coordination session under `project_root`.
    pub async fn open(
        project_root: PathBuf,
        config: RingmasterConfig,
    ) -> Result<Self, CoordinationError> {
        let launcher = Box::new(ProcessRunner::new(config.coordination.output_budget_bytes));
        Self::open_with_launcher(project_root, config, launcher).await
    }

    /// Same as [`open`], with an injected launcher. Used by tests to observe
    /// or suppress real process launches.
    pub async fn open_with_launcher(
        project_root: PathBuf,
        config: RingmasterConfig,
        launcher: Box<dyn AgentLauncher>,
    ) -> Result<Self, CoordinationError> {
        let paths = CoordinationPaths::new(
            &project_root,
            &config.coordination.dir,
            &config.coordination.sync_dir,
        );
        paths.ensure().await?;

        let definitions = config.agents.clone();
        let locks = LockManager::new(paths.locks_dir.clone());
        let ledger = EventLedger::open(paths.events_dir.clone()).await?;
        let store = StateStore::open(paths, &definitions).await?;
        let gates = QualityGateEvaluator::new(config.workflow.quality_gate_enforcement);

        Ok(Self {
            config,
            project_root,
            definitions,
            locks,
            ledger,
            store,
            gates,
            launcher,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag a signal handler can set to request an emergency stop.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    fn stop_pending(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Record and apply an emergency stop: running agents become Blocked,
    /// nothing is forcibly killed, and no automatic transition leaves
    /// Blocked afterwards.
    pub async fn emergency_stop(&mut self) -> Result<(), CoordinationError> {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.ledger
            .append(COORDINATOR_HOLDER, EventKind::EmergencyStop, BTreeMap::new())
            .await?;
        self.process_events().await?;
        Ok(())
    }

    async fn process_events(&mut self) -> Result<usize, CoordinationError> {
        processor::process_pending(
            &self.definitions,
            &mut self.store,
            &mut self.ledger,
            &self.gates,
            self.config.workflow.error_recovery,
            &self.stop_requested,
        )
        .await
    }

    /// Run the bounded workflow loop. Returns a report rather than failing
    /// on agent errors; only storage failures on the ledger itself error out.
    pub async fn run_workflow(
        &mut self,
        tag: &str,
        max_cycles: u32,
        dry_run: bool,
        verbose: bool,
    ) -> Result<WorkflowReport, CoordinationError> {
        info!(
            tag = %tag,
            max_cycles = max_cycles,
            dry_run = dry_run,
            "Starting agent workflow"
        );
        self.store.set_workflow_phase("workflow").await?;

        let cycle_delay = Duration::from_millis(self.config.coordination.cycle_delay_ms);
        let mut cycles_run = 0;

        for cycle in 0..max_cycles {
            if self.stop_pending() {
                self.emergency_stop().await?;
                break;
            }
            cycles_run = cycle + 1;
            info!(cycle = cycle + 1, max_cycles = max_cycles, "Workflow cycle");

            self.process_events().await?;
            if self.stop_pending() {
                // An EmergencyStop event came through the ledger
                break;
            }

            self.store.sync_agent_states().await?;

            if !self.gates.enforce(&self.store) {
                warn!("Quality gates failed - workflow blocked this cycle");
                tokio::time::sleep(cycle_delay).await;
                continue;
            }

            let Some(definition) =
                scheduler::next_runnable(&self.definitions, &self.store.agents).cloned()
            else {
                info!("No runnable agent - workflow finished or blocked");
                break;
            };

            let success = self.run_agent(&definition, tag, dry_run, verbose).await?;
            if !success && !self.config.workflow.error_recovery {
                warn!(
                    agent_id = %definition.id,
                    "Agent failed and error recovery is disabled"
                );
                break;
            }

            tokio::time::sleep(cycle_delay).await;
        }

        // Fold the last run's events into state before reporting.
        self.process_events().await?;
        self.store.sync_agent_states().await?;
        self.store.persist_gates().await?;

        let success = scheduler::all_completed(&self.definitions, &self.store.agents);
        let stopped = self.stop_pending();
        let phase = if stopped {
            "stopped"
        } else if success {
            "completed"
        } else {
            "idle"
        };
        self.store.set_workflow_phase(phase).await?;
        info!(success = success, cycles_run = cycles_run, "Workflow finished");

        Ok(WorkflowReport {
            success,
            cycles_run,
            stopped,
        })
    }

    /// Launch one agent run: acquire its declared locks, record the start,
    /// launch, and record the outcome as a Completed/Failed event. Returns
    /// whether the run succeeded.
    async fn run_agent(
        &mut self,
        definition: &AgentDefinition,
        tag: &str,
        dry_run: bool,
        verbose: bool,
    ) -> Result<bool, CoordinationError> {
        let lock_timeout = Duration::from_secs(self.config.coordination.lock_timeout_secs);
        let mut held = Vec::new();
        for resource in &definition.locks {
            if self
                .locks
                .acquire(resource, COORDINATOR_HOLDER, lock_timeout)
                .await?
            {
                held.push(resource.clone());
            } else {
                // Advisory discipline: log and proceed without the lock
                warn!(
                    resource = %resource,
                    agent_id = %definition.id,
                    "Proceeding without lock"
                );
            }
        }

        self.ledger
            .append(
                &definition.id,
                EventKind::AgentStarted,
                BTreeMap::from([
                    ("tag".to_string(), tag.to_string()),
                    ("dry_run".to_string(), dry_run.to_string()),
                ]),
            )
            .await?;

        let mut args = vec!["--tag".to_string(), tag.to_string()];
        if verbose {
            args.push("--verbose".to_string());
        }
        if dry_run {
            args.push("--dry-run".to_string());
        }

        let outcome = self
            .launcher
            .launch(definition, &args, &self.project_root)
            .await;

        if outcome.is_success() {
            self.ledger
                .append(
                    &definition.id,
                    EventKind::AgentCompleted,
                    BTreeMap::from([
                        ("exit_code".to_string(), "0".to_string()),
                        ("output".to_string(), outcome.stdout_excerpt.clone()),
                    ]),
                )
                .await?;
        } else {
            self.ledger
                .append(
                    &definition.id,
                    EventKind::AgentFailed,
                    BTreeMap::from([
                        (
                            "error".to_string(),
                            outcome.failure_reason(definition.max_runtime_secs),
                        ),
                        ("output".to_string(), outcome.stderr_excerpt.clone()),
                    ]),
                )
                .await?;
        }

        for resource in held {
            let _ = self
                .locks
                .release(&resource, COORDINATOR_HOLDER)
                .await?;
        }

        Ok(outcome.is_success())
    }

    /// One state-merge pass without running any agents (the `sync` mode).
    pub async fn sync_once(&mut self) -> Result<(), CoordinationError> {
        self.process_events().await?;
        self.store.sync_agent_states().await?;
        Ok(())
    }

    /// Repeat sync + drain forever at a fixed interval, until the stop flag
    /// is raised.
    pub async fn monitor(&mut self, interval: Duration) -> Result<(), CoordinationError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if self.stop_pending() {
                info!("Monitoring stopped");
                return Ok(());
            }
            self.sync_once().await?;
        }
    }

    /// Snapshot of session, agents, gates, and the pending-event count.
    /// Always succeeds, even when the session is stuck.
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            session: self.store.session.clone(),
            agents: self.store.agents.clone(),
            quality_gates: self.store.gates.clone(),
            pending_events: self.ledger.pending(),
        }
    }
}
