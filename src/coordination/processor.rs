//! Event processor: turns ledger events into state transitions.
//!
//! Dispatch is a total match over [`EventKind`], so adding a kind is a
//! compile-time change. An event is marked processed only after its handler
//! returned Ok; a handler failure leaves it on the queue for the next drain,
//! which is why every handler is written as an idempotent "set" guarded on
//! the state machine edge it implements.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

use super::events::EventLedger;
use super::gates::QualityGateEvaluator;
use super::state::{FailureDisposition, StateStore};
use super::types::{AgentDefinition, CoordinationEvent, EventKind};
use super::CoordinationError;

/// Drain and handle all pending events in append order. Returns how many
/// were processed. Events whose handler fails stay unprocessed; events of
/// unknown kind are logged and marked processed as a no-op.
pub async fn process_pending(
    definitions: &[AgentDefinition],
    store: &mut StateStore,
    ledger: &mut EventLedger,
    gates: &QualityGateEvaluator,
    retry_enabled: bool,
    stop_requested: &AtomicBool,
) -> Result<usize, CoordinationError> {
    let pending = ledger.drain_unprocessed();
    let mut handled = 0;
    for event in pending {
        match dispatch(
            &event,
            definitions,
            store,
            ledger,
            gates,
            retry_enabled,
            stop_requested,
        )
        .await
        {
            Ok(()) => {
                ledger.mark_processed(&event.event_id).await?;
                handled += 1;
            }
            Err(err) => {
                error!(
                    event_id = %event.event_id,
                    kind = %event.kind,
                    error = %err,
                    "Event handler failed; event stays queued for the next drain"
                );
            }
        }
    }
    if handled > 0 {
        debug!(handled = handled, "Processed pending events");
    }
    Ok(handled)
}

async fn dispatch(
    event: &CoordinationEvent,
    definitions: &[AgentDefinition],
    store: &mut StateStore,
    ledger: &mut EventLedger,
    gates: &QualityGateEvaluator,
    retry_enabled: bool,
    stop_requested: &AtomicBool,
) -> Result<(), CoordinationError> {
    match &event.kind {
        EventKind::AgentStarted => {
            if store.agents.contains_key(&event.agent_id) {
                let task = event
                    .payload
                    .get("task")
                    .or_else(|| event.payload.get("tag"))
                    .cloned();
                store
                    .mark_running(&event.agent_id, task, event.timestamp)
                    .await?;
            } else {
                warn!(agent_id = %event.agent_id, "Start event for unknown agent");
            }
            Ok(())
        }
        EventKind::AgentCompleted => {
            if store.agents.contains_key(&event.agent_id) {
                store.mark_completed(&event.agent_id, event.timestamp).await?;
            } else {
                warn!(agent_id = %event.agent_id, "Completion event for unknown agent");
            }
            Ok(())
        }
        EventKind::AgentFailed => {
            let Some(definition) = definitions.iter().find(|d| d.id == event.agent_id) else {
                warn!(agent_id = %event.agent_id, "Failure event for unknown agent");
                return Ok(());
            };
            let reason = event
                .payload
                .get("error")
                .cloned()
                .unwrap_or_else(|| "unknown error".to_string());
            let max_retries = if retry_enabled {
                definition.max_retries
            } else {
                0
            };
            match store
                .mark_failed(&event.agent_id, max_retries, event.timestamp)
                .await?
            {
                FailureDisposition::Retry { attempt } => {
                    info!(
                        agent_id = %event.agent_id,
                        attempt = attempt,
                        max_retries = definition.max_retries,
                        error = %reason,
                        "Agent failed; scheduling retry"
                    );
                    ledger
                        .append(
                            "coordinator",
                            EventKind::ErrorRecovery,
                            BTreeMap::from([
                                ("agent_id".to_string(), event.agent_id.clone()),
                                ("attempt".to_string(), attempt.to_string()),
                                ("error".to_string(), reason),
                            ]),
                        )
                        .await?;
                    // Reset now so the scheduler can pick the agent up next
                    // cycle; the recovery event re-applies this on replay.
                    store
                        .reset_for_retry(&event.agent_id, event.timestamp)
                        .await?;
                }
                FailureDisposition::Exhausted => {
                    error!(
                        agent_id = %event.agent_id,
                        error = %reason,
                        "Agent failed with retries exhausted; permanently failed"
                    );
                }
                FailureDisposition::NotRunning => {
                    debug!(
                        agent_id = %event.agent_id,
                        event_id = %event.event_id,
                        "Replayed failure event for an agent that is not running"
                    );
                }
            }
            Ok(())
        }
        EventKind::QualityGateCheck => {
            let Some(gate_id) = event.payload.get("gate_id") else {
                warn!(event_id = %event.event_id, "Gate check event without gate_id");
                return Ok(());
            };
            let value = event
                .payload
                .get("value")
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0);
            gates.update(store, ledger, gate_id, value).await
        }
        EventKind::QualityGateFailed => {
            warn!(
                gate_id = %event.payload.get("gate_id").map(String::as_str).unwrap_or("?"),
                "Quality gate failure recorded"
            );
            Ok(())
        }
        EventKind::TaskCompleted => {
            if store.agents.contains_key(&event.agent_id) {
                store.touch(&event.agent_id, event.timestamp).await?;
            }
            store.sync_agent_states().await?;
            info!(
                agent_id = %event.agent_id,
                task_id = %event.payload.get("task_id").map(String::as_str).unwrap_or("?"),
                "Task completed"
            );
            Ok(())
        }
        EventKind::SyncRequest => {
            debug!(agent_id = %event.agent_id, "Sync requested");
            store.sync_agent_states().await
        }
        EventKind::ErrorRecovery => {
            let Some(agent_id) = event.payload.get("agent_id") else {
                warn!(event_id = %event.event_id, "Recovery event without agent_id");
                return Ok(());
            };
            if store.agents.contains_key(agent_id) {
                store.reset_for_retry(agent_id, event.timestamp).await?;
            }
            Ok(())
        }
        EventKind::EmergencyStop => {
            warn!(source = %event.agent_id, "Emergency stop");
            stop_requested.store(true, Ordering::SeqCst);
            store.mark_blocked_if_running().await?;
            store.set_workflow_phase("stopped").await
        }
        EventKind::Unknown(other) => {
            warn!(
                event_id = %event.event_id,
                kind = %other,
                "Unknown event type, skipping"
            );
            Ok(())
        }
    }
}
