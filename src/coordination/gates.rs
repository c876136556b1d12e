//! Quality gate evaluation.
//!
//! Gates are configuration plus runtime-observed values. This component
//! surfaces failure, it never corrects it: `update` and `check_all` may
//! append `QualityGateFailed` events, `enforce` is a pure read.

use std::collections::BTreeMap;
use tracing::{info, warn};

use super::events::EventLedger;
use super::state::StateStore;
use super::types::EventKind;
use super::CoordinationError;

#[derive(Debug, Clone)]
pub struct QualityGateEvaluator {
    /// When false, `enforce` trivially passes (the --no-quality-gates path).
    pub enforcement_enabled: bool,
}

impl QualityGateEvaluator {
    pub fn new(enforcement_enabled: bool) -> Self {
        Self {
            enforcement_enabled,
        }
    }

    /// Overwrite the gate's current value, last-write-wins. A blocking gate
    /// dropping below threshold emits a `QualityGateFailed` event.
    pub async fn update(
        &self,
        store: &mut StateStore,
        ledger: &mut EventLedger,
        gate_id: &str,
        value: f64,
    ) -> Result<(), CoordinationError> {
        let Some(gate) = store.gates.get_mut(gate_id) else {
            warn!(gate_id = %gate_id, "Quality gate check for unknown gate");
            return Ok(());
        };
        gate.current_value = value;
        let blocking_failure = gate.blocking && value < gate.threshold;
        let threshold = gate.threshold;
        store.persist_gates().await?;

        if blocking_failure {
            warn!(
                gate_id = %gate_id,
                value = value,
                threshold = threshold,
                "Quality gate failed"
            );
            ledger
                .append(
                    "coordinator",
                    EventKind::QualityGateFailed,
                    BTreeMap::from([
                        ("gate_id".to_string(), gate_id.to_string()),
                        ("threshold".to_string(), threshold.to_string()),
                        ("actual".to_string(), value.to_string()),
                    ]),
                )
                .await?;
        } else {
            info!(
                gate_id = %gate_id,
                value = value,
                threshold = threshold,
                "Quality gate passed"
            );
        }
        Ok(())
    }

    /// Evaluate every gate against its threshold. Required gates that fail
    /// re-emit a `QualityGateFailed` event so the failure is on the ledger
    /// even when nothing new was reported.
    pub async fn check_all(
        &self,
        store: &StateStore,
        ledger: &mut EventLedger,
    ) -> Result<BTreeMap<String, bool>, CoordinationError> {
        let mut results = BTreeMap::new();
        for (gate_id, gate) in &store.gates {
            let passed = gate.passes();
            results.insert(gate_id.clone(), passed);
            if gate.required && !passed {
                ledger
                    .append(
                        "coordinator",
                        EventKind::QualityGateFailed,
                        BTreeMap::from([
                            ("gate_id".to_string(), gate_id.clone()),
                            ("required".to_string(), "true".to_string()),
                            ("threshold".to_string(), gate.threshold.to_string()),
                            ("actual".to_string(), gate.current_value.to_string()),
                        ]),
                    )
                    .await?;
            }
        }
        Ok(results)
    }

    /// True only if every gate that is both required and blocking currently
    /// passes. Performs no mutation; failing enforcement skips scheduling for
    /// the cycle but never aborts the session.
    pub fn enforce(&self, store: &StateStore) -> bool {
        if !self.enforcement_enabled {
            return true;
        }
        store
            .gates
            .values()
            .filter(|gate| gate.required && gate.blocking)
            .all(|gate| {
                let passed = gate.passes();
                if !passed {
                    warn!(gate_id = %gate.gate_id, "Required quality gate failing");
                }
                passed
            })
    }
}
