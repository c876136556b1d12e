//! Dependency scheduler.
//!
//! Declared order is the tie-break rule: the first definition that is Idle
//! and whose dependencies have all Completed is the next runnable agent.
//! Returning `None` means the session is either finished or stuck; callers
//! distinguish the two by inspecting agent statuses.

use std::collections::BTreeMap;

use super::types::{AgentDefinition, AgentState, AgentStatus};

pub fn next_runnable<'a>(
    definitions: &'a [AgentDefinition],
    states: &BTreeMap<String, AgentState>,
) -> Option<&'a AgentDefinition> {
    definitions.iter().find(|definition| {
        let Some(state) = states.get(&definition.id) else {
            return false;
        };
        if state.status != AgentStatus::Idle {
            return false;
        }
        definition.dependencies.iter().all(|dep| {
            states
                .get(dep)
                .is_some_and(|dep_state| dep_state.status == AgentStatus::Completed)
        })
    })
}

/// True once every defined agent has reached Completed.
pub fn all_completed(
    definitions: &[AgentDefinition],
    states: &BTreeMap<String, AgentState>,
) -> bool {
    definitions.iter().all(|definition| {
        states
            .get(&definition.id)
            .is_some_and(|state| state.status == AgentStatus::Completed)
    })
}
