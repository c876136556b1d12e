use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::coordination::AgentDefinition;

/// Main configuration structure for Ringmaster
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RingmasterConfig {
    /// Coordination storage settings
    pub coordination: CoordinationSettings,
    /// Workflow loop settings
    pub workflow: WorkflowSettings,
    /// Agents coordinated by the workflow loop, in declared (scheduling) order
    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinationSettings {
    /// Coordination root, relative to the project root
    pub dir: String,
    /// Directory agents drop their sync documents into
    pub sync_dir: String,
    /// Lock acquisition timeout (doubles as the lease lifetime)
    pub lock_timeout_secs: u64,
    /// Captured agent output is truncated to this many bytes
    pub output_budget_bytes: usize,
    /// Pause between workflow cycles
    pub cycle_delay_ms: u64,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            dir: ".ringmaster/coordination".to_string(),
            sync_dir: ".ringmaster/agent_sync".to_string(),
            lock_timeout_secs: 30,
            output_budget_bytes: 1000,
            cycle_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Maximum workflow cycles per run
    pub max_cycles: u32,
    /// When false, quality gates are advisory only
    pub quality_gate_enforcement: bool,
    /// When false, failed agents are never retried
    pub error_recovery: bool,
    /// Monitor mode sync interval
    pub sync_interval_secs: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            quality_gate_enforcement: true,
            error_recovery: true,
            sync_interval_secs: 5,
        }
    }
}

impl Default for RingmasterConfig {
    fn default() -> Self {
        Self {
            coordination: CoordinationSettings::default(),
            workflow: WorkflowSettings::default(),
            agents: default_agents(),
        }
    }
}

/// The stock three-agent pipeline: plan, execute, then quality/git. The two
/// agents that touch the working tree share the `git_workflow` lock.
fn default_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition {
            id: "planning_analysis".to_string(),
            program: "agents/planning-analysis-agent".to_string(),
            args: vec![],
            description: "Planning & Analysis Agent".to_string(),
            dependencies: vec![],
            locks: vec![],
            max_runtime_secs: 300,
            max_retries: 3,
        },
        AgentDefinition {
            id: "universal_execution".to_string(),
            program: "agents/universal-execution-agent".to_string(),
            args: vec![],
            description: "Universal Execution Agent".to_string(),
            dependencies: vec!["planning_analysis".to_string()],
            locks: vec!["git_workflow".to_string()],
            max_runtime_secs: 600,
            max_retries: 3,
        },
        AgentDefinition {
            id: "quality_git".to_string(),
            program: "agents/quality-git-agent".to_string(),
            args: vec![],
            description: "Quality & Git Agent".to_string(),
            dependencies: vec!["universal_execution".to_string()],
            locks: vec!["git_workflow".to_string()],
            max_runtime_secs: 300,
            max_retries: 2,
        },
    ]
}

impl RingmasterConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. Configuration file (`ringmaster.toml` or an explicit path)
    /// 3. Environment variables (prefixed with RINGMASTER_)
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()));
        } else if Path::new("ringmaster.toml").exists() {
            builder = builder.add_source(File::with_name("ringmaster"));
        }

        builder = builder.add_source(
            Environment::with_prefix("RINGMASTER")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_stock_pipeline() {
        let config = RingmasterConfig::default();
        assert_eq!(config.agents.len(), 3);
        assert_eq!(config.agents[0].id, "planning_analysis");
        assert!(config.agents[1]
            .dependencies
            .contains(&"planning_analysis".to_string()));
        assert!(config.workflow.quality_gate_enforcement);
    }
}
