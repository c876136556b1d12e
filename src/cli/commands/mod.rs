pub mod monitor;
pub mod status;
pub mod sync;
pub mod workflow;

pub use monitor::MonitorCommand;
pub use status::StatusCommand;
pub use sync::SyncCommand;
pub use workflow::WorkflowCommand;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::RingmasterConfig;
use crate::coordination::CoordinatorContext;

/// Shared command plumbing: load layered config, apply CLI overrides, and
/// open a coordinator context rooted at the project directory.
pub(crate) async fn open_context(
    project_root: &Path,
    config_path: Option<&Path>,
    no_quality_gates: bool,
) -> Result<CoordinatorContext> {
    let mut config = RingmasterConfig::load(config_path)?;
    if no_quality_gates {
        config.workflow.quality_gate_enforcement = false;
    }
    let context = CoordinatorContext::open(PathBuf::from(project_root), config).await?;
    Ok(context)
}
