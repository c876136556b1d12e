use anyhow::Result;
use std::path::PathBuf;

pub struct StatusCommand {
    pub project_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub json: bool,
}

impl StatusCommand {
    /// Report state as data. This command succeeds even when the session is
    /// stuck; a failed workflow is something to display, not an error here.
    pub async fn execute(&self) -> Result<()> {
        let context =
            super::open_context(&self.project_root, self.config_path.as_deref(), false).await?;
        let report = context.status_report();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("🎪 RINGMASTER SYSTEM STATUS");
        println!("===========================");
        println!();

        println!("🗂️  SESSION:");
        println!("   id: {}", report.session.session_id);
        println!("   phase: {}", report.session.workflow_phase);
        println!(
            "   tasks processed: {} | errors: {}",
            report.session.total_tasks_processed, report.session.total_errors
        );
        if let Some(last_sync) = report.session.last_sync {
            println!("   last sync: {}", last_sync);
        }
        println!();

        println!("🤖 AGENTS:");
        println!("──────────");
        for (agent_id, state) in &report.agents {
            let marker = match state.status {
                crate::coordination::AgentStatus::Completed => "🟢",
                crate::coordination::AgentStatus::Running => "🔵",
                crate::coordination::AgentStatus::Failed => "🔴",
                crate::coordination::AgentStatus::Blocked => "⛔",
                crate::coordination::AgentStatus::Idle => "⚪",
            };
            println!(
                "{} {} - {} (errors: {}, v{})",
                marker, agent_id, state.status, state.error_count, state.sync_version
            );
            if let Some(task) = &state.current_task {
                println!("     task: {}", task);
            }
        }
        println!();

        println!("🚦 QUALITY GATES:");
        println!("─────────────────");
        for (gate_id, gate) in &report.quality_gates {
            let marker = if gate.passes() { "🟢" } else { "🔴" };
            println!(
                "{} {} - {:.1} / {:.1}{}",
                marker,
                gate_id,
                gate.current_value,
                gate.threshold,
                if gate.blocking { " (blocking)" } else { "" }
            );
        }
        println!();

        println!("📨 Pending events: {}", report.pending_events);
        Ok(())
    }
}
