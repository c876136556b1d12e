use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

pub struct WorkflowCommand {
    pub project_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub tag: String,
    pub max_cycles: Option<u32>,
    pub dry_run: bool,
    pub verbose: bool,
    pub no_quality_gates: bool,
}

impl WorkflowCommand {
    pub async fn execute(&self) -> Result<()> {
        let mut context = super::open_context(
            &self.project_root,
            self.config_path.as_deref(),
            self.no_quality_gates,
        )
        .await?;

        let max_cycles = self
            .max_cycles
            .unwrap_or(context.config.workflow.max_cycles);

        // Ctrl-C requests an emergency stop; the loop notices the flag at
        // the top of the next cycle and marks running agents Blocked.
        let stop = context.stop_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        });

        println!(
            "🎪 Running agent workflow (tag: {}, max cycles: {})",
            self.tag, max_cycles
        );
        if self.dry_run {
            println!("👀 Dry run: agents receive --dry-run and should not mutate anything");
        }
        println!();

        let report = context
            .run_workflow(&self.tag, max_cycles, self.dry_run, self.verbose)
            .await?;

        let status = context.status_report();
        println!("📊 AGENT RESULTS:");
        println!("─────────────────");
        for (agent_id, state) in &status.agents {
            let marker = match state.status {
                crate::coordination::AgentStatus::Completed => "🟢",
                crate::coordination::AgentStatus::Failed => "🔴",
                crate::coordination::AgentStatus::Blocked => "⛔",
                _ => "⚪",
            };
            println!(
                "{} {} - {} (errors: {})",
                marker, agent_id, state.status, state.error_count
            );
        }
        println!();

        if report.stopped {
            println!("🛑 Workflow stopped by emergency stop after {} cycle(s)", report.cycles_run);
        }

        if report.success {
            println!("✅ Workflow completed: all agents finished successfully");
            Ok(())
        } else {
            println!(
                "❌ Workflow did not complete (ran {} cycle(s))",
                report.cycles_run
            );
            println!("   → Inspect agent states with: ringmaster status");
            anyhow::bail!("workflow did not complete")
        }
    }
}
