use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

pub struct MonitorCommand {
    pub project_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub interval_secs: Option<u64>,
}

impl MonitorCommand {
    pub async fn execute(&self) -> Result<()> {
        let mut context =
            super::open_context(&self.project_root, self.config_path.as_deref(), false).await?;
        let interval = Duration::from_secs(
            self.interval_secs
                .unwrap_or(context.config.workflow.sync_interval_secs),
        );

        let stop = context.stop_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        });

        println!(
            "👁️  Monitoring coordination state every {}s (Ctrl-C to stop)",
            interval.as_secs()
        );
        context.monitor(interval).await?;
        println!("Monitoring stopped");
        Ok(())
    }
}
