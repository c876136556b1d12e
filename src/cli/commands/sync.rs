use anyhow::Result;
use std::path::PathBuf;

pub struct SyncCommand {
    pub project_root: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl SyncCommand {
    pub async fn execute(&self) -> Result<()> {
        let mut context =
            super::open_context(&self.project_root, self.config_path.as_deref(), false).await?;
        context.sync_once().await?;
        println!("✅ Agent states synchronized");
        Ok(())
    }
}
