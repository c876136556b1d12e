use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging. `RUST_LOG` wins when set; otherwise the
/// verbose flag picks the default level. Library code logs through
/// `tracing` only; the human-facing report output lives in the CLI layer.
pub fn init_telemetry(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    Ok(())
}
