//! End-to-end workflow runs against real shell-script agents.

#![cfg(unix)]

use async_trait::async_trait;
use ringmaster::{
    AgentDefinition, AgentLauncher, AgentStatus, CoordinatorContext, Outcome, OutcomeStatus,
    RingmasterConfig,
};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path.to_string_lossy().into_owned()
}

fn agent(id: &str, program: &str, dependencies: &[&str], max_retries: u32) -> AgentDefinition {
    AgentDefinition {
        id: id.to_string(),
        program: program.to_string(),
        args: vec![],
        description: String::new(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        locks: vec![],
        max_runtime_secs: 30,
        max_retries,
    }
}

fn fast_config(agents: Vec<AgentDefinition>, enforcement: bool) -> RingmasterConfig {
    let mut config = RingmasterConfig::default();
    config.agents = agents;
    config.workflow.quality_gate_enforcement = enforcement;
    config.coordination.cycle_delay_ms = 0;
    config
}

#[tokio::test]
async fn three_agent_pipeline_completes_in_order() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("order.log");
    let append = |name: &str| format!("echo {name} >> {}", log.display());
    let config = fast_config(
        vec![
            agent("plan", &script(dir.path(), "plan.sh", &append("plan")), &[], 0),
            agent(
                "execute",
                &script(dir.path(), "execute.sh", &append("execute")),
                &["plan"],
                0,
            ),
            agent(
                "quality",
                &script(dir.path(), "quality.sh", &append("quality")),
                &["execute"],
                0,
            ),
        ],
        false,
    );

    let mut context = CoordinatorContext::open(dir.path().to_path_buf(), config)
        .await
        .unwrap();
    let report = context.run_workflow("agents", 10, false, false).await.unwrap();

    assert!(report.success);
    assert!(!report.stopped);
    for id in ["plan", "execute", "quality"] {
        assert_eq!(context.store.agents[id].status, AgentStatus::Completed);
    }
    assert_eq!(context.store.session.total_tasks_processed, 3);
    assert_eq!(context.store.session.workflow_phase, "completed");

    let order = std::fs::read_to_string(&log).unwrap();
    assert_eq!(order, "plan\nexecute\nquality\n");
}

#[tokio::test]
async fn failing_agent_exhausts_retries_and_stops_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(
        vec![
            agent("plan", &script(dir.path(), "plan.sh", "exit 0"), &[], 0),
            agent(
                "execute",
                &script(dir.path(), "execute.sh", "exit 1"),
                &["plan"],
                1,
            ),
            agent(
                "quality",
                &script(dir.path(), "quality.sh", "exit 0"),
                &["execute"],
                0,
            ),
        ],
        false,
    );

    let mut context = CoordinatorContext::open(dir.path().to_path_buf(), config)
        .await
        .unwrap();
    let report = context.run_workflow("agents", 10, false, false).await.unwrap();

    assert!(!report.success);
    assert_eq!(context.store.agents["plan"].status, AgentStatus::Completed);
    // One retry was granted and consumed; the second failure is terminal.
    assert_eq!(context.store.agents["execute"].status, AgentStatus::Failed);
    assert_eq!(context.store.agents["execute"].error_count, 1);
    // The downstream agent never became runnable.
    assert_eq!(context.store.agents["quality"].status, AgentStatus::Idle);
    assert_eq!(context.store.session.workflow_phase, "idle");
}

#[tokio::test]
async fn per_run_arguments_reach_the_agent() {
    let dir = TempDir::new().unwrap();
    let args_file = dir.path().join("args.txt");
    let config = fast_config(
        vec![agent(
            "echoer",
            &script(
                dir.path(),
                "echoer.sh",
                &format!("echo \"$@\" > {}", args_file.display()),
            ),
            &[],
            0,
        )],
        false,
    );

    let mut context = CoordinatorContext::open(dir.path().to_path_buf(), config)
        .await
        .unwrap();
    let report = context
        .run_workflow("release-7", 10, true, false)
        .await
        .unwrap();

    assert!(report.success);
    let args = std::fs::read_to_string(&args_file).unwrap();
    assert!(args.contains("--tag release-7"));
    assert!(args.contains("--dry-run"));
}

struct CountingLauncher {
    launches: Arc<AtomicUsize>,
}

#[async_trait]
impl AgentLauncher for CountingLauncher {
    async fn launch(
        &self,
        _definition: &AgentDefinition,
        _args: &[String],
        _cwd: &Path,
    ) -> Outcome {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Outcome {
            status: OutcomeStatus::Success,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
        }
    }
}

#[tokio::test]
async fn failing_quality_gates_prevent_any_launch() {
    let dir = TempDir::new().unwrap();
    // Stock gates start below threshold, and enforcement is on.
    let config = fast_config(vec![agent("plan", "/bin/true", &[], 0)], true);
    let launches = Arc::new(AtomicUsize::new(0));
    let launcher = Box::new(CountingLauncher {
        launches: Arc::clone(&launches),
    });

    let mut context =
        CoordinatorContext::open_with_launcher(dir.path().to_path_buf(), config, launcher)
            .await
            .unwrap();
    let report = context.run_workflow("agents", 3, false, false).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.cycles_run, 3);
    assert_eq!(launches.load(Ordering::SeqCst), 0);
    assert_eq!(context.store.agents["plan"].status, AgentStatus::Idle);
}

#[tokio::test]
async fn raised_stop_flag_halts_the_workflow_before_any_launch() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(vec![agent("plan", "/bin/true", &[], 0)], false);
    let launches = Arc::new(AtomicUsize::new(0));
    let launcher = Box::new(CountingLauncher {
        launches: Arc::clone(&launches),
    });

    let mut context =
        CoordinatorContext::open_with_launcher(dir.path().to_path_buf(), config, launcher)
            .await
            .unwrap();
    context.stop_flag().store(true, Ordering::SeqCst);
    let report = context.run_workflow("agents", 10, false, false).await.unwrap();

    assert!(report.stopped);
    assert!(!report.success);
    assert_eq!(launches.load(Ordering::SeqCst), 0);
    assert_eq!(context.store.session.workflow_phase, "stopped");
}

#[tokio::test]
async fn completed_state_survives_a_context_reopen() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(vec![agent("plan", "/bin/true", &[], 0)], false);

    {
        let mut context = CoordinatorContext::open(dir.path().to_path_buf(), config.clone())
            .await
            .unwrap();
        let report = context.run_workflow("agents", 10, false, false).await.unwrap();
        assert!(report.success);
    }

    let context = CoordinatorContext::open(dir.path().to_path_buf(), config)
        .await
        .unwrap();
    let report = context.status_report();
    assert_eq!(report.agents["plan"].status, AgentStatus::Completed);
    assert_eq!(report.session.total_tasks_processed, 1);
    assert_eq!(report.pending_events, 0);
}
