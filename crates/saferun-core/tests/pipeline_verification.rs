//! Integration tests for full plan-execute-verify cycles.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use saferun_core::{Orchestrator, OrchestratorConfig, ToolHandler};

/// Writes `args.content` to `args.path`, like a real file-producing tool.
struct FileReportTool;

#[async_trait]
impl ToolHandler for FileReportTool {
    async fn run(&self, args: &Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or("missing 'path' argument")?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("report");
        tokio::fs::write(path, content)
            .await
            .map_err(|err| err.to_string())?;
        Ok(json!({"written": path}))
    }
}

/// Claims success without producing any file.
struct LyingExportTool;

#[async_trait]
impl ToolHandler for LyingExportTool {
    async fn run(&self, _args: &Value) -> Result<Value, String> {
        Ok(json!({"exported": true}))
    }
}

/// Test: a tool whose claimed file really exists passes verification.
#[tokio::test]
async fn test_verified_file_cycle_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    let path_str = path.to_str().unwrap().to_string();

    let mut orch = Orchestrator::new(OrchestratorConfig::default());
    orch.register_handler("file_report", Arc::new(FileReportTool));

    let standalone = orch.generate_plan("file_report", &json!({"path": path_str.as_str()}));
    let result = orch
        .execute_tool("file_report", json!({"path": path_str.as_str()}))
        .await
        .expect("cycle failed");

    assert!(result.success);
    assert!(result.verification.passed);
    assert_eq!(result.success, result.verification.passed);
    assert!(!result.rolled_back);
    assert!(result.verification.evidence.contains(&path_str));
    assert_eq!(result.output["written"], path_str);

    // The plan inside the result is the plan from step 1, unmutated.
    assert_eq!(result.plan, standalone);
    assert!(path.exists());
}

/// Test: a tool that claims a file it never wrote fails verification and
/// enters the rollback path, with the final success forced to false.
#[tokio::test]
async fn test_unverified_claim_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ghost.txt");
    let path_str = path.to_str().unwrap().to_string();

    let mut orch = Orchestrator::new(OrchestratorConfig::default());
    orch.register_handler("file_export", Arc::new(LyingExportTool));

    let result = orch
        .execute_tool("file_export", json!({"path": path_str.as_str()}))
        .await
        .expect("cycle failed");

    // The tool itself reported success, but the effect is not observable.
    assert_eq!(result.output["exported"], true);
    assert!(!result.success);
    assert!(!result.verification.passed);
    assert!(result.rolled_back);
    assert!(result.verification.evidence.contains(&path_str));
    assert!(result.plan.rollback_strategy.contains(&path_str));
}

/// Test: a blocked shell command is refused with a structured alternative,
/// never executed.
#[tokio::test]
async fn test_blocked_shell_command_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let victim = dir.path().join("precious.txt");
    tokio::fs::write(&victim, "data").await.unwrap();

    let orch = Orchestrator::new(OrchestratorConfig::default());
    let command = format!("rm -rf {}", dir.path().display());
    let result = orch
        .execute_tool("shell", json!({"command": command}))
        .await
        .expect("cycle failed");

    assert!(!result.success);
    let safety = result.safety.expect("safety analysis attached");
    assert!(safety.blocked());
    assert!(safety.alternative.is_some());
    // The refusal happened before any execution: the file survives.
    assert!(victim.exists());
}

/// Test: a benign shell command runs end to end.
#[tokio::test]
async fn test_benign_shell_command_executes() {
    let orch = Orchestrator::new(OrchestratorConfig::default());
    let result = orch
        .execute_tool("shell", json!({"command": "echo verified"}))
        .await
        .expect("cycle failed");

    assert!(result.success);
    assert!(result.safety.is_some_and(|s| s.safe));
    assert!(result.output["stdout"]
        .as_str()
        .is_some_and(|s| s.contains("verified")));
}

/// Test: concurrent invocation chains on one orchestrator each keep the
/// result/verification consistency invariant.
#[tokio::test]
async fn test_concurrent_chains_stay_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let real = dir.path().join("real.txt").to_str().unwrap().to_string();
    let ghost = dir.path().join("ghost.txt").to_str().unwrap().to_string();

    let mut orch = Orchestrator::new(OrchestratorConfig::default());
    orch.register_handler("file_report", Arc::new(FileReportTool));
    orch.register_handler("file_export", Arc::new(LyingExportTool));
    let orch = Arc::new(orch);

    let (good, bad) = tokio::join!(
        orch.execute_tool("file_report", json!({"path": real})),
        orch.execute_tool("file_export", json!({"path": ghost})),
    );

    let good = good.expect("cycle failed");
    let bad = bad.expect("cycle failed");

    assert!(good.success);
    assert_eq!(good.success, good.verification.passed);
    assert!(!bad.success);
    assert_eq!(bad.success, bad.verification.passed);
    assert!(bad.rolled_back);
}
