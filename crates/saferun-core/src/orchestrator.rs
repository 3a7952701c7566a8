//! Plan-execute-verify orchestration for tool invocations.
//!
//! For each tool call the [`Orchestrator`] generates an immutable
//! [`ExecutionPlan`], gates any embedded shell command through the
//! [`SafetyAnalyzer`](crate::safety::SafetyAnalyzer), runs the tool handler
//! under a [`SandboxExecutor`](crate::executor::SandboxExecutor) budget, and
//! independently verifies the claimed outcome through the
//! [`SystemValidator`](crate::validator::SystemValidator). The final
//! `success` flag is the verification verdict — the orchestrator never
//! reports success on a failed verification, and it echoes the step-1 plan
//! back unchanged so callers can diff "intended" against "verified".

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::error;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::executor::{IsolationConfig, SandboxExecutor};
use crate::metrics::METRICS;
use crate::obs;
use crate::safety::{Recommendation, SafetyAnalysis, SafetyAnalyzer};
use crate::validator::{SystemValidator, ValidationResult};

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// A single verification check attached to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationCheck {
    File { path: String },
    Port { host: String, port: u16 },
    Endpoint { url: String, expected_status: u16 },
    Process { name: String },
}

/// Declarative description of one tool invocation before it runs.
/// Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub tool_name: String,
    pub args: Value,
    /// Fixed three-step narrative: initialize, execute, verify.
    pub steps: Vec<String>,
    pub expected_outcome: String,
    /// Checks inferred from the tool name; run during verification.
    pub validation_checks: Vec<ValidationCheck>,
    /// How to undo the action's effects. Logged, not executed, when
    /// verification fails.
    pub rollback_strategy: String,
}

/// Pipeline phase for one invocation, in strict order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planned,
    Executing,
    Verifying,
    RollingBack,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planned => "planned",
            Phase::Executing => "executing",
            Phase::Verifying => "verifying",
            Phase::RollingBack => "rolling_back",
            Phase::Done => "done",
        }
    }
}

/// The orchestrator's final answer for one tool invocation.
///
/// Invariant: `success == verification.passed`, always.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedToolResult {
    pub success: bool,
    /// Tool output payload (`null` when the tool never ran).
    pub output: Value,
    /// The plan from step 1, byte-for-byte.
    pub plan: ExecutionPlan,
    /// Aggregate verification verdict.
    pub verification: ValidationResult,
    /// Whether the rollback path was entered (execution succeeded but
    /// verification failed).
    pub rolled_back: bool,
    /// Present when the invocation carried a shell command that was
    /// analyzed; carries the violation list and any alternative.
    pub safety: Option<SafetyAnalysis>,
}

// ---------------------------------------------------------------------------
// Configuration and handlers
// ---------------------------------------------------------------------------

/// Orchestrator-level budgets and policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for one whole action, in milliseconds.
    pub max_time_millis: u64,
    /// Memory-growth budget for one action, in bytes.
    pub max_memory_bytes: u64,
    /// Required `true` to run any command the analyzer flags as
    /// destructive, even at warn level.
    pub confirm_destructive: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_time_millis: 60_000,
            max_memory_bytes: 512 * 1024 * 1024,
            confirm_destructive: false,
        }
    }
}

/// Backend that performs the actual tool work.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool. `Err` is an ordinary tool failure, not a panic path.
    async fn run(&self, args: &Value) -> std::result::Result<Value, String>;
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Plan-execute-verify pipeline root. One instance serves many concurrent
/// invocation chains; the validator cache is the only shared mutable state.
pub struct Orchestrator {
    config: OrchestratorConfig,
    analyzer: SafetyAnalyzer,
    executor: SandboxExecutor,
    validator: SystemValidator,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl Orchestrator {
    /// Orchestrator with a private validator cache and the built-in `shell`
    /// handler registered.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_validator(config, SystemValidator::new())
    }

    /// Orchestrator over an externally wired validator (and therefore an
    /// externally owned cache).
    pub fn with_validator(config: OrchestratorConfig, validator: SystemValidator) -> Self {
        let mut orchestrator = Self {
            config,
            analyzer: SafetyAnalyzer::new(),
            executor: SandboxExecutor::new(),
            validator,
            handlers: HashMap::new(),
        };
        orchestrator.register_handler("shell", Arc::new(crate::tools::ShellTool));
        orchestrator
    }

    /// Register a tool handler under `name`, replacing any prior handler.
    pub fn register_handler(&mut self, name: &str, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Generate the immutable plan for a tool invocation.
    ///
    /// Always emits the fixed three-step narrative plus checks inferred
    /// from substrings of the tool name: "file" attaches a file check on
    /// `args.path`, "api"/"http" an endpoint check on `args.url`,
    /// "docker"/"container" a process check on `args.name`. Keyword
    /// inference trades precision for not needing a tool-registry schema.
    pub fn generate_plan(&self, tool_name: &str, args: &Value) -> ExecutionPlan {
        let name_lc = tool_name.to_lowercase();
        let mut checks = Vec::new();

        if name_lc.contains("file") {
            if let Some(path) = args.get("path").and_then(Value::as_str) {
                checks.push(ValidationCheck::File {
                    path: path.to_string(),
                });
            }
        }
        if name_lc.contains("api") || name_lc.contains("http") {
            if let Some(url) = args.get("url").and_then(Value::as_str) {
                checks.push(ValidationCheck::Endpoint {
                    url: url.to_string(),
                    expected_status: 200,
                });
            }
        }
        if name_lc.contains("docker") || name_lc.contains("container") {
            if let Some(name) = args.get("name").and_then(Value::as_str) {
                checks.push(ValidationCheck::Process {
                    name: name.to_string(),
                });
            }
        }

        let rollback_strategy = rollback_for(&checks, tool_name);

        ExecutionPlan {
            tool_name: tool_name.to_string(),
            args: args.clone(),
            steps: vec![
                format!("initialize {tool_name} invocation"),
                format!("execute {tool_name} with provided arguments"),
                "verify expected outcome against live system state".to_string(),
            ],
            expected_outcome: format!("{tool_name} completes and its claimed effects are observable"),
            validation_checks: checks,
            rollback_strategy,
        }
    }

    /// Run one full plan-execute-verify cycle.
    ///
    /// Returns `Err` only for API misuse (no handler registered under
    /// `tool_name`). Every other failure — safety refusal, resource
    /// violation, probe failure, internal fault — is folded into the
    /// returned result so a single invocation can never crash the host.
    pub async fn execute_tool(&self, tool_name: &str, args: Value) -> Result<VerifiedToolResult> {
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| PipelineError::UnknownTool(tool_name.to_string()))?
            .clone();

        let cycle_id = Uuid::new_v4().to_string();
        let _span = obs::CycleSpan::enter(&cycle_id, tool_name);

        // Phase 1: plan.
        let plan = self.generate_plan(tool_name, &args);
        obs::emit_phase(tool_name, Phase::Planned.as_str());
        obs::emit_plan_generated(tool_name, plan.validation_checks.len());

        // Safety gate over any embedded shell command.
        let safety = args
            .get("command")
            .and_then(Value::as_str)
            .map(|command| {
                METRICS.inc_commands_analyzed();
                self.analyzer.analyze(command)
            });

        if let Some(analysis) = &safety {
            if analysis.recommendation == Recommendation::Block {
                METRICS.inc_commands_blocked();
                let alternative = analysis.alternative.as_deref().unwrap_or_default();
                obs::emit_command_blocked(
                    tool_name,
                    &format!("{:?}", analysis.risk_level),
                    alternative,
                );
                let result = self.refusal(
                    plan,
                    safety.clone(),
                    format!(
                        "command blocked by safety analysis: {}; alternative: {}",
                        join_violations(analysis),
                        alternative
                    ),
                    "blocked by safety analyzer",
                );
                self.finish(tool_name, &result, None);
                return Ok(result);
            }
            if analysis.destructive() && !self.config.confirm_destructive {
                METRICS.inc_commands_blocked();
                let result = self.refusal(
                    plan,
                    safety.clone(),
                    format!(
                        "destructive command requires confirmation: {}",
                        join_violations(analysis)
                    ),
                    "destructive command not confirmed",
                );
                self.finish(tool_name, &result, None);
                return Ok(result);
            }
            if analysis.recommendation == Recommendation::Warn {
                obs::emit_command_warned(tool_name, analysis.violations.len());
            }
        }

        // Phase 2: execute under a real isolation budget.
        obs::emit_phase(tool_name, Phase::Executing.as_str());
        METRICS.inc_executions_run();
        let exec = self.run_handler(handler, args).await;
        let exec = match exec {
            Ok(exec) => exec,
            Err(err) => {
                // Internal fault during execution setup; fold into a failed
                // result rather than propagating.
                error!(event = "cycle.internal_error", tool = %tool_name, error = %err);
                let verification = failed_verification(
                    "Tool execution failed".to_string(),
                    Some(err.to_string()),
                );
                let result = VerifiedToolResult {
                    success: false,
                    output: Value::Null,
                    plan,
                    verification,
                    rolled_back: false,
                    safety,
                };
                self.finish(tool_name, &result, None);
                return Ok(result);
            }
        };
        obs::emit_execution_finished(
            tool_name,
            exec.success,
            exec.exit_code,
            exec.resource_usage.time_millis,
        );
        if exec.exit_code == crate::executor::EXIT_TIMEOUT {
            METRICS.inc_executions_timed_out();
        }

        let output = exec.result.clone().unwrap_or(Value::Null);

        // Step-2 failure short-circuits verification.
        if !exec.success {
            let verification =
                failed_verification("Tool execution failed".to_string(), exec.error.clone());
            obs::emit_verification_finished(tool_name, false, verification.confidence);
            let result = VerifiedToolResult {
                success: false,
                output,
                plan,
                verification,
                rolled_back: false,
                safety,
            };
            self.finish(tool_name, &result, None);
            return Ok(result);
        }

        // Phase 3: verify every planned check against live system state.
        obs::emit_phase(tool_name, Phase::Verifying.as_str());
        let verify_start = Instant::now();
        let probe_results = self.run_checks(&plan.validation_checks).await;
        let verification = aggregate(
            &probe_results,
            verify_start.elapsed().as_millis() as u64,
        );
        obs::emit_verification_finished(tool_name, verification.passed, verification.confidence);

        // Phase 4: rollback logging when the action "worked" but its
        // claimed effects are not observable.
        let rolled_back = !verification.passed;
        let rollback = if rolled_back {
            obs::emit_phase(tool_name, Phase::RollingBack.as_str());
            obs::emit_rollback_triggered(tool_name, &plan.rollback_strategy);
            METRICS.inc_rollbacks_logged();
            Some(plan.rollback_strategy.clone())
        } else {
            None
        };

        let result = VerifiedToolResult {
            success: verification.passed,
            output,
            plan,
            verification,
            rolled_back,
            safety,
        };
        self.finish(tool_name, &result, rollback.as_deref());
        Ok(result)
    }

    async fn run_handler(
        &self,
        handler: Arc<dyn ToolHandler>,
        args: Value,
    ) -> Result<crate::executor::ExecutionResult<Value>> {
        let config = IsolationConfig {
            max_time_millis: self.config.max_time_millis,
            max_memory_bytes: self.config.max_memory_bytes,
            ..IsolationConfig::default()
        };
        let handle = self.executor.create_context(config)?;
        let exec = self
            .executor
            .execute(handle, move || async move {
                // Run the handler on its own task so a panicking tool
                // becomes an ordinary failed execution, never a crashed
                // invocation chain.
                match tokio::spawn(async move { handler.run(&args).await }).await {
                    Ok(result) => result,
                    Err(join_err) => Err(format!("tool handler panicked: {join_err}")),
                }
            })
            .await;
        self.executor.destroy_context(handle);
        exec
    }

    async fn run_checks(&self, checks: &[ValidationCheck]) -> Vec<ValidationResult> {
        let mut probes: Vec<Pin<Box<dyn Future<Output = ValidationResult> + Send + '_>>> =
            Vec::with_capacity(checks.len());
        for check in checks {
            match check {
                ValidationCheck::File { path } => {
                    probes.push(Box::pin(self.validator.check_file(path)));
                }
                ValidationCheck::Port { host, port } => {
                    probes.push(Box::pin(self.validator.check_port(*port, host)));
                }
                ValidationCheck::Endpoint {
                    url,
                    expected_status,
                } => {
                    probes.push(Box::pin(self.validator.check_endpoint(url, *expected_status)));
                }
                ValidationCheck::Process { name } => {
                    probes.push(Box::pin(self.validator.check_process(name)));
                }
            }
        }
        self.validator.run_parallel(probes).await
    }

    fn refusal(
        &self,
        plan: ExecutionPlan,
        safety: Option<SafetyAnalysis>,
        evidence: String,
        error: &str,
    ) -> VerifiedToolResult {
        let output = safety
            .as_ref()
            .and_then(|a| serde_json::to_value(a).ok())
            .unwrap_or(Value::Null);
        VerifiedToolResult {
            success: false,
            output,
            plan,
            verification: failed_verification(evidence, Some(error.to_string())),
            rolled_back: false,
            safety,
        }
    }

    /// Emit the audit record; written on success and failure alike.
    fn finish(&self, tool_name: &str, result: &VerifiedToolResult, rollback: Option<&str>) {
        obs::emit_phase(tool_name, Phase::Done.as_str());
        let plan_json = serde_json::to_string(&result.plan).unwrap_or_default();
        let verification_json = serde_json::to_string(&result.verification).unwrap_or_default();
        obs::emit_cycle_record(
            tool_name,
            result.success,
            &plan_json,
            &verification_json,
            rollback,
        );
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rollback_for(checks: &[ValidationCheck], tool_name: &str) -> String {
    for check in checks {
        match check {
            ValidationCheck::File { path } => {
                return format!("restore previous state of {path} from backup");
            }
            ValidationCheck::Process { name } => {
                return format!("stop and remove {name}, then restart from last known-good state");
            }
            ValidationCheck::Endpoint { url, .. } => {
                return format!("remote call to {url} may need manual compensation; review server-side state");
            }
            ValidationCheck::Port { .. } => {}
        }
    }
    format!("manually review and revert any effects of {tool_name}")
}

fn join_violations(analysis: &SafetyAnalysis) -> String {
    analysis
        .violations
        .iter()
        .map(|v| v.description.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn failed_verification(evidence: String, error: Option<String>) -> ValidationResult {
    ValidationResult {
        passed: false,
        evidence,
        confidence: 100,
        duration_millis: 0,
        timestamp: chrono::Utc::now().to_rfc3339(),
        error,
    }
}

/// Aggregate probe results: all must pass, confidence is the mean, evidence
/// is the joined probe evidence. Zero checks pass trivially at confidence
/// 100.
fn aggregate(results: &[ValidationResult], duration_millis: u64) -> ValidationResult {
    if results.is_empty() {
        return ValidationResult {
            passed: true,
            evidence: "no validation checks required".to_string(),
            confidence: 100,
            duration_millis,
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: None,
        };
    }

    let passed = results.iter().all(|r| r.passed);
    let confidence =
        (results.iter().map(|r| r.confidence as u32).sum::<u32>() / results.len() as u32) as u8;
    let evidence = results
        .iter()
        .map(|r| r.evidence.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    let errors: Vec<&str> = results.iter().filter_map(|r| r.error.as_deref()).collect();

    ValidationResult {
        passed,
        evidence,
        confidence,
        duration_millis,
        timestamp: chrono::Utc::now().to_rfc3339(),
        error: if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopTool;

    #[async_trait]
    impl ToolHandler for NoopTool {
        async fn run(&self, _args: &Value) -> std::result::Result<Value, String> {
            Ok(json!({"done": true}))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolHandler for FailingTool {
        async fn run(&self, _args: &Value) -> std::result::Result<Value, String> {
            Err("backend unavailable".to_string())
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl ToolHandler for PanickingTool {
        async fn run(&self, _args: &Value) -> std::result::Result<Value, String> {
            panic!("tool bug");
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default())
    }

    #[test]
    fn test_plan_infers_file_check_from_name() {
        let orch = orchestrator();
        let plan = orch.generate_plan("file_write", &json!({"path": "/tmp/out.txt"}));
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(
            plan.validation_checks,
            vec![ValidationCheck::File {
                path: "/tmp/out.txt".to_string()
            }]
        );
        assert!(plan.rollback_strategy.contains("/tmp/out.txt"));
    }

    #[test]
    fn test_plan_infers_endpoint_and_process_checks() {
        let orch = orchestrator();

        let plan = orch.generate_plan("api_call", &json!({"url": "http://localhost:8080/x"}));
        assert_eq!(
            plan.validation_checks,
            vec![ValidationCheck::Endpoint {
                url: "http://localhost:8080/x".to_string(),
                expected_status: 200
            }]
        );

        let plan = orch.generate_plan("docker_start", &json!({"name": "redis"}));
        assert_eq!(
            plan.validation_checks,
            vec![ValidationCheck::Process {
                name: "redis".to_string()
            }]
        );
    }

    #[test]
    fn test_plan_without_keywords_has_no_checks() {
        let orch = orchestrator();
        let plan = orch.generate_plan("compute", &json!({}));
        assert!(plan.validation_checks.is_empty());
        assert!(plan.rollback_strategy.contains("compute"));
    }

    #[test]
    fn test_plan_generation_is_deterministic() {
        let orch = orchestrator();
        let args = json!({"path": "/tmp/x"});
        assert_eq!(
            orch.generate_plan("file_write", &args),
            orch.generate_plan("file_write", &args)
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_api_misuse() {
        let orch = orchestrator();
        let err = orch.execute_tool("no_such_tool", json!({})).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_result_plan_matches_standalone_plan() {
        let mut orch = orchestrator();
        orch.register_handler("compute", Arc::new(NoopTool));

        let args = json!({"input": 7});
        let standalone = orch.generate_plan("compute", &args);
        let result = orch.execute_tool("compute", args).await.unwrap();

        assert_eq!(result.plan, standalone);
    }

    #[tokio::test]
    async fn test_success_equals_verification_passed() {
        let mut orch = orchestrator();
        orch.register_handler("compute", Arc::new(NoopTool));
        orch.register_handler("broken", Arc::new(FailingTool));

        let ok = orch.execute_tool("compute", json!({})).await.unwrap();
        assert_eq!(ok.success, ok.verification.passed);
        assert!(ok.success);

        let bad = orch.execute_tool("broken", json!({})).await.unwrap();
        assert_eq!(bad.success, bad.verification.passed);
        assert!(!bad.success);
    }

    #[tokio::test]
    async fn test_execution_failure_short_circuits_verification() {
        let mut orch = orchestrator();
        orch.register_handler("broken", Arc::new(FailingTool));

        let result = orch.execute_tool("broken", json!({})).await.unwrap();
        assert!(!result.success);
        assert!(!result.rolled_back);
        assert_eq!(result.verification.evidence, "Tool execution failed");
        assert_eq!(result.verification.confidence, 100);
        assert!(result
            .verification
            .error
            .as_deref()
            .is_some_and(|e| e.contains("backend unavailable")));
    }

    #[tokio::test]
    async fn test_panicking_tool_becomes_failed_result() {
        let mut orch = orchestrator();
        orch.register_handler("buggy", Arc::new(PanickingTool));

        let result = orch.execute_tool("buggy", json!({})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.verification.evidence, "Tool execution failed");
    }

    #[tokio::test]
    async fn test_claimed_but_unobservable_effect_rolls_back() {
        // Tool name says "file" but the handler never creates the file, so
        // verification must fail and the rollback path must be entered.
        let mut orch = orchestrator();
        orch.register_handler("file_touch", Arc::new(NoopTool));

        let result = orch
            .execute_tool("file_touch", json!({"path": "/definitely/missing/claimed.txt"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.rolled_back);
        assert!(!result.verification.passed);
        assert!(result
            .verification
            .evidence
            .contains("/definitely/missing/claimed.txt"));
    }

    #[tokio::test]
    async fn test_blocked_command_yields_structured_refusal() {
        let orch = orchestrator();
        let result = orch
            .execute_tool("shell", json!({"command": "rm -rf /tmp/test"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.success, result.verification.passed);
        assert!(!result.rolled_back);
        let safety = result.safety.expect("analysis must be attached");
        assert!(safety.blocked());
        assert!(safety.alternative.is_some());
        assert!(result.verification.evidence.contains("blocked"));
    }

    #[tokio::test]
    async fn test_destructive_warn_requires_confirmation() {
        // "rm -f" alone is a single high violation: warn level, but still
        // destructive, so it must be refused without confirm_destructive.
        let orch = orchestrator();
        let result = orch
            .execute_tool("shell", json!({"command": "echo x && rm -f /tmp/saferun-nothing"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result
            .verification
            .evidence
            .contains("requires confirmation"));

        let confirmed = Orchestrator::new(OrchestratorConfig {
            confirm_destructive: true,
            ..OrchestratorConfig::default()
        });
        let result = confirmed
            .execute_tool("shell", json!({"command": "echo x && rm -f /tmp/saferun-nothing"}))
            .await
            .unwrap();
        assert!(result.success, "evidence: {}", result.verification.evidence);
    }

    #[test]
    fn test_aggregate_of_zero_checks_passes() {
        let agg = aggregate(&[], 3);
        assert!(agg.passed);
        assert_eq!(agg.confidence, 100);
        assert_eq!(agg.evidence, "no validation checks required");
    }

    #[test]
    fn test_aggregate_mixes_confidence_and_joins_evidence() {
        let mk = |passed: bool, confidence: u8, evidence: &str, error: Option<&str>| {
            ValidationResult {
                passed,
                evidence: evidence.to_string(),
                confidence,
                duration_millis: 1,
                timestamp: chrono::Utc::now().to_rfc3339(),
                error: error.map(str::to_string),
            }
        };

        let agg = aggregate(
            &[
                mk(true, 100, "file /a exists", None),
                mk(false, 90, "process b is not running", Some("not found")),
            ],
            7,
        );
        assert!(!agg.passed);
        assert_eq!(agg.confidence, 95);
        assert!(agg.evidence.contains("file /a exists"));
        assert!(agg.evidence.contains("process b is not running"));
        assert!(agg.error.as_deref().is_some_and(|e| e.contains("not found")));
    }
}
