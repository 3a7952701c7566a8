//! Saferun Core Library
//!
//! Safety-gated, verified execution pipeline for autonomous agents: decides
//! whether a requested action is safe to run, runs it under a resource
//! budget, and independently verifies the claimed outcome before the caller
//! may treat the action as done.
//!
//! Four components compose one call chain:
//!
//! - [`safety`] — classifies command strings against known-dangerous patterns
//! - [`executor`] — runs units of work under time/memory budgets
//! - [`validator`] — probes live system state with caching and timeouts
//! - [`orchestrator`] — plan → safety gate → execute → verify → rollback log

pub mod error;
pub mod executor;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod safety;
pub mod telemetry;
pub mod tools;
pub mod validator;

pub use error::{PipelineError, Result};

pub use safety::{
    suggest_alternative, Recommendation, RiskLevel, SafetyAnalysis, SafetyAnalyzer, Severity,
    Violation, ViolationKind,
};

pub use executor::{
    ContextHandle, ExecutionResult, IsolationConfig, ResourceUsage, SandboxExecutor,
    EXIT_CANCELLED, EXIT_ERROR, EXIT_MEMORY, EXIT_TIMEOUT,
};

pub use validator::{
    SystemValidator, ValidationCache, ValidationResult, CACHE_TTL_MS, PROBE_TIMEOUT_MS,
};

pub use orchestrator::{
    ExecutionPlan, Orchestrator, OrchestratorConfig, Phase, ToolHandler, ValidationCheck,
    VerifiedToolResult,
};

pub use tools::ShellTool;

pub use metrics::METRICS;
pub use obs::CycleSpan;
pub use telemetry::init_tracing;

/// Saferun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
