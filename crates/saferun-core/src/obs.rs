//! Structured observability hooks for orchestrator cycle lifecycle events.
//!
//! This module provides:
//! - Cycle-scoped tracing spans via the `CycleSpan` RAII guard
//! - Emission functions for the plan/execute/verify lifecycle
//! - The per-cycle audit record consumed by external activity-log writers
//!
//! Events are emitted at `info!` level; set `RUST_LOG` to adjust.

use tracing::{info, warn};

/// RAII guard that enters a cycle-scoped tracing span for one tool
/// invocation. All tracing calls inside the guard's lifetime carry the
/// cycle id and tool name.
pub struct CycleSpan {
    _span: tracing::span::EnteredSpan,
}

impl CycleSpan {
    /// Create and enter a span tagged with the cycle id and tool name.
    pub fn enter(cycle_id: &str, tool_name: &str) -> Self {
        let span = tracing::info_span!("saferun.cycle", cycle_id = %cycle_id, tool = %tool_name);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a plan was generated for a tool invocation.
pub fn emit_plan_generated(tool_name: &str, check_count: usize) {
    info!(event = "cycle.plan_generated", tool = %tool_name, checks = check_count);
}

/// Emit event: the pipeline moved to a new phase.
pub fn emit_phase(tool_name: &str, phase: &str) {
    info!(event = "cycle.phase", tool = %tool_name, phase = %phase);
}

/// Emit event: a command was refused by the safety gate.
pub fn emit_command_blocked(tool_name: &str, risk_level: &str, alternative: &str) {
    warn!(
        event = "cycle.command_blocked",
        tool = %tool_name,
        risk_level = %risk_level,
        alternative = %alternative,
    );
}

/// Emit event: a warn-level command proceeded; its violations are logged.
pub fn emit_command_warned(tool_name: &str, violations: usize) {
    warn!(event = "cycle.command_warned", tool = %tool_name, violations = violations);
}

/// Emit event: the execution step finished.
pub fn emit_execution_finished(tool_name: &str, success: bool, exit_code: i32, time_ms: u64) {
    info!(
        event = "cycle.execution_finished",
        tool = %tool_name,
        success = success,
        exit_code = exit_code,
        time_ms = time_ms,
    );
}

/// Emit event: verification finished with an aggregate verdict.
pub fn emit_verification_finished(tool_name: &str, passed: bool, confidence: u8) {
    info!(
        event = "cycle.verification_finished",
        tool = %tool_name,
        passed = passed,
        confidence = confidence,
    );
}

/// Emit event: execution succeeded but verification failed; the rollback
/// strategy is logged (not executed).
pub fn emit_rollback_triggered(tool_name: &str, strategy: &str) {
    warn!(event = "cycle.rollback_triggered", tool = %tool_name, strategy = %strategy);
}

/// Emit the per-cycle audit record: the plan, the aggregate verification,
/// and the rollback strategy when one was triggered. Written on success and
/// failure alike — this is the sole audit trail.
pub fn emit_cycle_record(
    tool_name: &str,
    success: bool,
    plan_json: &str,
    verification_json: &str,
    rollback: Option<&str>,
) {
    info!(
        event = "cycle.record",
        tool = %tool_name,
        success = success,
        plan = %plan_json,
        verification = %verification_json,
        rollback = rollback.unwrap_or(""),
    );
}
