//! Resource-bounded execution of arbitrary units of work.
//!
//! A [`SandboxExecutor`] hands out [`ContextHandle`]s, each carrying an
//! [`IsolationConfig`] budget. [`SandboxExecutor::execute`] races the work
//! future against the context's time budget and cancellation signal, then
//! normalizes every outcome — success, timeout, memory ceiling, cancellation,
//! work error — into the same self-describing [`ExecutionResult`] shape so
//! callers never special-case "how did this fail".
//!
//! This is budget enforcement, not OS-level sandboxing: no namespaces,
//! cgroups, or seccomp.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Exit code reported when the time budget is exceeded.
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code reported when the memory budget is exceeded.
pub const EXIT_MEMORY: i32 = 137;
/// Exit code reported when the context is destroyed mid-execution.
pub const EXIT_CANCELLED: i32 = 143;
/// Exit code reported when the work itself fails.
pub const EXIT_ERROR: i32 = 1;

// ---------------------------------------------------------------------------
// Configuration and handles
// ---------------------------------------------------------------------------

/// Resource contract for one execution. Created by the caller, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolationConfig {
    /// Advisory CPU ceiling in percent. Accounting is best-effort and never
    /// affects the pass/fail decision.
    pub max_cpu_percent: f64,
    /// Memory growth ceiling in bytes.
    pub max_memory_bytes: u64,
    /// Wall-clock budget in milliseconds.
    pub max_time_millis: u64,
    /// Paths the work is expected to stay within (advisory).
    pub allowed_paths: BTreeSet<String>,
    /// Networks the work is expected to stay within (advisory).
    pub allowed_networks: BTreeSet<String>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: 100.0,
            max_memory_bytes: 512 * 1024 * 1024,
            max_time_millis: 60_000,
            allowed_paths: BTreeSet::new(),
            allowed_networks: BTreeSet::new(),
        }
    }
}

impl IsolationConfig {
    /// Reject nonsensical budgets. Zero time or zero memory can never pass.
    pub fn validate(&self) -> Result<()> {
        if self.max_time_millis == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_time_millis must be > 0".to_string(),
            ));
        }
        if self.max_memory_bytes == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_memory_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Opaque identifier for one active isolation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle(Uuid);

impl std::fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct ContextState {
    config: IsolationConfig,
    cancel_tx: watch::Sender<bool>,
    in_flight: bool,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Observed resource consumption for one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    /// Best-effort CPU utilization in percent (0 when unmeasurable).
    pub cpu_percent: f64,
    /// Best-effort resident-set growth in bytes (0 when unmeasurable).
    pub memory_bytes: u64,
    /// Wall-clock time in milliseconds.
    pub time_millis: u64,
}

/// Outcome of running one unit of work under a budget.
///
/// Invariant: `success` holds iff no error occurred and both the time and
/// memory budgets were respected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub resource_usage: ResourceUsage,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs units of work under per-context time and memory budgets.
///
/// Contexts are cheap bookkeeping entries; `create_context` performs no work.
/// At most one execution may be active per handle at a time. Destroying a
/// handle mid-execution requests cancellation and returns immediately.
#[derive(Default)]
pub struct SandboxExecutor {
    contexts: Mutex<HashMap<ContextHandle, ContextState>>,
}

impl SandboxExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate bookkeeping for one execution under `config`.
    pub fn create_context(&self, config: IsolationConfig) -> Result<ContextHandle> {
        config.validate()?;
        let handle = ContextHandle(Uuid::new_v4());
        let (cancel_tx, _) = watch::channel(false);
        let state = ContextState {
            config,
            cancel_tx,
            in_flight: false,
        };
        self.contexts
            .lock()
            .expect("context table poisoned")
            .insert(handle, state);
        debug!(event = "executor.context_created", handle = %handle);
        Ok(handle)
    }

    /// Run `work` under the context's budget.
    ///
    /// The work future is raced against the time budget and the context's
    /// cancellation signal. On timeout the work's eventual result is
    /// discarded and the result carries exit code 124; on cancellation, 143;
    /// on work error, 1 with the message captured into `stderr`. After
    /// completion the resident-set delta is checked against the memory
    /// budget and, when exceeded, forces failure with exit code 137 even if
    /// the work itself succeeded.
    ///
    /// Returns `Err` only for API misuse: an unknown handle or a handle
    /// that already has an execution in flight.
    pub async fn execute<T, F, Fut>(
        &self,
        handle: ContextHandle,
        work: F,
    ) -> Result<ExecutionResult<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, String>>,
    {
        let (config, mut cancel_rx) = {
            let mut contexts = self.contexts.lock().expect("context table poisoned");
            let state = contexts
                .get_mut(&handle)
                .ok_or(PipelineError::UnknownContext(handle.0))?;
            if state.in_flight {
                return Err(PipelineError::ContextBusy(handle.0));
            }
            state.in_flight = true;
            (state.config.clone(), state.cancel_tx.subscribe())
        };

        let start = Instant::now();
        let rss_before = sample_rss_bytes().unwrap_or(0);
        let cpu_before = sample_cpu_millis().unwrap_or(0);
        let budget = Duration::from_millis(config.max_time_millis);

        let outcome = tokio::select! {
            res = work() => Outcome::Finished(res),
            _ = tokio::time::sleep(budget) => Outcome::TimedOut,
            _ = cancelled(&mut cancel_rx) => Outcome::Cancelled,
        };

        let time_millis = start.elapsed().as_millis() as u64;
        let rss_after = sample_rss_bytes().unwrap_or(rss_before);
        let cpu_after = sample_cpu_millis().unwrap_or(cpu_before);
        let memory_bytes = rss_after.saturating_sub(rss_before);
        let cpu_percent = if time_millis > 0 {
            (cpu_after.saturating_sub(cpu_before) as f64 / time_millis as f64) * 100.0
        } else {
            0.0
        };
        let resource_usage = ResourceUsage {
            cpu_percent,
            memory_bytes,
            time_millis,
        };

        if let Some(state) = self
            .contexts
            .lock()
            .expect("context table poisoned")
            .get_mut(&handle)
        {
            state.in_flight = false;
        }

        let mut result = match outcome {
            Outcome::Finished(Ok(value)) => ExecutionResult {
                success: true,
                result: Some(value),
                error: None,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
                resource_usage,
            },
            Outcome::Finished(Err(message)) => ExecutionResult {
                success: false,
                result: None,
                error: Some(message.clone()),
                stdout: String::new(),
                stderr: message,
                exit_code: EXIT_ERROR,
                resource_usage,
            },
            Outcome::TimedOut => {
                warn!(
                    event = "executor.timeout",
                    handle = %handle,
                    limit_ms = config.max_time_millis,
                );
                ExecutionResult {
                    success: false,
                    result: None,
                    error: Some(format!(
                        "time limit exceeded: {}ms budget",
                        config.max_time_millis
                    )),
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: EXIT_TIMEOUT,
                    resource_usage,
                }
            }
            Outcome::Cancelled => {
                warn!(event = "executor.cancelled", handle = %handle);
                ExecutionResult {
                    success: false,
                    result: None,
                    error: Some("execution cancelled: context destroyed".to_string()),
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: EXIT_CANCELLED,
                    resource_usage,
                }
            }
        };

        // Memory ceiling overrides an otherwise-successful outcome. CPU is
        // advisory only and never flips the verdict.
        if result.success && memory_bytes > config.max_memory_bytes {
            warn!(
                event = "executor.memory_exceeded",
                handle = %handle,
                used_bytes = memory_bytes,
                limit_bytes = config.max_memory_bytes,
            );
            result.success = false;
            result.exit_code = EXIT_MEMORY;
            result.error = Some(format!(
                "memory limit exceeded: used {} bytes of {} allowed",
                memory_bytes, config.max_memory_bytes
            ));
        }

        Ok(result)
    }

    /// Tear down a context. Idempotent: destroying an unknown or
    /// already-destroyed handle is a no-op. An in-flight execution is asked
    /// to cancel; this call never blocks on it.
    pub fn destroy_context(&self, handle: ContextHandle) {
        let removed = self
            .contexts
            .lock()
            .expect("context table poisoned")
            .remove(&handle);
        if let Some(state) = removed {
            if state.in_flight {
                let _ = state.cancel_tx.send(true);
            }
            debug!(event = "executor.context_destroyed", handle = %handle);
        }
    }

    /// Number of live contexts (for diagnostics).
    pub fn context_count(&self) -> usize {
        self.contexts.lock().expect("context table poisoned").len()
    }
}

enum Outcome<T> {
    Finished(std::result::Result<T, String>),
    TimedOut,
    Cancelled,
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without signalling; treat as never-cancelled.
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Best-effort /proc sampling (zero on platforms without procfs)
// ---------------------------------------------------------------------------

fn sample_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

fn sample_cpu_millis() -> Option<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // Fields after the parenthesized comm; utime and stime are fields 14
    // and 15 of the full line, i.e. 11 and 12 past the comm.
    let rest = stat.rsplit(')').next()?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    // Clock ticks are 1/100 s on every mainstream Linux configuration.
    Some((utime + stime) * 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_work_passes_through() {
        let executor = SandboxExecutor::new();
        let handle = executor.create_context(IsolationConfig::default()).unwrap();

        let result = executor
            .execute(handle, || async { Ok::<_, String>(41 + 1) })
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.result, Some(42));
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
        executor.destroy_context(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_exit_124() {
        let executor = SandboxExecutor::new();
        let config = IsolationConfig {
            max_time_millis: 100,
            ..IsolationConfig::default()
        };
        let handle = executor.create_context(config).unwrap();

        let result = executor
            .execute(handle, || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, EXIT_TIMEOUT);
        assert!(result.resource_usage.time_millis >= 100);
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("time limit exceeded")));
    }

    #[tokio::test]
    async fn test_work_error_captured_into_stderr() {
        let executor = SandboxExecutor::new();
        let handle = executor.create_context(IsolationConfig::default()).unwrap();

        let result: ExecutionResult<()> = executor
            .execute(handle, || async { Err("disk on fire".to_string()) })
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, EXIT_ERROR);
        assert!(result.stderr.contains("disk on fire"));
        assert!(result.error.as_deref().is_some_and(|e| e.contains("disk on fire")));
    }

    #[tokio::test]
    async fn test_memory_ceiling_overrides_success() {
        let executor = SandboxExecutor::new();
        let config = IsolationConfig {
            max_memory_bytes: 8 * 1024 * 1024,
            ..IsolationConfig::default()
        };
        let handle = executor.create_context(config).unwrap();

        // Allocate and touch well past the 8 MiB ceiling; keep the buffer
        // alive through the post-execution sample by returning it.
        let result = executor
            .execute(handle, || async {
                let mut buf = vec![0u8; 64 * 1024 * 1024];
                for chunk in buf.chunks_mut(4096) {
                    chunk[0] = 1;
                }
                Ok::<_, String>(buf)
            })
            .await
            .unwrap();

        if result.resource_usage.memory_bytes > 0 {
            assert!(!result.success);
            assert_eq!(result.exit_code, EXIT_MEMORY);
        }
        // On platforms without procfs the delta reads 0 and the ceiling
        // cannot be enforced; that is the documented best-effort contract.
    }

    #[tokio::test]
    async fn test_execute_on_destroyed_handle_is_api_misuse() {
        let executor = SandboxExecutor::new();
        let handle = executor.create_context(IsolationConfig::default()).unwrap();
        executor.destroy_context(handle);

        let err = executor
            .execute(handle, || async { Ok::<_, String>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownContext(_)));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let executor = SandboxExecutor::new();
        let handle = executor.create_context(IsolationConfig::default()).unwrap();
        executor.destroy_context(handle);
        executor.destroy_context(handle);
        assert_eq!(executor.context_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_mid_flight_cancels_with_143() {
        let executor = std::sync::Arc::new(SandboxExecutor::new());
        let handle = executor.create_context(IsolationConfig::default()).unwrap();

        let exec = executor.clone();
        let task = tokio::spawn(async move {
            exec.execute(handle, || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, String>(())
            })
            .await
        });

        // Let the execution reach its suspension point, then pull the rug.
        tokio::time::sleep(Duration::from_millis(10)).await;
        executor.destroy_context(handle);

        let result = task.await.unwrap().unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, EXIT_CANCELLED);
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("cancelled")));
    }

    #[tokio::test]
    async fn test_zero_time_budget_rejected() {
        let executor = SandboxExecutor::new();
        let config = IsolationConfig {
            max_time_millis: 0,
            ..IsolationConfig::default()
        };
        assert!(matches!(
            executor.create_context(config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_isolation_config_defaults() {
        let config = IsolationConfig::default();
        assert_eq!(config.max_time_millis, 60_000);
        assert_eq!(config.max_memory_bytes, 512 * 1024 * 1024);
    }

    #[test]
    fn test_isolation_config_serde_roundtrip() {
        let config = IsolationConfig {
            max_time_millis: 5000,
            ..IsolationConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: IsolationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
