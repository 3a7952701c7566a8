//! Built-in tool handlers.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::orchestrator::ToolHandler;

/// Runs `args.command` through `sh -c`, capturing stdout, stderr, and the
/// exit code. A non-zero exit is reported as a tool failure.
///
/// Callers are expected to gate commands through the safety analyzer before
/// they reach this handler; the orchestrator does so automatically for any
/// `command` argument.
pub struct ShellTool;

#[async_trait]
impl ToolHandler for ShellTool {
    async fn run(&self, args: &Value) -> Result<Value, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing 'command' argument".to_string())?;

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|err| format!("failed to spawn shell: {err}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            Ok(json!({
                "stdout": stdout,
                "stderr": stderr,
                "exit_code": exit_code,
            }))
        } else {
            Err(format!(
                "command exited with {exit_code}: {}",
                stderr.trim()
            ))
        }
    }
}
