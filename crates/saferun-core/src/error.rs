//! Error taxonomy for the execution pipeline.
//!
//! Expected external failures (missing file, refused connection, probe
//! timeout) are *values* carried inside result structs, never `Err`. The
//! variants here are reserved for API misuse and genuinely unexpected
//! internal faults.

/// Errors produced by the execution pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no handler registered for tool: {0}")]
    UnknownTool(String),

    #[error("unknown isolation context: {0}")]
    UnknownContext(uuid::Uuid),

    #[error("context {0} already has an execution in flight")]
    ContextBusy(uuid::Uuid),

    #[error("invalid isolation config: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_subject() {
        let err = PipelineError::UnknownTool("disk_format".to_string());
        assert!(err.to_string().contains("disk_format"));

        let id = uuid::Uuid::new_v4();
        let err = PipelineError::UnknownContext(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
