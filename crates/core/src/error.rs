//! Error types for the workflow engine.

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the workflow engine.
///
/// `InvalidWorkflow` and `NotFound` are returned synchronously from registry
/// operations and never appear inside a `WorkflowResult`. Step-level failures
/// are retried and recorded per step; they only bubble up as `StepFailed` in
/// the result's error summary when a required step exhausts its retries.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Registration input was rejected: empty/duplicate id, dangling edge, or cycle.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// No workflow registered under the given id.
    #[error("workflow {0} not found")]
    NotFound(String),

    /// A step's type tag has no registered executor.
    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    /// A step exhausted its retry budget.
    #[error("step {step_id} failed after {attempts} attempts: {message}")]
    StepFailed {
        step_id: String,
        attempts: u32,
        message: String,
    },

    /// The execution-wide cancellation signal fired.
    #[error("workflow execution cancelled")]
    Cancelled,
}
