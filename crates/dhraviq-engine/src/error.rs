use dhraviq_core::ValidationError;

/// Faults the orchestrator surfaces to its caller. Generation, storage and
/// notification faults are absorbed before this point.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{dependency} unavailable: {reason}")]
    DependencyUnavailable {
        dependency: &'static str,
        reason: String,
    },
}
