/// Failure categories the fallback ladder distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SchemaViolation,
    SafetyRejection,
    NonPortableText,
    ExecutionFailed,
    Timeout,
    EnvironmentUnavailable,
    Provider,
}

/// Every failure a pipeline stage can report.
///
/// None of these escape the request boundary: the orchestrator folds them
/// into a retry or a placeholder image.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagramError {
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Safety rejection: {0}")]
    SafetyRejection(String),

    #[error("Non-portable characters in generated source: {0}")]
    NonPortableText(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timed out after {seconds}s: {stage}")]
    Timeout { stage: String, seconds: u64 },

    #[error("Environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl DiagramError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DiagramError::SchemaViolation(_) => FailureKind::SchemaViolation,
            DiagramError::SafetyRejection(_) => FailureKind::SafetyRejection,
            DiagramError::NonPortableText(_) => FailureKind::NonPortableText,
            DiagramError::ExecutionFailed(_) => FailureKind::ExecutionFailed,
            DiagramError::Timeout { .. } => FailureKind::Timeout,
            DiagramError::EnvironmentUnavailable(_) => FailureKind::EnvironmentUnavailable,
            DiagramError::Provider(_) => FailureKind::Provider,
        }
    }

    pub fn timeout(stage: impl Into<String>, seconds: u64) -> Self {
        DiagramError::Timeout {
            stage: stage.into(),
            seconds,
        }
    }

    /// Short reason suitable for a placeholder caption.
    pub fn short_reason(&self) -> String {
        let full = self.to_string();
        let first_line = full.lines().next().unwrap_or_default();
        if first_line.chars().count() > 160 {
            let truncated: String = first_line.chars().take(157).collect();
            format!("{truncated}...")
        } else {
            first_line.to_string()
        }
    }
}
