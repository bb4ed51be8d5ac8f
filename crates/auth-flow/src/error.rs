//! Error types for flow failures

/// Why a flow ended in failure.
///
/// User cancellation and a completion without accounts are not errors; they
/// end the flow as `FlowResult::Canceled`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Api(#[from] connections_api::Error),

    #[error("presentation failed: {0}")]
    Presentation(String),
}

impl FlowError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Api(e) => e.kind(),
            FlowError::Presentation(_) => "presentation",
        }
    }
}
