//! Error taxonomy for the analysis pipeline.
//!
//! The batcher, the batch analyzer adapter, the aggregator and the
//! pipeline driver return [`PipelineError`]. Outer layers (CLI, store,
//! server) work with `anyhow::Result` and wrap these where needed.
//!
//! No variant is retried by the pipeline itself. Any failure aborts the
//! whole run and discards the batch results gathered so far.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// There were no records to batch. Raised before any network call.
    #[error("no feedback records to analyze")]
    EmptyInput,

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// The analysis backend could not be reached or answered with an error status.
    #[error("batch {batch}: transport error: {message}")]
    Transport { batch: usize, message: String },

    /// The backend answered, but no JSON object could be found in the reply.
    #[error("batch {batch}: malformed response: {detail}")]
    MalformedResponse { batch: usize, detail: String },

    /// A JSON object was found but required fields are absent or mistyped.
    #[error("batch {batch}: response does not match the batch schema: {detail}")]
    SchemaViolation { batch: usize, detail: String },

    /// Batch results are internally inconsistent and cannot be merged.
    #[error("aggregation failed: {0}")]
    Aggregation(String),
}

impl PipelineError {
    /// Whether re-submitting the same input could succeed.
    ///
    /// Backend failures are worth another attempt; empty input and
    /// inconsistent merges are not.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            PipelineError::Transport { .. }
                | PipelineError::MalformedResponse { .. }
                | PipelineError::SchemaViolation { .. }
        )
    }

    /// Zero-based batch index the error refers to, if any.
    pub fn batch(&self) -> Option<usize> {
        match self {
            PipelineError::Transport { batch, .. }
            | PipelineError::MalformedResponse { batch, .. }
            | PipelineError::SchemaViolation { batch, .. } => Some(*batch),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failures_are_retryable() {
        let err = PipelineError::Transport {
            batch: 2,
            message: "connection reset".to_string(),
        };
        assert!(err.is_retryable_by_caller());
        assert_eq!(err.batch(), Some(2));
        assert_eq!(
            err.to_string(),
            "batch 2: transport error: connection reset"
        );
    }

    #[test]
    fn input_and_merge_failures_are_not_retryable() {
        assert!(!PipelineError::EmptyInput.is_retryable_by_caller());
        assert!(!PipelineError::Aggregation("x".into()).is_retryable_by_caller());
        assert_eq!(PipelineError::EmptyInput.batch(), None);
    }
}
