use thiserror::Error;

/// Errors raised while building templates, filling the matrices, or scoring mutations.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The transition model has no coefficients for this dinucleotide.
    #[error("no transition parameters for the context {context:?}")]
    UnknownContext { context: String },
    /// Forward and backward likelihoods disagree even after re-filling.
    #[error("alpha ({alpha:.5}) and beta ({beta:.5}) disagree after {flip_flops} flip-flops")]
    AlphaBetaMismatch {
        alpha: f64,
        beta: f64,
        flip_flops: usize,
    },
    #[error("unsupported edit: {0}")]
    UnsupportedEdit(String),
    /// The edit touches both pinned ends, so no unmutated boundary is left to link against.
    #[error("template of length {length} is too small for incremental scoring")]
    TemplateTooSmall { length: usize },
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
}

impl ScoringError {
    /// Data-dependent failures a caller may recover from by skipping a read or an edit.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScoringError::AlphaBetaMismatch { .. } | ScoringError::TemplateTooSmall { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScoringError>;
