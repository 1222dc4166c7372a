use thiserror::Error;

/// Failures raised while scoring or deciding nudges for a single request.
#[derive(Debug, Error)]
pub enum NudgeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} model is not loaded")]
    ModelUnavailable(&'static str),

    #[error("buddies_attending_events is empty")]
    EmptyListAccess,

    #[error("model expects {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },
}

pub type Result<T, E = NudgeError> = std::result::Result<T, E>;
