use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Caller-supplied value is missing or malformed.
    #[error("invalid input: {0}")]
    Input(String),

    /// Requested balance state does not exist or cannot support the operation.
    #[error("state error: {0}")]
    State(String),

    /// A commitment does not reconstruct from its claimed opening.
    #[error("consistency check failed: {0}")]
    Consistency(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
