use thiserror::Error;
use zk_ledger::{CircuitKind, ProtocolError};

#[derive(Debug, Error)]
pub enum WalletError {
    /// Missing or malformed caller-supplied field.
    #[error("invalid input: {0}")]
    Input(String),

    /// No balance entry, uninitialized account, insufficient funds, discovery cap.
    #[error("state error: {0}")]
    State(String),

    /// A derived or decrypted opening failed to reconstruct its commitment.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Ledger read failure or submission revert. Never retried.
    #[error("ledger error: {0}")]
    Chain(String),

    /// Circuit execution or proving failure, surfaced verbatim.
    #[error("proof error: {0}")]
    Proof(String),

    #[error("{kind} proof carries {got} public inputs, expected {expected}")]
    PublicInputCount {
        kind: CircuitKind,
        expected: usize,
        got: usize,
    },

    #[error("account cache error: {0}")]
    Cache(String),
}

impl From<ProtocolError> for WalletError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Input(m) => WalletError::Input(m),
            ProtocolError::State(m) => WalletError::State(m),
            ProtocolError::Consistency(m) => WalletError::Consistency(m),
        }
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::Cache(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Cache(format!("serialization: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
