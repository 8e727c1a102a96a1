//! Commitment-accumulator protocol for the shielded balance ledger.
//!
//! This crate contains:
//! - Curve and Pedersen commitment arithmetic, and the Poseidon hash every derivation uses.
//! - Key derivation from a wallet signature and the counter-mode field cipher.
//! - Personal balance commitments and the main accumulator inner/outer split.
//! - Diffie-Hellman transfer notes.
//! - Circuit input maps and the public-input layouts the ledger checks.
//!
//! Everything here is pure; ledger I/O and proving live in the `wallet` crate.

pub mod accumulator;
pub mod cipher;
pub mod constants;
pub mod curve;
pub mod error;
pub mod hash;
pub mod keys;
pub mod layout;
pub mod notes;
pub mod personal;
pub mod types;

pub use accumulator::{AccumulatorPartition, MainAccumulatorState, Opening};
pub use curve::{pedersen_non_hiding, pedersen_positive, Commitment, CurvePoint};
pub use error::ProtocolError;
pub use keys::UserKeys;
pub use layout::{CircuitInputs, CircuitKind, PublicInputs};
pub use notes::EncryptedNote;
pub use personal::PersonalCommitmentState;
pub use types::{Address, Amount, Scalar};
