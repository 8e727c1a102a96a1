//! Per-user, per-token balance commitments.
//!
//! A state is a pure function of (amount, token, user key hash, first use). It is rebuilt,
//! never mutated, and must match what the circuit recomputes from the same inputs.

use crate::accumulator::Opening;
use crate::curve::{pedersen_non_hiding, Commitment};
use crate::error::{ProtocolError, Result};
use crate::hash::hash;
use crate::keys::UserKeys;
use crate::types::{amount_to_scalar, Address, Amount, Scalar};
use ark_bn254::Fr;
use ark_ff::Zero;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersonalCommitmentState {
    pub tot: Commitment,
    pub inner: Commitment,
    pub outer: Commitment,
    /// Present only on the first use of a token.
    pub initializer: Option<Commitment>,
    pub inner_m: Scalar,
    pub inner_r: Scalar,
    pub outer_m: Scalar,
    pub outer_r: Scalar,
    pub amount: Amount,
    pub token: Address,
    pub first_use: bool,
}

impl PersonalCommitmentState {
    pub fn reconstruct(amount: Amount, token: Address, keys: &UserKeys, first_use: bool) -> Self {
        let ukh = keys.user_key_hash;
        let token_s = token.to_scalar();

        let inner_m = hash(&[amount_to_scalar(amount), ukh]);
        let inner_r = hash(&[token_s, ukh]);
        let inner = pedersen_non_hiding(&inner_m, &inner_r);

        let outer_m = Fr::zero();
        let outer_r = token_s;
        let outer = pedersen_non_hiding(&outer_m, &outer_r);

        let initializer = first_use.then(|| pedersen_non_hiding(&token_s, &ukh));
        let tot = match initializer {
            Some(init) => inner + outer + init,
            None => inner + outer,
        };

        Self {
            tot,
            inner,
            outer,
            initializer,
            inner_m,
            inner_r,
            outer_m,
            outer_r,
            amount,
            token,
            first_use,
        }
    }

    /// This state's opening in the main accumulator once committed at `nonce_commitment`.
    pub fn contribution_opening(&self, nonce_commitment: Scalar) -> Opening {
        Opening::new(self.inner_m, self.inner_r, nonce_commitment)
    }

    /// Check every commitment against its opening and the `tot` invariant.
    pub fn verify(&self, keys: &UserKeys) -> Result<()> {
        let expected = Self::reconstruct(self.amount, self.token, keys, self.first_use);
        if self.inner_m != expected.inner_m || self.inner_r != expected.inner_r {
            return Err(ProtocolError::Consistency(format!(
                "personal inner opening does not derive from (amount {}, token {})",
                self.amount, self.token
            )));
        }
        if self.inner != pedersen_non_hiding(&self.inner_m, &self.inner_r) {
            return Err(ProtocolError::Consistency("personal_c_inner does not match its opening".into()));
        }
        if self.outer != pedersen_non_hiding(&self.outer_m, &self.outer_r) {
            return Err(ProtocolError::Consistency("personal_c_outer does not match its opening".into()));
        }
        if self.initializer != expected.initializer {
            return Err(ProtocolError::Consistency("personal initializer does not match first-use flag".into()));
        }
        let sum = match self.initializer {
            Some(init) => self.inner + self.outer + init,
            None => self.inner + self.outer,
        };
        if self.tot != sum {
            return Err(ProtocolError::Consistency("personal_c_tot != inner + outer [+ initializer]".into()));
        }
        Ok(())
    }
}
