//! Key derivation from a wallet signature.

use crate::constants::{SIGNATURE_CHUNKS, SIGNATURE_LEN, VIEW_DOMAIN};
use crate::curve::CurvePoint;
use crate::error::{ProtocolError, Result};
use crate::hash::{domain_tag, hash};
use crate::types::Scalar;
use ark_bn254::Fr;
use ark_ff::PrimeField;
use std::fmt;

/// Session keys. Re-derivable from the same signature at any time, so nothing here is persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct UserKeys {
    /// Spending secret.
    pub user_key: Scalar,
    pub user_key_hash: Scalar,
    /// Decrypts stored openings without spending authority.
    pub view_key: Scalar,
    /// Receive address (zkAddress).
    pub public_key: CurvePoint,
}

impl UserKeys {
    /// Derive keys from a 65-byte signature over `KEY_DERIVATION_MESSAGE`.
    pub fn from_signature(signature: &[u8]) -> Result<Self> {
        if signature.len() != SIGNATURE_LEN {
            return Err(ProtocolError::Input(format!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                signature.len()
            )));
        }

        let mut chunks = [Fr::from(0u64); 3];
        let mut offset = 0;
        for (chunk, width) in chunks.iter_mut().zip(SIGNATURE_CHUNKS) {
            *chunk = Fr::from_be_bytes_mod_order(&signature[offset..offset + width]);
            offset += width;
        }

        Ok(Self::from_user_key(hash(&chunks)))
    }

    pub fn from_user_key(user_key: Scalar) -> Self {
        let user_key_hash = hash(&[user_key]);
        let view_key = hash(&[domain_tag(VIEW_DOMAIN), user_key_hash]);
        let public_key = CurvePoint::generator().mul(&user_key);
        Self {
            user_key,
            user_key_hash,
            view_key,
            public_key,
        }
    }

    /// Chain-visible pointer for "state after operation #nonce".
    pub fn nonce_commitment(&self, nonce: u64) -> Scalar {
        nonce_commitment(&self.user_key_hash, nonce)
    }

    /// Per-nonce key for the counter-mode cipher.
    pub fn encryption_key(&self, nonce: u64) -> Scalar {
        hash(&[self.view_key, Fr::from(nonce)])
    }

    pub fn zk_address(&self) -> String {
        self.public_key.to_hex()
    }
}

pub fn nonce_commitment(user_key_hash: &Scalar, nonce: u64) -> Scalar {
    hash(&[*user_key_hash, Fr::from(nonce)])
}

impl fmt::Debug for UserKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserKeys")
            .field("zk_address", &self.zk_address())
            .finish_non_exhaustive()
    }
}
