//! The protocol's single hash primitive.
//!
//! Every derivation (keys, nonce commitments, keystream, generators) goes through
//! [`hash`], so the return type is pinned to [`Scalar`] here and nowhere else.

use crate::constants::poseidon_config;
use crate::types::Scalar;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::PrimeField;

/// Poseidon over BN254::Fr, length-prefixed so `[a]` and `[a, 0]` never collide.
pub fn hash(inputs: &[Scalar]) -> Scalar {
    let mut sponge = PoseidonSponge::<Fr>::new(poseidon_config());
    sponge.absorb(&Fr::from(inputs.len() as u64));
    for input in inputs {
        sponge.absorb(input);
    }
    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    out[0]
}

/// Interpret a short ASCII tag as a field element.
pub fn domain_tag(tag: &[u8]) -> Scalar {
    Fr::from_be_bytes_mod_order(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = Fr::from(42u64);
        let b = Fr::from(123u64);
        assert_eq!(hash(&[a, b]), hash(&[a, b]));
    }

    #[test]
    fn hash_separates_inputs() {
        let one = Fr::from(1u64);
        assert_ne!(hash(&[one, Fr::from(2u64)]), hash(&[one, Fr::from(3u64)]));
        assert_ne!(hash(&[one, Fr::from(2u64)]), hash(&[Fr::from(2u64), one]));
    }

    #[test]
    fn length_prefix_prevents_padding_collisions() {
        let a = Fr::from(7u64);
        assert_ne!(hash(&[a]), hash(&[a, Fr::from(0u64)]));
        assert_ne!(hash(&[]), hash(&[Fr::from(0u64)]));
    }
}
