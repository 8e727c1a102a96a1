//! Additive counter-mode stream cipher over the scalar field.
//!
//! `encrypt(v, k, c) = v + hash(k, c)`. Unauthenticated: a wrong key or counter gives a
//! valid-looking wrong element. Callers detect that through commitment reconstruction.

use crate::hash::hash;
use crate::types::Scalar;
use ark_bn254::Fr;

pub fn keystream(key: &Scalar, counter: u64) -> Scalar {
    hash(&[*key, Fr::from(counter)])
}

pub fn encrypt(value: &Scalar, key: &Scalar, counter: u64) -> Scalar {
    *value + keystream(key, counter)
}

pub fn decrypt(ciphertext: &Scalar, key: &Scalar, counter: u64) -> Scalar {
    *ciphertext - keystream(key, counter)
}
