//! Scalar encodings shared between the protocol code and the wire layouts.

use crate::error::{ProtocolError, Result};
use ark_bn254::{Fq, Fr};
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Integer modulo the BN254 scalar field order. Every hash output is one of these.
pub type Scalar = Fr;

/// Token and account balances.
pub type Amount = u128;

fn biguint<B: BigInteger>(b: B) -> BigUint {
    BigUint::from_bytes_le(&b.to_bytes_le())
}

/// Canonical decimal rendering, the format the circuit toolchain consumes.
pub fn to_decimal<F: PrimeField>(x: &F) -> String {
    biguint(x.into_bigint()).to_string()
}

/// Parse a canonical decimal field element, rejecting values at or above the modulus.
pub fn parse_decimal<F: PrimeField>(s: &str) -> Result<F> {
    let value = BigUint::from_str(s.trim())
        .map_err(|e| ProtocolError::Input(format!("invalid decimal field element {s:?}: {e}")))?;
    let modulus = biguint(F::MODULUS);
    if value >= modulus {
        return Err(ProtocolError::Input(format!("field element {s} is not reduced")));
    }
    Ok(F::from_le_bytes_mod_order(&value.to_bytes_le()))
}

pub fn amount_to_scalar(amount: Amount) -> Scalar {
    Fr::from(amount)
}

/// Recover an amount from a decrypted scalar.
///
/// A wrong key yields a uniformly random field element, which almost never fits in 128 bits.
pub fn scalar_to_amount(x: &Scalar) -> Result<Amount> {
    let value = biguint(x.into_bigint());
    u128::try_from(&value).map_err(|_| {
        ProtocolError::Consistency(format!("decrypted amount {value} exceeds 128 bits"))
    })
}

/// Map a base-field coordinate into the scalar field (little-endian bytes, reduced).
pub fn fq_to_fr(x: &Fq) -> Fr {
    Fr::from_le_bytes_mod_order(&x.into_bigint().to_bytes_le())
}

/// Lift a scalar into the base field. Injective because r < q.
pub fn fr_to_fq(x: &Fr) -> Fq {
    Fq::from_le_bytes_mod_order(&x.into_bigint().to_bytes_le())
}

/// 20-byte EVM address, used for token contracts and deposit/withdraw accounts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn to_scalar(&self) -> Scalar {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    /// Recover an address from a decrypted scalar.
    pub fn from_scalar(x: &Scalar) -> Result<Self> {
        let bytes = biguint(x.into_bigint()).to_bytes_be();
        if bytes.len() > 20 {
            return Err(ProtocolError::Consistency(format!(
                "decrypted token does not fit an address ({} bytes)",
                bytes.len()
            )));
        }
        let mut out = [0u8; 20];
        out[20 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl FromStr for Address {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if stripped.len() != 40 {
            return Err(ProtocolError::Input(format!("malformed address {s:?}: expected 40 hex digits")));
        }
        let bytes = hex::decode(stripped).map_err(|e| ProtocolError::Input(format!("malformed address {s:?}: {e}")))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl TryFrom<String> for Address {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> String {
        a.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}
