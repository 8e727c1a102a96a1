//! Circuit input maps and public-input layouts.
//!
//! ORDERING MUST MATCH the circuits' public input declaration order. The ledger reads
//! submissions back through [`PublicInputs`] using the same tables.

use crate::constants::{DEPOSIT_PUBLIC_INPUTS, ENTRY_PUBLIC_INPUTS, TRANSFER_PUBLIC_INPUTS, WITHDRAW_PUBLIC_INPUTS};
use crate::curve::CurvePoint;
use crate::error::{ProtocolError, Result};
use crate::types::{parse_decimal, to_decimal, Scalar};
use ark_bn254::Fr;
use ark_ff::PrimeField;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CircuitKind {
    Entry,
    Deposit,
    Withdraw,
    Send,
    Absorb,
}

pub const ENTRY_LAYOUT: [&str; ENTRY_PUBLIC_INPUTS] = [
    "token",
    "amount",
    "nonce_commitment",
    "enc_m",
    "enc_r",
    "enc_nullifier",
    "delta_m",
    "delta_r",
    "delta_d",
];

/// Shared by deposit and withdraw.
pub const BALANCE_LAYOUT: [&str; DEPOSIT_PUBLIC_INPUTS] = [
    "token",
    "amount",
    "nonce_commitment",
    "prev_nonce_commitment",
    "enc_m",
    "enc_r",
    "enc_nullifier",
    "delta_m",
    "delta_r",
    "delta_d",
    "main_c_tot_x",
    "main_c_tot_y",
    "main_m",
    "main_r",
    "main_d",
    "account",
];

/// Shared by send and absorb; `transfer_kind` tells them apart.
pub const TRANSFER_LAYOUT: [&str; TRANSFER_PUBLIC_INPUTS] = [
    "nonce_commitment",
    "prev_nonce_commitment",
    "enc_m",
    "enc_r",
    "enc_nullifier",
    "delta_m",
    "delta_r",
    "delta_d",
    "main_c_tot_x",
    "main_c_tot_y",
    "main_m",
    "main_r",
    "main_d",
    "owner_pk_x",
    "owner_pk_y",
    "peer_pk_x",
    "peer_pk_y",
    "peer_stack_x",
    "peer_stack_y",
    "peer_note_count",
    "note_enc_amount",
    "note_enc_token",
    "note_commitment_x",
    "note_commitment_y",
    "new_peer_stack_x",
    "new_peer_stack_y",
    "transfer_kind",
    "nullifier_commitment",
];

pub const TRANSFER_KIND_SEND: u64 = 0;
pub const TRANSFER_KIND_ABSORB: u64 = 1;

impl CircuitKind {
    pub fn name(&self) -> &'static str {
        match self {
            CircuitKind::Entry => "entry",
            CircuitKind::Deposit => "deposit",
            CircuitKind::Withdraw => "withdraw",
            CircuitKind::Send => "send",
            CircuitKind::Absorb => "absorb",
        }
    }

    pub fn public_layout(&self) -> &'static [&'static str] {
        match self {
            CircuitKind::Entry => &ENTRY_LAYOUT,
            CircuitKind::Deposit | CircuitKind::Withdraw => &BALANCE_LAYOUT,
            CircuitKind::Send | CircuitKind::Absorb => &TRANSFER_LAYOUT,
        }
    }

    pub fn expected_public_inputs(&self) -> usize {
        match self {
            CircuitKind::Entry => ENTRY_PUBLIC_INPUTS,
            CircuitKind::Deposit => DEPOSIT_PUBLIC_INPUTS,
            CircuitKind::Withdraw => WITHDRAW_PUBLIC_INPUTS,
            CircuitKind::Send | CircuitKind::Absorb => TRANSFER_PUBLIC_INPUTS,
        }
    }
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered map of decimal-string field elements handed to the circuit executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitInputs {
    kind: CircuitKind,
    entries: Vec<(String, String)>,
}

impl CircuitInputs {
    pub fn new(kind: CircuitKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> CircuitKind {
        self.kind
    }

    /// Insert or overwrite, keeping first-insertion order.
    pub fn push_decimal(&mut self, name: impl Into<String>, value: String) -> &mut Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn push_field<F: PrimeField>(&mut self, name: impl Into<String>, value: &F) -> &mut Self {
        self.push_decimal(name, to_decimal(value))
    }

    pub fn push_u64(&mut self, name: impl Into<String>, value: u64) -> &mut Self {
        self.push_decimal(name, value.to_string())
    }

    pub fn push_u128(&mut self, name: impl Into<String>, value: u128) -> &mut Self {
        self.push_decimal(name, value.to_string())
    }

    pub fn push_bool(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.push_u64(name, value as u64)
    }

    /// Adds `{prefix}_x` and `{prefix}_y`.
    pub fn push_point(&mut self, prefix: &str, p: &CurvePoint) -> &mut Self {
        let (x, y) = p.to_decimal();
        self.push_decimal(format!("{prefix}_x"), x);
        self.push_decimal(format!("{prefix}_y"), y)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Public inputs in layout order. Every layout slot must have been filled.
    pub fn public_inputs(&self) -> Result<Vec<String>> {
        self.kind
            .public_layout()
            .iter()
            .map(|name| {
                self.get(name).map(str::to_string).ok_or_else(|| {
                    ProtocolError::Consistency(format!("{} inputs are missing public slot {name}", self.kind))
                })
            })
            .collect()
    }
}

impl Serialize for CircuitInputs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Typed view over a submitted public-input vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    kind: CircuitKind,
    values: Vec<String>,
}

impl PublicInputs {
    pub fn new(kind: CircuitKind, values: Vec<String>) -> Result<Self> {
        let expected = kind.expected_public_inputs();
        if values.len() != expected {
            return Err(ProtocolError::Input(format!(
                "{kind} expects {expected} public inputs, got {}",
                values.len()
            )));
        }
        Ok(Self { kind, values })
    }

    pub fn kind(&self) -> CircuitKind {
        self.kind
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    fn raw(&self, name: &str) -> Result<&str> {
        let idx = self
            .kind
            .public_layout()
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| ProtocolError::Input(format!("{} has no public input {name}", self.kind)))?;
        Ok(&self.values[idx])
    }

    pub fn scalar(&self, name: &str) -> Result<Scalar> {
        parse_decimal::<Fr>(self.raw(name)?)
    }

    pub fn u64(&self, name: &str) -> Result<u64> {
        let raw = self.raw(name)?;
        raw.parse()
            .map_err(|e| ProtocolError::Input(format!("public input {name}={raw} is not a u64: {e}")))
    }

    pub fn u128(&self, name: &str) -> Result<u128> {
        let raw = self.raw(name)?;
        raw.parse()
            .map_err(|e| ProtocolError::Input(format!("public input {name}={raw} is not a u128: {e}")))
    }

    pub fn point(&self, prefix: &str) -> Result<CurvePoint> {
        CurvePoint::from_decimal(self.raw(&format!("{prefix}_x"))?, self.raw(&format!("{prefix}_y"))?)
    }
}
