//! Crate-wide constants shared by key derivation, commitments and the wire layouts.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;
use std::sync::LazyLock;

/// Message the wallet signs to derive the shielded secret.
///
/// Changing a single byte changes every derived key, so this is part of the protocol.
pub const KEY_DERIVATION_MESSAGE: &str =
    "Sign this message to unlock your shielded balance.\n\nThis signature derives your private key. Only sign it on trusted sites.";

/// Length of a recoverable ECDSA signature (r || s || v).
pub const SIGNATURE_LEN: usize = 65;

/// Big-endian chunk widths used to split the signature into field elements.
///
/// 31 bytes always fits below the BN254 scalar modulus.
pub const SIGNATURE_CHUNKS: [usize; 3] = [31, 31, 3];

/// Domain tag separating the view key from the spending key hash.
pub const VIEW_DOMAIN: &[u8] = b"shielded-ledger/view-key";

/// Generator derivation domains.
pub const PEDERSEN_POSITIVE_DOMAIN: &[u8] = b"shielded-ledger/pedersen-positive";
pub const PEDERSEN_NON_HIDING_DOMAIN: &[u8] = b"shielded-ledger/pedersen-non-hiding";

/// Cipher counters. Each logical value under a given key owns one counter.
pub const COUNTER_AMOUNT: u64 = 0;
pub const COUNTER_TOKEN: u64 = 1;
pub const COUNTER_NULLIFIER: u64 = 2;

/// Upper bound on try-and-increment attempts per generator.
pub const MAX_HASH_TO_CURVE_ATTEMPTS: u64 = 256;

/// Default cap on nonce discovery probes.
pub const DEFAULT_DISCOVERY_CAP: u64 = 1024;

/// Expected public-input counts per circuit.
pub const ENTRY_PUBLIC_INPUTS: usize = 9;
pub const DEPOSIT_PUBLIC_INPUTS: usize = 16;
pub const WITHDRAW_PUBLIC_INPUTS: usize = 16;
pub const TRANSFER_PUBLIC_INPUTS: usize = 28;

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1), the same instantiation the circuit side uses.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;
pub const POSEIDON_FULL_ROUNDS: u64 = 8;
pub const POSEIDON_PARTIAL_ROUNDS: u64 = 57;
pub const POSEIDON_ALPHA: u64 = 5;

static POSEIDON: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(derive_poseidon_config);

/// Process-wide Poseidon parameters for BN254::Fr.
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    &POSEIDON
}

/// Deterministically derive Poseidon parameters (Ark + MDS) for BN254::Fr.
fn derive_poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS as usize,
        POSEIDON_PARTIAL_ROUNDS as usize,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}
