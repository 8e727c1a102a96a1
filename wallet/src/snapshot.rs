//! Main accumulator reads and previous-contribution resolution.

use crate::discovery::decrypt_reference;
use crate::errors::{Result, WalletError};
use crate::ledger::LedgerClient;
use crate::state::PersonalStateManager;
use tracing::{debug, warn};
use zk_ledger::{MainAccumulatorState, Opening, PersonalCommitmentState, UserKeys};

/// Snapshot of the main accumulator, valid for a single operation.
pub async fn read<L: LedgerClient>(ledger: &L) -> Result<MainAccumulatorState> {
    let snapshot = MainAccumulatorState {
        tot: ledger.get_state_commitment().await?,
        opening: ledger.get_state_commitment_opening_values().await?,
    };
    if !snapshot.is_consistent() {
        warn!("ledger accumulator point does not match its published opening");
    }
    Ok(snapshot)
}

/// The caller's contribution to the accumulator after operation `nonce - 1`.
///
/// The ledger's encrypted reference is checked against the locally cached state. A
/// mismatch forces one rebuild from history; a second one is fatal.
pub async fn resolve_previous_opening<L: LedgerClient>(
    ledger: &L,
    keys: &UserKeys,
    states: &mut PersonalStateManager,
    nonce: u64,
) -> Result<Option<Opening>> {
    let Some(prev) = nonce.checked_sub(1) else {
        return Ok(None);
    };
    let nc = keys.nonce_commitment(prev);
    let reference = ledger
        .get_personal_c_tot_reference(&nc)
        .await?
        .filter(|r| !r.is_unused_sentinel())
        .ok_or_else(|| WalletError::State(format!("no personal reference stored for nonce {prev}")))?;

    let entry = decrypt_reference(keys, prev, &reference)?;
    let expected = PersonalCommitmentState::reconstruct(entry.amount, entry.token, keys, false).contribution_opening(nc);

    if states.get(prev, entry.token).contribution_opening(nc) == expected {
        return Ok(Some(expected));
    }

    warn!(nonce = prev, token = %entry.token, "cached personal state disagrees with ledger reference");
    if states.recompute(prev, entry.token).contribution_opening(nc) == expected {
        debug!(nonce = prev, "recomputed personal state matches");
        return Ok(Some(expected));
    }

    Err(WalletError::Consistency(format!(
        "personal state at nonce {prev} does not match the ledger reference after recomputation"
    )))
}
