//! Locate an account's next unused nonce by probing the ledger in order.

use crate::errors::{Result, WalletError};
use crate::ledger::{LedgerClient, PersonalReference};
use crate::models::{BalanceEntry, BalanceHistory, DiscoveredAccount};
use tracing::{debug, info};
use zk_ledger::cipher::decrypt;
use zk_ledger::constants::{COUNTER_AMOUNT, COUNTER_NULLIFIER, COUNTER_TOKEN};
use zk_ledger::types::scalar_to_amount;
use zk_ledger::{Address, UserKeys};

/// Decrypt the reference written by the operation at `nonce`.
pub fn decrypt_reference(keys: &UserKeys, nonce: u64, reference: &PersonalReference) -> Result<BalanceEntry> {
    let key = keys.encryption_key(nonce);
    Ok(BalanceEntry {
        nonce,
        amount: scalar_to_amount(&decrypt(&reference.enc_m, &key, COUNTER_AMOUNT))?,
        token: Address::from_scalar(&decrypt(&reference.enc_r, &key, COUNTER_TOKEN))?,
        nullifier: scalar_to_amount(&decrypt(&reference.enc_nullifier, &key, COUNTER_NULLIFIER))?,
    })
}

/// Scan nonces from `resume` (or 0) until an absent or sentinel reference.
///
/// `resume` carries a cached nonce and the history known up to it, so only new
/// operations are probed. More than `cap` probes is a state error.
pub async fn discover<L: LedgerClient>(
    ledger: &L,
    keys: &UserKeys,
    resume: Option<(u64, BalanceHistory)>,
    cap: u64,
) -> Result<DiscoveredAccount> {
    let (start, mut history) = resume.unwrap_or_default();
    let mut nonce = start;
    let mut probes = 0u64;

    loop {
        if probes >= cap {
            return Err(WalletError::State(format!(
                "discovery cap of {cap} probes exceeded starting at nonce {start}"
            )));
        }
        probes += 1;

        let reference = ledger.get_personal_c_tot_reference(&keys.nonce_commitment(nonce)).await?;
        match reference {
            Some(r) if !r.is_unused_sentinel() => {
                let entry = decrypt_reference(keys, nonce, &r)?;
                debug!(nonce, token = %entry.token, "discovered committed nonce");
                history.record(entry);
                nonce += 1;
            }
            found => {
                info!(
                    current_nonce = nonce,
                    probes,
                    sentinel = found.is_some(),
                    "nonce discovery finished"
                );
                return Ok(DiscoveredAccount {
                    current_nonce: nonce,
                    history,
                    probes,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use zk_ledger::cipher::encrypt;
    use zk_ledger::types::amount_to_scalar;
    use zk_ledger::Scalar;

    fn keys() -> UserKeys {
        UserKeys::from_user_key(Scalar::from(9090u64))
    }

    fn reference(keys: &UserKeys, nonce: u64, amount: u128, token: Address) -> PersonalReference {
        let key = keys.encryption_key(nonce);
        PersonalReference {
            enc_m: encrypt(&amount_to_scalar(amount), &key, COUNTER_AMOUNT),
            enc_r: encrypt(&token.to_scalar(), &key, COUNTER_TOKEN),
            enc_nullifier: encrypt(&amount_to_scalar(0), &key, COUNTER_NULLIFIER),
        }
    }

    async fn ledger_with(keys: &UserKeys, used: u64) -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        for n in 0..used {
            let nc = keys.nonce_commitment(n);
            ledger.write_sentinel(nc).await;
            let r = reference(keys, n, 100 + n as u128, Address([1; 20]));
            ledger.tamper_reference(&nc, |slot| *slot = r).await;
        }
        ledger.reset_probes();
        ledger
    }

    #[tokio::test]
    async fn k_used_nonces_take_k_plus_one_probes() {
        let k = keys();
        for used in [0u64, 1, 5] {
            let ledger = ledger_with(&k, used).await;
            let found = discover(&ledger, &k, None, 1024).await.unwrap();
            assert_eq!(found.current_nonce, used);
            assert_eq!(found.probes, used + 1);
            assert_eq!(ledger.probes(), used + 1);
            assert_eq!(found.history.len() as u64, used);
        }
    }

    #[tokio::test]
    async fn history_is_decrypted() {
        let k = keys();
        let ledger = ledger_with(&k, 3).await;
        let found = discover(&ledger, &k, None, 1024).await.unwrap();
        let e = found.history.at(2).unwrap();
        assert_eq!((e.amount, e.token, e.nullifier), (102, Address([1; 20]), 0));
    }

    #[tokio::test]
    async fn sentinel_stops_the_scan() {
        let k = keys();
        let ledger = ledger_with(&k, 2).await;
        ledger.write_sentinel(k.nonce_commitment(2)).await;
        let found = discover(&ledger, &k, None, 1024).await.unwrap();
        assert_eq!(found.current_nonce, 2);
    }

    #[tokio::test]
    async fn resume_skips_known_nonces() {
        let k = keys();
        let ledger = ledger_with(&k, 4).await;
        let first = discover(&ledger, &k, None, 1024).await.unwrap();
        let partial = BalanceHistory::new(first.history.entries()[..3].to_vec());
        ledger.reset_probes();

        let resumed = discover(&ledger, &k, Some((3, partial)), 1024).await.unwrap();
        assert_eq!(resumed.current_nonce, 4);
        assert_eq!(resumed.probes, 2);
        assert_eq!(resumed.history, first.history);
    }

    #[tokio::test]
    async fn cap_is_enforced() {
        let k = keys();
        let ledger = ledger_with(&k, 4).await;
        assert!(matches!(discover(&ledger, &k, None, 4).await, Err(WalletError::State(_))));
        assert!(discover(&ledger, &k, None, 5).await.is_ok());
    }
}
