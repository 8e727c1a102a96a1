//! Cached personal commitment states over the account's balance history.

use crate::models::{BalanceEntry, BalanceHistory};
use std::collections::HashMap;
use tracing::debug;
use zk_ledger::{Address, Amount, PersonalCommitmentState, UserKeys};

pub struct PersonalStateManager {
    keys: UserKeys,
    history: BalanceHistory,
    cache: HashMap<(u64, Address), PersonalCommitmentState>,
}

impl PersonalStateManager {
    pub fn new(keys: UserKeys, history: BalanceHistory) -> Self {
        Self {
            keys,
            history,
            cache: HashMap::new(),
        }
    }

    pub fn history(&self) -> &BalanceHistory {
        &self.history
    }

    /// Replace the history, dropping every cached state.
    pub fn reset(&mut self, history: BalanceHistory) {
        self.history = history;
        self.cache.clear();
    }

    /// State of `token` after the operation at `nonce`.
    pub fn get(&mut self, nonce: u64, token: Address) -> PersonalCommitmentState {
        if let Some(s) = self.cache.get(&(nonce, token)) {
            return s.clone();
        }
        let state = self.rebuild(nonce, token);
        self.cache.insert((nonce, token), state.clone());
        state
    }

    pub fn put(&mut self, nonce: u64, token: Address, state: PersonalCommitmentState) {
        self.cache.insert((nonce, token), state);
    }

    /// Evict `(nonce, token)` and rebuild it from history alone.
    pub fn recompute(&mut self, nonce: u64, token: Address) -> PersonalCommitmentState {
        self.cache.remove(&(nonce, token));
        debug!(nonce, %token, "recomputing personal state from history");
        self.get(nonce, token)
    }

    /// Append a committed operation. Cached states it supersedes are evicted.
    pub fn record(&mut self, entry: BalanceEntry) {
        self.cache
            .retain(|(nonce, token), _| !(*token == entry.token && *nonce >= entry.nonce));
        self.history.record(entry);
    }

    /// Balance and cumulative nullifier of `token` after `nonce`, zero when never touched.
    pub fn balance_at(&self, nonce: u64, token: &Address) -> (Amount, Amount) {
        self.history
            .latest_for(token, nonce)
            .map_or((0, 0), |e| (e.amount, e.nullifier))
    }

    fn rebuild(&self, nonce: u64, token: Address) -> PersonalCommitmentState {
        match self.history.latest_for(&token, nonce) {
            Some(e) => PersonalCommitmentState::reconstruct(e.amount, token, &self.keys, false),
            None => PersonalCommitmentState::reconstruct(0, token, &self.keys, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk_ledger::Scalar;

    fn keys() -> UserKeys {
        UserKeys::from_user_key(Scalar::from(5150u64))
    }

    fn t(b: u8) -> Address {
        Address([b; 20])
    }

    fn entry(nonce: u64, token: Address, amount: Amount) -> BalanceEntry {
        BalanceEntry {
            nonce,
            token,
            amount,
            nullifier: 0,
        }
    }

    #[test]
    fn miss_falls_back_to_new_token() {
        let mut m = PersonalStateManager::new(keys(), BalanceHistory::default());
        let s = m.get(3, t(1));
        assert_eq!(s.amount, 0);
        assert!(s.first_use);
        assert!(s.initializer.is_some());
    }

    #[test]
    fn lookup_uses_the_latest_entry_at_or_before() {
        let k = keys();
        let history = BalanceHistory::new(vec![entry(0, t(1), 100), entry(1, t(2), 9), entry(2, t(1), 150)]);
        let mut m = PersonalStateManager::new(k.clone(), history);
        assert_eq!(m.get(1, t(1)).amount, 100);
        assert_eq!(m.get(2, t(1)), PersonalCommitmentState::reconstruct(150, t(1), &k, false));
        assert_eq!(m.get(0, t(2)).amount, 0);
    }

    #[test]
    fn recompute_repairs_a_poisoned_entry() {
        let k = keys();
        let mut m = PersonalStateManager::new(k.clone(), BalanceHistory::new(vec![entry(0, t(1), 100)]));
        m.put(0, t(1), PersonalCommitmentState::reconstruct(999, t(1), &k, false));
        assert_eq!(m.get(0, t(1)).amount, 999);
        assert_eq!(m.recompute(0, t(1)).amount, 100);
        assert_eq!(m.get(0, t(1)).amount, 100);
    }

    #[test]
    fn record_evicts_superseded_states() {
        let mut m = PersonalStateManager::new(keys(), BalanceHistory::new(vec![entry(0, t(1), 100)]));
        assert_eq!(m.get(1, t(1)).amount, 100);
        m.record(entry(1, t(1), 150));
        assert_eq!(m.get(1, t(1)).amount, 150);
        assert_eq!(m.get(0, t(1)).amount, 100);
        assert_eq!(m.balance_at(5, &t(1)), (150, 0));
    }
}
