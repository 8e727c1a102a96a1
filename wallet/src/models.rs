use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zk_ledger::{Address, Amount};

/// Balance of the token touched by the operation at `nonce`, after that operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub nonce: u64,
    pub token: Address,
    pub amount: Amount,
    /// Cumulative amount absorbed from received notes for this token.
    pub nullifier: Amount,
}

/// Ordered per-nonce history with "latest entry at or before" lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BalanceHistory {
    entries: Vec<BalanceEntry>,
}

impl BalanceHistory {
    pub fn new(mut entries: Vec<BalanceEntry>) -> Self {
        entries.sort_by_key(|e| e.nonce);
        entries.dedup_by_key(|e| e.nonce);
        Self { entries }
    }

    /// Replaces any entry already recorded at the same nonce.
    pub fn record(&mut self, entry: BalanceEntry) {
        match self.entries.binary_search_by_key(&entry.nonce, |e| e.nonce) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    pub fn at(&self, nonce: u64) -> Option<&BalanceEntry> {
        self.entries
            .binary_search_by_key(&nonce, |e| e.nonce)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Highest entry with `entry.nonce <= nonce` for `token`.
    pub fn latest_for(&self, token: &Address, nonce: u64) -> Option<&BalanceEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.nonce <= nonce)
            .find(|e| e.token == *token)
    }

    /// Current balance per token, one entry per token.
    pub fn balances(&self) -> Vec<BalanceEntry> {
        let mut out: Vec<BalanceEntry> = Vec::new();
        for e in self.entries.iter().rev() {
            if !out.iter().any(|o| o.token == e.token) {
                out.push(*e);
            }
        }
        out.sort_by_key(|e| e.token);
        out
    }

    pub fn entries(&self) -> &[BalanceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of probing the ledger for an account's position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredAccount {
    /// Next unused nonce.
    pub current_nonce: u64,
    pub history: BalanceHistory,
    /// Ledger reads performed by this discovery run.
    pub probes: u64,
}

/// Row stored in the local account cache, keyed by zkAddress.
///
/// The spending key is re-derived from the wallet signature and never cached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccount {
    pub zk_address: String,
    pub current_nonce: u64,
    pub balance_entries: BalanceHistory,
    pub user_key_hash: String,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(nonce: u64, token: u8, amount: Amount) -> BalanceEntry {
        BalanceEntry {
            nonce,
            token: Address([token; 20]),
            amount,
            nullifier: 0,
        }
    }

    #[test]
    fn latest_for_respects_nonce_bound() {
        let h = BalanceHistory::new(vec![entry(2, 1, 150), entry(0, 1, 100), entry(1, 2, 7)]);
        assert_eq!(h.latest_for(&Address([1; 20]), 1).map(|e| e.amount), Some(100));
        assert_eq!(h.latest_for(&Address([1; 20]), 5).map(|e| e.amount), Some(150));
        assert_eq!(h.latest_for(&Address([2; 20]), 0), None);
        assert_eq!(h.latest_for(&Address([3; 20]), 9), None);
    }

    #[test]
    fn record_keeps_order_and_replaces() {
        let mut h = BalanceHistory::default();
        h.record(entry(1, 1, 5));
        h.record(entry(0, 1, 4));
        h.record(entry(1, 1, 6));
        assert_eq!(h.entries().iter().map(|e| e.nonce).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(h.at(1).map(|e| e.amount), Some(6));
    }

    #[test]
    fn balances_take_the_latest_per_token() {
        let h = BalanceHistory::new(vec![entry(0, 1, 100), entry(1, 2, 7), entry(2, 1, 0)]);
        let b = h.balances();
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].amount, 0);
        assert_eq!(b[1].amount, 7);
    }

    #[test]
    fn history_serializes_as_a_list() {
        let h = BalanceHistory::new(vec![entry(0, 1, 100)]);
        let json = serde_json::to_value(&h).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["token"], "0x0101010101010101010101010101010101010101");
        let back: BalanceHistory = serde_json::from_value(json).unwrap();
        assert_eq!(back, h);
    }
}
