use crate::errors::{Result, WalletError};
use serde::{Deserialize, Serialize};
use zk_ledger::constants::DEFAULT_DISCOVERY_CAP;

pub const DEFAULT_CACHE_URL: &str = "sqlite::memory:";

/// Runtime settings, read from the environment with defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Maximum nonces probed before discovery gives up.
    pub discovery_cap: u64,
    /// sqlx connection URL for the account cache.
    pub cache_url: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            discovery_cap: DEFAULT_DISCOVERY_CAP,
            cache_url: DEFAULT_CACHE_URL.to_string(),
        }
    }
}

impl WalletConfig {
    /// `SHIELDED_DISCOVERY_CAP`, `SHIELDED_CACHE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(cap) = lookup("SHIELDED_DISCOVERY_CAP") {
            cfg.discovery_cap = cap
                .parse()
                .map_err(|e| WalletError::Input(format!("SHIELDED_DISCOVERY_CAP={cap:?}: {e}")))?;
            if cfg.discovery_cap == 0 {
                return Err(WalletError::Input("SHIELDED_DISCOVERY_CAP must be positive".into()));
            }
        }
        if let Some(url) = lookup("SHIELDED_CACHE_URL") {
            cfg.cache_url = url;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let cfg = WalletConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, WalletConfig::default());
        assert_eq!(cfg.discovery_cap, 1024);
    }

    #[test]
    fn reads_overrides() {
        let env: HashMap<&str, &str> = [
            ("SHIELDED_DISCOVERY_CAP", "16"),
            ("SHIELDED_CACHE_URL", "sqlite:data/cache.sqlite"),
        ]
        .into_iter()
        .collect();
        let cfg = WalletConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.discovery_cap, 16);
        assert_eq!(cfg.cache_url, "sqlite:data/cache.sqlite");
    }

    #[test]
    fn rejects_bad_cap() {
        assert!(WalletConfig::from_lookup(|_| Some("lots".into())).is_err());
        assert!(matches!(
            WalletConfig::from_lookup(|k| (k == "SHIELDED_DISCOVERY_CAP").then(|| "0".into())),
            Err(WalletError::Input(_))
        ));
    }
}
