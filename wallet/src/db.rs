use crate::errors::{Result, WalletError};
use crate::models::{BalanceHistory, CachedAccount};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Local account cache keyed by zkAddress.
#[allow(async_fn_in_trait)]
pub trait AccountCache {
    async fn load(&self, zk_address: &str) -> Result<Option<CachedAccount>>;
    async fn store(&self, account: &CachedAccount) -> Result<()>;
}

impl<T: AccountCache> AccountCache for Arc<T> {
    async fn load(&self, zk_address: &str) -> Result<Option<CachedAccount>> {
        self.as_ref().load(zk_address).await
    }

    async fn store(&self, account: &CachedAccount) -> Result<()> {
        self.as_ref().store(account).await
    }
}

pub type Db = Pool<Sqlite>;

pub struct SqliteCache {
    db: Db,
}

impl SqliteCache {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Every connection to an in-memory URL opens a fresh database, so keep exactly one alive.
        let in_memory = db_url.contains(":memory:");
        let db = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(db_url)
            .await?;
        let cache = Self { db };
        cache.init_schema().await?;
        Ok(cache)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS accounts (
  zk_address TEXT PRIMARY KEY,
  current_nonce INTEGER NOT NULL,
  balance_entries_json TEXT NOT NULL,
  user_key_hash TEXT NOT NULL,
  last_updated TEXT NOT NULL
);
"#,
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

impl AccountCache for SqliteCache {
    async fn load(&self, zk_address: &str) -> Result<Option<CachedAccount>> {
        let row = sqlx::query(
            r#"SELECT current_nonce, balance_entries_json, user_key_hash, last_updated
               FROM accounts WHERE zk_address = ?"#,
        )
        .bind(zk_address)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else { return Ok(None); };

        let current_nonce: i64 = row.get(0);
        let entries_json: String = row.get(1);
        let user_key_hash: String = row.get(2);
        let last_updated: String = row.get(3);

        let balance_entries: BalanceHistory = serde_json::from_str(&entries_json)?;
        let last_updated = DateTime::parse_from_rfc3339(&last_updated)
            .map_err(|e| WalletError::Cache(format!("last_updated {last_updated:?}: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(CachedAccount {
            zk_address: zk_address.to_string(),
            current_nonce: u64::try_from(current_nonce)
                .map_err(|_| WalletError::Cache(format!("negative nonce {current_nonce}")))?,
            balance_entries,
            user_key_hash,
            last_updated,
        }))
    }

    async fn store(&self, account: &CachedAccount) -> Result<()> {
        let entries_json = serde_json::to_string(&account.balance_entries)?;
        let nonce = i64::try_from(account.current_nonce)
            .map_err(|_| WalletError::Cache(format!("nonce {} does not fit the cache", account.current_nonce)))?;

        sqlx::query(
            r#"INSERT OR REPLACE INTO accounts
               (zk_address, current_nonce, balance_entries_json, user_key_hash, last_updated)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&account.zk_address)
        .bind(nonce)
        .bind(entries_json)
        .bind(&account.user_key_hash)
        .bind(account.last_updated.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    rows: RwLock<HashMap<String, CachedAccount>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountCache for MemoryCache {
    async fn load(&self, zk_address: &str) -> Result<Option<CachedAccount>> {
        Ok(self.rows.read().await.get(zk_address).cloned())
    }

    async fn store(&self, account: &CachedAccount) -> Result<()> {
        self.rows
            .write()
            .await
            .insert(account.zk_address.clone(), account.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BalanceEntry;
    use zk_ledger::Address;

    fn account(nonce: u64) -> CachedAccount {
        CachedAccount {
            zk_address: "ab".repeat(32),
            current_nonce: nonce,
            balance_entries: BalanceHistory::new(vec![BalanceEntry {
                nonce: 0,
                token: Address([3; 20]),
                amount: u64::MAX as u128 + 5,
                nullifier: 2,
            }]),
            user_key_hash: "00ff".into(),
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sqlite_round_trip_and_overwrite() {
        let cache = SqliteCache::connect("sqlite::memory:").await.unwrap();
        assert_eq!(cache.load("missing").await.unwrap(), None);

        let a = account(1);
        cache.store(&a).await.unwrap();
        assert_eq!(cache.load(&a.zk_address).await.unwrap(), Some(a.clone()));

        let b = account(2);
        cache.store(&b).await.unwrap();
        assert_eq!(cache.load(&a.zk_address).await.unwrap().map(|x| x.current_nonce), Some(2));
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let cache = MemoryCache::new();
        let a = account(4);
        cache.store(&a).await.unwrap();
        assert_eq!(cache.load(&a.zk_address).await.unwrap(), Some(a));
    }
}
