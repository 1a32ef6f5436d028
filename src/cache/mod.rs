//! Cache-aside accelerator for single-account reads
//!
//! Never authoritative. Entries may be stale up to their TTL or until a
//! mutation invalidates them; callers treat every failure as a miss.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::Account;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Cache key of an account snapshot.
pub fn account_key(account_id: Uuid) -> String {
    format!("acct:{}", account_id)
}

#[async_trait]
pub trait AccountCache: Send + Sync {
    async fn get(&self, account_id: Uuid) -> Result<Option<Account>, CacheError>;

    async fn set(&self, account: &Account) -> Result<(), CacheError>;

    async fn invalidate(&self, account_id: Uuid) -> Result<(), CacheError>;
}

struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

/// In-process TTL cache holding JSON snapshots.
pub struct LocalAccountCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl LocalAccountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl AccountCache for LocalAccountCache {
    async fn get(&self, account_id: Uuid) -> Result<Option<Account>, CacheError> {
        let key = account_key(account_id);

        let lookup = self
            .entries
            .get(&key)
            .map(|entry| (entry.payload.clone(), entry.expires_at));

        match lookup {
            Some((payload, expires_at)) if expires_at > Instant::now() => {
                Ok(Some(serde_json::from_str(&payload)?))
            }
            Some(_) => {
                self.entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, account: &Account) -> Result<(), CacheError> {
        let payload = serde_json::to_string(account)?;
        // Entries read only once would otherwise never leave the map
        self.purge_expired();
        self.entries.insert(
            account_key(account.account_id),
            CacheEntry {
                payload,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, account_id: Uuid) -> Result<(), CacheError> {
        self.entries.remove(&account_key(account_id));
        Ok(())
    }
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAccountCache;

#[async_trait]
impl AccountCache for NoopAccountCache {
    async fn get(&self, _account_id: Uuid) -> Result<Option<Account>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _account: &Account) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _account_id: Uuid) -> Result<(), CacheError> {
        Ok(())
    }
}
