mod file;
mod redis;

pub use file::FileStore;
pub use redis::{RedisStore, MAX_TTL_SECONDS, MIN_TTL_SECONDS};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::ShareRecord;

/// Namespace prefix for share keys in both backends.
pub const KEY_PREFIX: &str = "share:";

pub fn share_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("file store error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed stored record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("storage command timed out")]
    Timeout,

    #[error("no storage backend available")]
    Unavailable,
}

/// Parse boundary for blobs coming back from the raw key-value primary.
/// Anything unparseable is surfaced as `Malformed` so callers can decide
/// whether to fall through to the secondary.
fn parse_record(raw: &str) -> Result<ShareRecord, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

/// Dual-backend storage: Redis primary, JSON file secondary. A write counts
/// as successful when either backend accepts it; reads prefer the primary
/// and fall back only when it yields nothing.
#[derive(Clone)]
pub struct Storage {
    redis: Option<RedisStore>,
    file: Option<FileStore>,
    /// When set, a write that misses the primary is an error even if the
    /// secondary took it. For deployments where the file store is a local
    /// convenience rather than durable storage.
    require_primary: bool,
}

impl Storage {
    pub fn new(redis: Option<RedisStore>, file: Option<FileStore>, require_primary: bool) -> Self {
        Self {
            redis,
            file,
            require_primary,
        }
    }

    pub fn has_primary(&self) -> bool {
        self.redis.is_some()
    }

    pub fn has_secondary(&self) -> bool {
        self.file.is_some()
    }

    /// Write a fresh record under its TTL.
    pub async fn store(
        &self,
        key: &str,
        record: &ShareRecord,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        self.persist(key, record, ttl_seconds, "store").await
    }

    /// Rewrite an existing record, narrowing the TTL to what remains.
    pub async fn update(
        &self,
        key: &str,
        record: &ShareRecord,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        self.persist(key, record, ttl_seconds, "update").await
    }

    async fn persist(
        &self,
        key: &str,
        record: &ShareRecord,
        ttl_seconds: u64,
        op: &str,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;

        let mut primary_ok = false;
        if let Some(redis) = &self.redis {
            match redis.set_ex(key, &json, ttl_seconds).await {
                Ok(()) => primary_ok = true,
                Err(e) => warn!(key = %key, op, error = %e, "primary store write failed"),
            }
        }

        if self.require_primary && !primary_ok {
            return Err(StoreError::Unavailable);
        }

        let mut secondary_ok = false;
        if let Some(file) = &self.file {
            match file.put(key, record, ttl_seconds).await {
                Ok(()) => secondary_ok = true,
                Err(e) => warn!(key = %key, op, error = %e, "secondary store write failed"),
            }
        }

        if primary_ok || secondary_ok {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    /// Primary-first read. Backend failures and malformed blobs are logged
    /// and treated as absence, so a flaky primary degrades to the secondary
    /// instead of failing the request.
    pub async fn retrieve(&self, key: &str) -> Option<ShareRecord> {
        if let Some(redis) = &self.redis {
            match redis.get(key).await {
                Ok(Some(raw)) => match parse_record(&raw) {
                    Ok(record) => return Some(record),
                    Err(e) => warn!(key = %key, error = %e, "primary returned malformed record"),
                },
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "primary store read failed"),
            }
        }

        if let Some(file) = &self.file {
            match file.get(key).await {
                Ok(Some(record)) => {
                    debug!(key = %key, "served from file store");
                    return Some(record);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "secondary store read failed"),
            }
        }

        None
    }

    /// Best-effort delete from every backend. Failures are logged, never
    /// returned: by the time a share is being removed it is already spent
    /// or expired, and the TTL will finish the job.
    pub async fn remove(&self, key: &str) {
        if let Some(redis) = &self.redis {
            if let Err(e) = redis.delete(key).await {
                warn!(key = %key, error = %e, "primary store delete failed");
            }
        }
        if let Some(file) = &self.file {
            if let Err(e) = file.remove(key).await {
                warn!(key = %key, error = %e, "secondary store delete failed");
            }
        }
    }
}
