use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::StoreError;
use crate::model::ShareRecord;

/// One persisted share plus the epoch-millis deadline used for purging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    record: ShareRecord,
    expires_at_epoch_millis: i64,
}

/// Durable fallback store: a single JSON map file, rewritten whole on every
/// mutation. The mutex serializes each load-modify-save cycle, which makes
/// this safe for one process only; multi-process deployments need the
/// primary store.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn put(
        &self,
        key: &str,
        record: &ShareRecord,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load()?;
        map.insert(
            key.to_owned(),
            FileEntry {
                record: record.clone(),
                expires_at_epoch_millis: Utc::now().timestamp_millis()
                    + ttl_seconds as i64 * 1000,
            },
        );
        self.save(&map)?;
        debug!(key = %key, ttl_seconds, "stored in file store");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<ShareRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let map = self.load()?;
        Ok(map.get(key).map(|entry| entry.record.clone()))
    }

    /// Returns true if the key existed.
    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load()?;
        let existed = map.remove(key).is_some();
        if existed {
            self.save(&map)?;
        }
        Ok(existed)
    }

    /// Read the map, dropping entries whose deadline has passed. A purge is
    /// persisted immediately so expired ciphertext does not outlive its TTL
    /// on disk. A missing file is an empty map; an unparseable file is
    /// treated the same after a warning, and the next save replaces it.
    fn load(&self) -> Result<HashMap<String, FileEntry>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut map: HashMap<String, FileEntry> = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "file store unreadable, starting empty");
                return Ok(HashMap::new());
            }
        };

        let now = Utc::now().timestamp_millis();
        let before = map.len();
        map.retain(|_, entry| entry.expires_at_epoch_millis > now);
        let purged = before - map.len();
        if purged > 0 {
            debug!(purged, "purged expired file entries");
            self.save(&map)?;
        }

        Ok(map)
    }

    fn save(&self, map: &HashMap<String, FileEntry>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
