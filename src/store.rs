//! Durable blob storage.
//!
//! The pipeline only needs what a plain object store offers: get, put, a
//! metadata read and a visibility toggle. There are no transactions; the
//! read-merge-write protocol in [`crate::publish`] is built on top of these
//! calls and assumes a single writer per key per run.
//!
//! # Backends
//!
//! - [`FsBlobStore`]: a directory tree. Objects are written to a temp file and
//!   renamed into place, with headers kept in a `<key>.meta.json` sidecar.
//! - [`MemoryBlobStore`]: process-local map, with fault injection for tests.
//!
//! # Keys
//!
//! ```text
//! news/news_<topic>.json   one per topic, topic name URL-encoded
//! news/news_all.json       the derived aggregate
//! ```

use crate::catalog::AGGREGATE_TOPIC;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CACHE_CONTROL: &str = "public, max-age=300";

/// Storage key of a topic's dataset.
pub fn topic_key(topic: &str) -> String {
    format!("news/news_{}.json", urlencoding::encode(topic))
}

/// Storage key of the aggregate dataset.
pub fn aggregate_key() -> String {
    topic_key(AGGREGATE_TOPIC)
}

/// Headers and size of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
    pub cache_control: String,
}

/// Minimal object store contract.
pub trait BlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Object contents, or `None` if the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StoreError>;

    async fn metadata(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    /// Make the object readable by the downstream reader.
    async fn make_public(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: BlobStore> BlobStore for &T {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StoreError> {
        (**self).put(key, bytes, content_type, cache_control).await
    }

    async fn metadata(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        (**self).metadata(key).await
    }

    async fn make_public(&self, key: &str) -> Result<(), StoreError> {
        (**self).make_public(key).await
    }
}

/// Directory-backed [`BlobStore`].
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    cache_control: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto the directory tree, refusing anything that could escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StoreError::Backend(format!("invalid key '{key}'")));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn sidecar_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write via a sibling temp file and rename, so readers never see a partial object.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

impl BlobStore for FsBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.object_path(key)?).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        read_optional(&self.object_path(key)?).await
    }

    #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        let sidecar = serde_json::to_vec_pretty(&Sidecar {
            content_type: content_type.to_string(),
            cache_control: cache_control.to_string(),
        })?;
        write_atomic(&Self::sidecar_path(&path), &sidecar).await?;
        write_atomic(&path, bytes).await?;
        debug!(path = %path.display(), "Stored object");
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let path = self.object_path(key)?;
        let stat = match fs::metadata(&path).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let sidecar = match read_optional(&Self::sidecar_path(&path)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Sidecar {
                content_type: CONTENT_TYPE_JSON.to_string(),
                cache_control: String::new(),
            },
        };
        Ok(Some(ObjectMeta {
            size: stat.len(),
            last_modified: DateTime::<Utc>::from(stat.modified()?),
            content_type: sidecar.content_type,
            cache_control: sidecar.cache_control,
        }))
    }

    async fn make_public(&self, key: &str) -> Result<(), StoreError> {
        // Files under the root are served as-is; nothing to flip.
        debug!(key, "make_public is a no-op for the filesystem store");
        Ok(())
    }
}

#[cfg(test)]
pub use memory::MemoryBlobStore;

#[cfg(test)]
mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Object {
        bytes: Vec<u8>,
        meta: ObjectMeta,
        public: bool,
    }

    /// In-process [`BlobStore`].
    ///
    /// Keys registered with [`MemoryBlobStore::fail_writes`] reject every put;
    /// keys registered with [`MemoryBlobStore::stale_reads`] accept puts but
    /// keep serving the previous object, like a lagging replica.
    #[derive(Debug, Default)]
    pub struct MemoryBlobStore {
        objects: Mutex<HashMap<String, Object>>,
        fail_writes: HashSet<String>,
        stale_reads: HashSet<String>,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_writes(mut self, key: &str) -> Self {
            self.fail_writes.insert(key.to_string());
            self
        }

        pub fn stale_reads(mut self, key: &str) -> Self {
            self.stale_reads.insert(key.to_string());
            self
        }

        /// Seed an object without going through [`BlobStore::put`].
        pub fn insert(&self, key: &str, bytes: Vec<u8>) {
            let meta = ObjectMeta {
                size: bytes.len() as u64,
                last_modified: Utc::now(),
                content_type: CONTENT_TYPE_JSON.to_string(),
                cache_control: CACHE_CONTROL.to_string(),
            };
            self.lock().insert(
                key.to_string(),
                Object {
                    bytes,
                    meta,
                    public: true,
                },
            );
        }

        pub fn is_public(&self, key: &str) -> bool {
            self.lock().get(key).is_some_and(|o| o.public)
        }

        pub fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.lock().keys().cloned().collect();
            keys.sort();
            keys
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Object>> {
            // A poisoned map is still a usable map.
            self.objects.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    impl BlobStore for MemoryBlobStore {
        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            Ok(self.lock().contains_key(key))
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.lock().get(key).map(|o| o.bytes.clone()))
        }

        async fn put(
            &self,
            key: &str,
            bytes: &[u8],
            content_type: &str,
            cache_control: &str,
        ) -> Result<(), StoreError> {
            if self.fail_writes.contains(key) {
                return Err(StoreError::Backend(format!("write rejected for '{key}'")));
            }
            if self.stale_reads.contains(key) {
                return Ok(());
            }
            let meta = ObjectMeta {
                size: bytes.len() as u64,
                last_modified: Utc::now(),
                content_type: content_type.to_string(),
                cache_control: cache_control.to_string(),
            };
            self.lock().insert(
                key.to_string(),
                Object {
                    bytes: bytes.to_vec(),
                    meta,
                    public: false,
                },
            );
            Ok(())
        }

        async fn metadata(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
            Ok(self.lock().get(key).map(|o| o.meta.clone()))
        }

        async fn make_public(&self, key: &str) -> Result<(), StoreError> {
            match self.lock().get_mut(key) {
                Some(object) => {
                    object.public = true;
                    Ok(())
                }
                None => Err(StoreError::Backend(format!("no object at '{key}'"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("topic_digest_{name}_{}_{nanos}", std::process::id()))
    }

    #[test]
    fn test_keys() {
        assert_eq!(topic_key("world"), "news/news_world.json");
        assert_eq!(topic_key("arts & culture"), "news/news_arts%20%26%20culture.json");
        assert_eq!(aggregate_key(), "news/news_all.json");
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip_and_metadata() {
        let root = scratch_dir("roundtrip");
        let store = FsBlobStore::new(&root);
        let key = topic_key("world");

        assert!(!store.exists(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(store.metadata(&key).await.unwrap(), None);

        store.put(&key, b"{\"a\":1}", CONTENT_TYPE_JSON, CACHE_CONTROL).await.unwrap();
        store.make_public(&key).await.unwrap();

        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"{\"a\":1}"[..]));
        let meta = store.metadata(&key).await.unwrap().unwrap();
        assert_eq!(meta.size, 7);
        assert_eq!(meta.content_type, CONTENT_TYPE_JSON);
        assert_eq!(meta.cache_control, CACHE_CONTROL);

        // overwrite replaces atomically
        store.put(&key, b"[]", CONTENT_TYPE_JSON, CACHE_CONTROL).await.unwrap();
        assert_eq!(store.metadata(&key).await.unwrap().unwrap().size, 2);
        assert!(!root.join("news/news_world.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_fs_store_rejects_escaping_keys() {
        let store = FsBlobStore::new(scratch_dir("escape"));
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.put("news//x.json", b"", CONTENT_TYPE_JSON, CACHE_CONTROL).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_fault_injection() {
        let store = MemoryBlobStore::new()
            .fail_writes("news/news_bad.json")
            .stale_reads("news/news_lag.json");

        assert!(store.put("news/news_bad.json", b"x", CONTENT_TYPE_JSON, CACHE_CONTROL).await.is_err());

        store.put("news/news_lag.json", b"x", CONTENT_TYPE_JSON, CACHE_CONTROL).await.unwrap();
        assert_eq!(store.get("news/news_lag.json").await.unwrap(), None);

        store.put("news/news_ok.json", b"x", CONTENT_TYPE_JSON, CACHE_CONTROL).await.unwrap();
        assert!(!store.is_public("news/news_ok.json"));
        store.make_public("news/news_ok.json").await.unwrap();
        assert!(store.is_public("news/news_ok.json"));
    }
}
