//! Content-addressed embedding cache with batched persistence
//!
//! The in-memory map is authoritative. Every `flush_every` new entries a
//! snapshot is written to disk by a spawned task; the request that triggered
//! it does not wait. Writes are serialized and versioned so a slow, older
//! snapshot never replaces a newer one on disk.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use sha2::Digest;
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::errors::Result;
use crate::models::EmbeddingRecord;

/// SHA-256 of the exact text, hex encoded (64 chars)
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub flushes: u64,
    pub flush_failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
}

/// State shared between the cache handle and its flush tasks
struct SharedCache {
    entries: DashMap<String, Vec<f32>>,
    version: AtomicU64,
    path: PathBuf,
    write_lock: Mutex<()>,
    written_version: AtomicU64,
    counters: Counters,
}

impl SharedCache {
    /// Copy of the entries together with the version it covers
    ///
    /// The version is read first: every insert counted in it has already
    /// landed in the map, so the snapshot is never older than its label.
    fn snapshot(&self) -> (BTreeMap<String, Vec<f32>>, u64) {
        let version = self.version.load(Ordering::SeqCst);
        let snapshot = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        (snapshot, version)
    }

    /// Write the current entries, counting a failure
    async fn persist(&self) -> Result<()> {
        let result = self.write_snapshot().await;
        if result.is_err() {
            self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Snapshot under the write lock, unless a newer version already reached disk
    async fn write_snapshot(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (snapshot, version) = self.snapshot();
        if self.written_version.load(Ordering::SeqCst) > version {
            debug!(version, "Skipping stale embedding cache snapshot");
            return Ok(());
        }

        let body = serde_json::to_vec(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        self.written_version.store(version, Ordering::SeqCst);
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        info!("Embedding cache saved: {} entries", snapshot.len());
        Ok(())
    }
}

/// Embedding cache keyed by text hash
pub struct EmbeddingCache {
    shared: Arc<SharedCache>,
    flush_every: usize,
    pending: AtomicUsize,
}

impl EmbeddingCache {
    /// Open the cache stored at `path`, creating its directory if needed
    ///
    /// A missing file yields an empty cache; an unreadable or corrupt file is
    /// logged and also yields an empty cache.
    pub fn open(path: impl Into<PathBuf>, flush_every: usize) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
                info!("Created embedding cache directory: {}", dir.display());
            }
        }

        let entries = DashMap::new();
        for (hash, vector) in load_snapshot(&path) {
            entries.insert(hash, vector);
        }
        if !entries.is_empty() {
            info!("Embedding cache loaded: {} entries", entries.len());
        }

        Ok(Self {
            shared: Arc::new(SharedCache {
                entries,
                version: AtomicU64::new(0),
                path,
                write_lock: Mutex::new(()),
                written_version: AtomicU64::new(0),
                counters: Counters::default(),
            }),
            flush_every: flush_every.max(1),
            pending: AtomicUsize::new(0),
        })
    }

    pub fn get(&self, text_hash: &str) -> Option<Vec<f32>> {
        let found = self
            .shared
            .entries
            .get(text_hash)
            .map(|v| v.value().clone());
        let counters = &self.shared.counters;
        let counter = if found.is_some() {
            &counters.hits
        } else {
            &counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a record; schedules a background flush every `flush_every` inserts
    pub fn insert(&self, record: EmbeddingRecord) {
        self.shared.entries.insert(record.text_hash, record.vector);
        self.shared.version.fetch_add(1, Ordering::SeqCst);

        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if pending >= self.flush_every && self.pending.swap(0, Ordering::SeqCst) >= self.flush_every
        {
            self.schedule_flush();
        }
    }

    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Location of the cache document
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.shared.counters;
        CacheStats {
            entries: self.shared.entries.len(),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            flushes: counters.flushes.load(Ordering::Relaxed),
            flush_failures: counters.flush_failures.load(Ordering::Relaxed),
        }
    }

    /// Write the current contents to disk and wait for it
    pub async fn flush(&self) -> Result<()> {
        self.pending.store(0, Ordering::SeqCst);
        self.shared.persist().await
    }

    /// Drop every entry and persist the empty state
    pub async fn clear(&self) -> Result<()> {
        self.shared.entries.clear();
        self.shared.version.fetch_add(1, Ordering::SeqCst);
        self.flush().await?;
        info!("Embedding cache cleared");
        Ok(())
    }

    /// Persist from a spawned task; the snapshot is taken there, not here
    fn schedule_flush(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, embedding cache flush postponed");
            return;
        };

        let shared = Arc::clone(&self.shared);
        handle.spawn(async move {
            if let Err(e) = shared.persist().await {
                error!("Failed to save embedding cache: {}", e);
            }
        });
    }
}

fn load_snapshot(path: &Path) -> BTreeMap<String, Vec<f32>> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            error!("Failed to read embedding cache {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    match serde_json::from_slice(&content) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Corrupt embedding cache {}, starting empty: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}
