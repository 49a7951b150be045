// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application configuration
//!
//! A single hierarchical config tree merged from defaults -> file ->
//! environment -> CLI flags (§6). Worker counts, timeouts, and cache sizes
//! are hot-reloadable; storage backend and registered processors are
//! structural and require a restart to change.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};

use docpipe_domain::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    pub cooperative_workers: usize,
    pub thread_workers: usize,
    pub process_workers: usize,
    pub high_water_cpu_pct: f64,
    pub low_water_cpu_pct: f64,
    pub high_water_memory_pct: f64,
    pub low_water_memory_pct: f64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            cooperative_workers: cores,
            thread_workers: cores.saturating_sub(1).max(1),
            process_workers: (cores / 2).max(1),
            high_water_cpu_pct: 90.0,
            low_water_cpu_pct: 70.0,
            high_water_memory_pct: 85.0,
            low_water_memory_pct: 65.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub l1_max_entries: usize,
    pub l2_directory: PathBuf,
    pub l2_max_bytes: u64,
    pub l3_remote_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: 512,
            l2_directory: PathBuf::from("./data/cache"),
            l2_max_bytes: 10 * 1024 * 1024 * 1024,
            l3_remote_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub database_url: String,
    pub blob_directory: PathBuf,
    pub upload_session_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/docpipe.db".to_string(),
            blob_directory: PathBuf::from("./data/blobs"),
            upload_session_ttl_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventBusConfig {
    pub queue_capacity: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            shutdown_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressConfig {
    pub min_emit_interval_ms: u64,
    pub emit_delta_fraction: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_emit_interval_ms: 500,
            emit_delta_fraction: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

/// Root of the merged configuration tree.
///
/// `worker_pool`, `cache`, `event_bus`, `progress`, and `observability` are
/// hot-reloadable. `storage` is structural: changing the backend or blob
/// directory requires a process restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub worker_pool: WorkerPoolConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub event_bus: EventBusConfig,
    pub progress: ProgressConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Loads the merged tree: built-in defaults, then an optional file at
    /// `path` (TOML or YAML by extension), then `DOCPIPE_*` environment
    /// variables (double-underscore nested, e.g. `DOCPIPE_CACHE__L1_MAX_ENTRIES`).
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let defaults = AppConfig::default();
        let mut builder = Config::builder()
            .set_default("worker_pool.cooperative_workers", defaults.worker_pool.cooperative_workers as i64)
            .map_err(config_err)?
            .set_default("worker_pool.thread_workers", defaults.worker_pool.thread_workers as i64)
            .map_err(config_err)?
            .set_default("worker_pool.process_workers", defaults.worker_pool.process_workers as i64)
            .map_err(config_err)?
            .set_default("worker_pool.high_water_cpu_pct", defaults.worker_pool.high_water_cpu_pct)
            .map_err(config_err)?
            .set_default("worker_pool.low_water_cpu_pct", defaults.worker_pool.low_water_cpu_pct)
            .map_err(config_err)?
            .set_default("worker_pool.high_water_memory_pct", defaults.worker_pool.high_water_memory_pct)
            .map_err(config_err)?
            .set_default("worker_pool.low_water_memory_pct", defaults.worker_pool.low_water_memory_pct)
            .map_err(config_err)?
            .set_default("cache.l1_max_entries", defaults.cache.l1_max_entries as i64)
            .map_err(config_err)?
            .set_default("cache.l2_directory", defaults.cache.l2_directory.to_string_lossy().to_string())
            .map_err(config_err)?
            .set_default("cache.l2_max_bytes", defaults.cache.l2_max_bytes as i64)
            .map_err(config_err)?
            .set_default("storage.database_url", defaults.storage.database_url.clone())
            .map_err(config_err)?
            .set_default("storage.blob_directory", defaults.storage.blob_directory.to_string_lossy().to_string())
            .map_err(config_err)?
            .set_default("storage.upload_session_ttl_secs", defaults.storage.upload_session_ttl_secs as i64)
            .map_err(config_err)?
            .set_default("event_bus.queue_capacity", defaults.event_bus.queue_capacity as i64)
            .map_err(config_err)?
            .set_default("event_bus.shutdown_grace_secs", defaults.event_bus.shutdown_grace_secs as i64)
            .map_err(config_err)?
            .set_default("progress.min_emit_interval_ms", defaults.progress.min_emit_interval_ms as i64)
            .map_err(config_err)?
            .set_default("progress.emit_delta_fraction", defaults.progress.emit_delta_fraction)
            .map_err(config_err)?
            .set_default("observability.log_level", defaults.observability.log_level.clone())
            .map_err(config_err)?
            .set_default("observability.metrics_enabled", defaults.observability.metrics_enabled)
            .map_err(config_err)?
            .set_default("observability.metrics_port", defaults.observability.metrics_port as i64)
            .map_err(config_err)?;

        if let Some(path) = path {
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("DOCPIPE").separator("__"));

        let merged = builder.build().map_err(config_err)?;
        merged.try_deserialize().map_err(config_err)
    }

    pub fn metrics_port(&self) -> u16 {
        self.observability.metrics_port
    }

    pub fn upload_session_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.upload_session_ttl_secs)
    }

    pub fn event_queue_capacity(&self) -> usize {
        self.event_bus.queue_capacity
    }
}

fn config_err(e: config::ConfigError) -> CoreError {
    CoreError::invalid_config(e.to_string())
}

/// Thread-safe holder for the parts of [`AppConfig`] that are hot-reloadable
/// at runtime (worker counts, timeouts, cache sizes per §6). Structural
/// fields (`storage`) are fixed at construction.
pub struct ConfigService {
    current: RwLock<AppConfig>,
}

impl ConfigService {
    pub fn new(initial: AppConfig) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn current(&self) -> AppConfig {
        self.current.read().expect("config lock poisoned").clone()
    }

    /// Replaces the non-structural portions of the config in place. The
    /// `storage` backend of `next` is ignored; structural changes require a
    /// process restart per §6.
    pub fn reload(&self, next: AppConfig) {
        let mut guard = self.current.write().expect("config lock poisoned");
        let storage = guard.storage.clone();
        *guard = next;
        guard.storage = storage;
    }

    pub fn metrics_port(&self) -> u16 {
        self.current().metrics_port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let cfg = AppConfig::load(None).unwrap();
        assert_eq!(cfg.observability.metrics_port, 9090);
        assert!(cfg.worker_pool.cooperative_workers >= 1);
    }

    #[test]
    fn reload_preserves_structural_storage_config() {
        let initial = AppConfig::default();
        let svc = ConfigService::new(initial.clone());
        let mut next = initial.clone();
        next.worker_pool.thread_workers = 99;
        next.storage.database_url = "sqlite://should-not-apply.db".to_string();
        svc.reload(next);

        let current = svc.current();
        assert_eq!(current.worker_pool.thread_workers, 99);
        assert_eq!(current.storage.database_url, initial.storage.database_url);
    }
}
