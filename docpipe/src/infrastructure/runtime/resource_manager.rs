// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Global Resource Manager
//!
//! This module provides centralized resource governance across the entire
//! application, preventing resource oversubscription when processing multiple
//! files concurrently.
//!
//! ## Architecture Pattern: Two-Level Resource Governance
//!
//! **Problem:** Without global limits, multiple concurrent files can overwhelm
//! the system:
//! - 10 files × 8 workers/file = 80 concurrent tasks on an 8-core machine
//! - Result: CPU oversubscription, cache thrashing, poor throughput
//!
//! **Solution:** Two-level coordination:
//! 1. **Global limits** (this module) - Cap total system resources
//! 2. **Local limits** (per-file semaphores) - Cap per-file concurrency
//!
//! ## Example
//!
//! One instance is constructed at startup and handed to every collaborator
//! that needs it (the worker pool, stage dispatch) as an injected `Arc` --
//! there is no global accessor.
//!
//! ```rust,ignore
//! async fn process_file(resources: &GlobalResourceManager, file_semaphore: &Semaphore) -> Result<()> {
//!     // 1. Acquire global CPU token (waits if system is saturated)
//!     let _cpu_permit = resources.acquire_cpu().await?;
//!
//!     // 2. Acquire local per-file token
//!     let _local_permit = file_semaphore.acquire().await?;
//!
//!     // 3. Do CPU-intensive work
//!     compress_data().await?;
//!
//!     // 4. Both permits released automatically (RAII)
//!     Ok(())
//! }
//! ```
//!
//! ## Resource Types
//!
//! ### CPU Tokens
//! - **Purpose:** Limit total CPU-bound work across all files
//! - **Default:** `available_cores - 1` (leave one for OS/I/O)
//! - **Use:** Acquire before CPU-intensive stage work
//!
//! ### I/O Tokens
//! - **Purpose:** Prevent I/O queue overrun
//! - **Default:** Device-specific (NVMe: 24, SSD: 12, HDD: 4)
//! - **Use:** Acquire before file reads/writes
//!
//! ### Memory Tracking
//! - **Purpose:** Monitor memory usage (gauge only, no enforcement yet)
//! - **Default:** No limit (soft monitoring)
//! - **Future:** Can add hard cap in Phase 3

use docpipe_domain::CoreError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Storage device type for I/O queue depth optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// NVMe SSD - High queue depth (24-32)
    NVMe,
    /// SATA SSD - Medium queue depth (8-16)
    Ssd,
    /// Hard Disk Drive - Low queue depth (2-4)
    Hdd,
    /// Auto-detect based on system
    Auto,
    /// Custom queue depth
    Custom(usize),
}

/// Configuration for global resource manager
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Number of CPU worker tokens (default: cores - 1)
    pub cpu_tokens: Option<usize>,

    /// Number of I/O tokens (default: device-specific)
    pub io_tokens: Option<usize>,

    /// Storage device type for I/O optimization
    pub storage_type: StorageType,

    /// Soft memory limit in bytes (gauge only, no enforcement)
    pub memory_limit: Option<usize>,

    /// Hysteresis watermarks (percent) gating new Thread/Process admission.
    /// Cooperative (IO-bound) work is never gated by these -- only CPU/memory
    /// saturation matters for it, which `cpu_tokens`/`io_tokens` already cap.
    pub high_water_cpu_pct: f64,
    pub low_water_cpu_pct: f64,
    pub high_water_memory_pct: f64,
    pub low_water_memory_pct: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cpu_tokens: None, // Will use cores - 1
            io_tokens: None,  // Will use device-specific
            storage_type: StorageType::Auto,
            memory_limit: None, // No limit by default
            high_water_cpu_pct: 90.0,
            low_water_cpu_pct: 70.0,
            high_water_memory_pct: 85.0,
            low_water_memory_pct: 65.0,
        }
    }
}

impl ResourceConfig {
    /// Builds a `ResourceConfig` from the application's worker pool
    /// configuration, carrying over its hysteresis watermarks and thread
    /// counts.
    pub fn from_worker_pool_config(config: &crate::infrastructure::config::WorkerPoolConfig) -> Self {
        Self {
            cpu_tokens: Some(config.thread_workers.max(1)),
            io_tokens: Some(config.cooperative_workers.max(1)),
            storage_type: StorageType::Auto,
            memory_limit: None,
            high_water_cpu_pct: config.high_water_cpu_pct,
            low_water_cpu_pct: config.low_water_cpu_pct,
            high_water_memory_pct: config.high_water_memory_pct,
            low_water_memory_pct: config.low_water_memory_pct,
        }
    }
}

/// Hysteresis gate over a single utilization signal (CPU or memory): once it
/// trips `high`, admission stays throttled until utilization falls back to
/// `low`, preventing the gate from chattering at the boundary.
struct HysteresisGate {
    high: f64,
    low: f64,
    tripped: AtomicBool,
}

impl HysteresisGate {
    fn new(high: f64, low: f64) -> Self {
        Self {
            high,
            low,
            tripped: AtomicBool::new(false),
        }
    }

    fn record(&self, utilization_pct: f64) {
        if utilization_pct >= self.high {
            self.tripped.store(true, Ordering::SeqCst);
        } else if utilization_pct <= self.low {
            self.tripped.store(false, Ordering::SeqCst);
        }
    }

    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// Global resource manager for system-wide resource coordination
///
/// ## Design Pattern: Centralized Resource Governance
///
/// This manager prevents resource oversubscription by providing a global
/// pool of CPU and I/O tokens that must be acquired before work begins.
///
/// ## Educational Notes
///
/// **Why semaphores?**
/// - Semaphores provide backpressure: work waits when resources are saturated
/// - RAII permits auto-release resources on drop
/// - Async-aware: integrates with Tokio runtime
///
/// **Why separate CPU and I/O tokens?**
/// - CPU work and I/O work have different characteristics
/// - CPU: Limited by cores, benefits from parallelism = cores
/// - I/O: Limited by device queue depth, different optimal values
///
/// **Why memory as gauge only?**
/// - Memory is harder to predict and control
/// - Start with monitoring, add enforcement later if needed
/// - Avoids complexity in Phase 1
pub struct GlobalResourceManager {
    /// CPU worker tokens (semaphore permits)
    ///
    /// **Purpose:** Prevent CPU oversubscription
    /// **Typical value:** cores - 1
    /// **Educational:** This is a "counting semaphore" that allows N concurrent
    /// operations
    cpu_tokens: Arc<Semaphore>,

    /// I/O operation tokens (semaphore permits)
    ///
    /// **Purpose:** Prevent I/O queue overrun
    /// **Typical value:** Device-specific (NVMe: 24, SSD: 12, HDD: 4)
    /// **Educational:** Different devices have different optimal queue depths
    io_tokens: Arc<Semaphore>,

    /// Memory usage gauge (bytes)
    ///
    /// **Purpose:** Monitor memory pressure (no enforcement yet)
    /// **Educational:** Start simple (gauge), add limits later (Phase 3)
    memory_used: Arc<AtomicUsize>,

    /// Total memory capacity for reporting
    memory_capacity: usize,

    /// Number of CPU tokens configured
    cpu_token_count: usize,

    /// Number of I/O tokens configured
    io_token_count: usize,

    /// CPU utilization hysteresis gate
    cpu_gate: HysteresisGate,

    /// Memory utilization hysteresis gate
    memory_gate: HysteresisGate,
}

impl GlobalResourceManager {
    /// Creates a new global resource manager with the given configuration
    ///
    /// ## Educational: Resource Detection and Configuration
    ///
    /// This method demonstrates:
    /// - Auto-detection of system resources (CPU cores)
    /// - Device-specific I/O optimization
    /// - Sensible defaults with override capability
    ///
    /// ## Examples
    ///
    /// ```rust,ignore
    /// // Use defaults (auto-detected)
    /// let manager = GlobalResourceManager::new(Default::default())?;
    ///
    /// // Custom configuration
    /// let manager = GlobalResourceManager::new(ResourceConfig {
    ///     cpu_tokens: Some(6),  // Override: use 6 CPU workers
    ///     storage_type: StorageType::NVMe,
    ///     ..Default::default()
    /// })?;
    /// ```
    pub fn new(config: ResourceConfig) -> Result<Self, CoreError> {
        // Detect available CPU cores
        let available_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4); // Conservative fallback

        // Educational: Why cores - 1?
        // Leave one core for OS, I/O threads, and system tasks
        // Prevents complete CPU saturation which hurts overall system responsiveness
        let cpu_token_count = config.cpu_tokens.unwrap_or_else(|| (available_cores - 1).max(1));

        // Educational: Device-specific I/O queue depths
        // Different storage devices have different optimal concurrency levels
        let io_token_count = config
            .io_tokens
            .unwrap_or_else(|| Self::detect_optimal_io_tokens(config.storage_type));

        // Educational: Memory capacity detection
        // On most systems, we can query available RAM
        // For now, use a conservative default if not specified
        let memory_capacity = config.memory_limit.unwrap_or(40 * 1024 * 1024 * 1024); // 40GB default

        Ok(Self {
            cpu_tokens: Arc::new(Semaphore::new(cpu_token_count)),
            io_tokens: Arc::new(Semaphore::new(io_token_count)),
            memory_used: Arc::new(AtomicUsize::new(0)),
            memory_capacity,
            cpu_token_count,
            io_token_count,
            cpu_gate: HysteresisGate::new(config.high_water_cpu_pct, config.low_water_cpu_pct),
            memory_gate: HysteresisGate::new(config.high_water_memory_pct, config.low_water_memory_pct),
        })
    }

    /// Percentage of CPU tokens currently checked out.
    pub fn cpu_utilization_pct(&self) -> f64 {
        let used = self.cpu_token_count.saturating_sub(self.cpu_tokens_available());
        100.0 * used as f64 / self.cpu_token_count.max(1) as f64
    }

    /// Percentage of the configured memory capacity currently allocated.
    pub fn memory_utilization_pct(&self) -> f64 {
        100.0 * self.memory_used() as f64 / self.memory_capacity.max(1) as f64
    }

    /// Re-samples both utilization gauges against the hysteresis watermarks.
    /// Call this before admitting new Thread/Process class work; Cooperative
    /// (IO-bound) work is never throttled by it.
    pub fn sample_hysteresis(&self) {
        self.cpu_gate.record(self.cpu_utilization_pct());
        self.memory_gate.record(self.memory_utilization_pct());
    }

    /// Whether admission of new CPU-bound work should be throttled. Trips at
    /// the high watermark and stays tripped until utilization falls back to
    /// the low watermark (hysteresis, not an instantaneous threshold), to
    /// avoid oscillating admission at the boundary.
    pub fn is_admission_throttled(&self) -> bool {
        self.sample_hysteresis();
        self.cpu_gate.is_tripped() || self.memory_gate.is_tripped()
    }

    /// Detect optimal I/O token count based on storage type
    ///
    /// ## Educational: Device Characteristics
    ///
    /// **NVMe (24-32 tokens):**
    /// - Multiple parallel channels
    /// - Low latency, high throughput
    /// - Benefits from high queue depth
    ///
    /// **SSD (8-16 tokens):**
    /// - Medium parallelism
    /// - Good random access
    /// - Moderate queue depth optimal
    ///
    /// **HDD (2-4 tokens):**
    /// - Sequential access preferred
    /// - High seek latency
    /// - Low queue depth prevents thrashing
    fn detect_optimal_io_tokens(storage_type: StorageType) -> usize {
        match storage_type {
            StorageType::NVMe => 24,
            StorageType::Ssd => 12,
            StorageType::Hdd => 4,
            StorageType::Auto => {
                // Educational: Simple heuristic
                // In production, would query device capabilities
                // For now, assume SSD as reasonable default
                12
            }
            StorageType::Custom(n) => n,
        }
    }

    /// Acquire a CPU token (explicit style - pedagogical)
    ///
    /// ## Educational Pattern: Explicit Acquisition
    ///
    /// This method shows the explicit pattern where you:
    /// 1. Call acquire
    /// 2. Get back a permit
    /// 3. Permit is held as long as the guard lives
    /// 4. Permit is auto-released when dropped (RAII)
    ///
    /// ## Usage
    ///
    /// ```rust,ignore
    /// let _cpu_permit = resources.acquire_cpu().await?;
    /// // Do CPU work
    /// // Permit auto-released here when _cpu_permit goes out of scope
    /// ```
    ///
    /// ## Backpressure
    ///
    /// If all CPU tokens are in use, this method **waits** until one becomes
    /// available. This creates natural backpressure and prevents
    /// oversubscription.
    pub async fn acquire_cpu(&self) -> Result<SemaphorePermit<'_>, CoreError> {
        self.cpu_tokens
            .acquire()
            .await
            .map_err(|_| CoreError::InternalError("CPU semaphore closed".to_string()))
    }

    /// Acquire an I/O token
    ///
    /// ## Educational: Same pattern as CPU tokens
    ///
    /// Uses the same semaphore pattern but for I/O operations.
    /// Prevents too many concurrent I/O operations from overwhelming
    /// the storage device.
    ///
    /// ## Usage
    ///
    /// ```rust,ignore
    /// let _io_permit = resources.acquire_io().await?;
    /// // Do I/O operation (read/write)
    /// // Permit auto-released
    /// ```
    pub async fn acquire_io(&self) -> Result<SemaphorePermit<'_>, CoreError> {
        self.io_tokens
            .acquire()
            .await
            .map_err(|_| CoreError::InternalError("I/O semaphore closed".to_string()))
    }

    /// Track memory allocation (gauge only, no enforcement)
    ///
    /// ## Educational: Simple Atomic Counter
    ///
    /// Uses `Ordering::Relaxed` because:
    /// - We only need atomicity (no torn reads/writes)
    /// - No coordination with other atomic variables needed
    /// - This is just a gauge for monitoring
    ///
    /// See atomic_ordering.rs for more on ordering choices.
    pub fn allocate_memory(&self, bytes: usize) {
        self.memory_used.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Track memory deallocation
    pub fn deallocate_memory(&self, bytes: usize) {
        self.memory_used.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Get current memory usage
    pub fn memory_used(&self) -> usize {
        self.memory_used.load(Ordering::Relaxed)
    }

    /// Get memory capacity
    pub fn memory_capacity(&self) -> usize {
        self.memory_capacity
    }

    /// Get number of available CPU tokens
    ///
    /// ## Educational: Observability
    ///
    /// This method provides visibility into resource saturation.
    /// If available_permits() is consistently 0, you're CPU-saturated.
    pub fn cpu_tokens_available(&self) -> usize {
        self.cpu_tokens.available_permits()
    }

    /// Get total number of CPU tokens
    pub fn cpu_tokens_total(&self) -> usize {
        self.cpu_token_count
    }

    /// Get number of available I/O tokens
    pub fn io_tokens_available(&self) -> usize {
        self.io_tokens.available_permits()
    }

    /// Get total number of I/O tokens
    pub fn io_tokens_total(&self) -> usize {
        self.io_token_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_manager_creation() {
        let manager = GlobalResourceManager::new(ResourceConfig::default()).unwrap();

        // Should have at least 1 CPU token
        assert!(manager.cpu_tokens_total() >= 1);

        // Should have I/O tokens
        assert!(manager.io_tokens_total() > 0);

        // Initially all tokens available
        assert_eq!(manager.cpu_tokens_available(), manager.cpu_tokens_total());
        assert_eq!(manager.io_tokens_available(), manager.io_tokens_total());
    }

    #[test]
    fn test_device_type_queue_depths() {
        let nvme_qd = GlobalResourceManager::detect_optimal_io_tokens(StorageType::NVMe);
        let ssd_qd = GlobalResourceManager::detect_optimal_io_tokens(StorageType::Ssd);
        let hdd_qd = GlobalResourceManager::detect_optimal_io_tokens(StorageType::Hdd);

        // NVMe should have highest queue depth
        assert!(nvme_qd > ssd_qd);
        assert!(ssd_qd > hdd_qd);

        // Specific values
        assert_eq!(nvme_qd, 24);
        assert_eq!(ssd_qd, 12);
        assert_eq!(hdd_qd, 4);
    }

    #[tokio::test]
    async fn test_cpu_token_acquisition() {
        let manager = GlobalResourceManager::new(ResourceConfig {
            cpu_tokens: Some(2),
            ..Default::default()
        })
        .unwrap();

        // Initially 2 available
        assert_eq!(manager.cpu_tokens_available(), 2);

        // Acquire one
        let _permit1 = manager.acquire_cpu().await.unwrap();
        assert_eq!(manager.cpu_tokens_available(), 1);

        // Acquire another
        let _permit2 = manager.acquire_cpu().await.unwrap();
        assert_eq!(manager.cpu_tokens_available(), 0);

        // Drop first permit
        drop(_permit1);
        assert_eq!(manager.cpu_tokens_available(), 1);
    }

    #[tokio::test]
    async fn test_io_token_acquisition() {
        let manager = GlobalResourceManager::new(ResourceConfig {
            io_tokens: Some(4),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(manager.io_tokens_available(), 4);

        let _permit = manager.acquire_io().await.unwrap();
        assert_eq!(manager.io_tokens_available(), 3);
    }

    #[test]
    fn test_memory_tracking() {
        let manager = GlobalResourceManager::new(ResourceConfig::default()).unwrap();

        assert_eq!(manager.memory_used(), 0);

        manager.allocate_memory(1000);
        assert_eq!(manager.memory_used(), 1000);

        manager.allocate_memory(500);
        assert_eq!(manager.memory_used(), 1500);

        manager.deallocate_memory(700);
        assert_eq!(manager.memory_used(), 800);
    }

    #[test]
    fn hysteresis_stays_tripped_between_high_and_low_watermarks() {
        let manager = GlobalResourceManager::new(ResourceConfig {
            high_water_memory_pct: 80.0,
            low_water_memory_pct: 50.0,
            memory_limit: Some(1000),
            ..Default::default()
        })
        .unwrap();

        assert!(!manager.is_admission_throttled());

        manager.allocate_memory(850);
        assert!(manager.is_admission_throttled());

        // Dropping below the high watermark but still above low keeps it
        // tripped -- this is the point of hysteresis.
        manager.deallocate_memory(100);
        assert!(manager.is_admission_throttled());

        manager.deallocate_memory(300);
        assert!(!manager.is_admission_throttled());
    }
}
