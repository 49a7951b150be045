// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution runtime
//!
//! The global resource governor (CPU/IO token semaphores with hysteresis)
//! and the concrete [`WorkerPool`](docpipe_domain::services::worker_pool::WorkerPool)
//! implementation dispatching across the three worker classes.

pub mod resource_manager;
pub mod worker_pool;

pub use resource_manager::{GlobalResourceManager, ResourceConfig, StorageType};
pub use worker_pool::LocalWorkerPool;
