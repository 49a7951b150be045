// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Layered configuration (file + environment + defaults, via the `config`
//! crate) for every ambient subsystem: worker pool sizing, the cache's
//! tier thresholds, storage paths, the event bus, progress reporting, and
//! observability. See [`app_config::AppConfig`] for the full tree and
//! [`app_config::ConfigService`] for hot-reload of non-structural keys.

pub mod app_config;

pub use app_config::{
    AppConfig, CacheConfig, ConfigService, EventBusConfig, ObservabilityConfig, ProgressConfig, StorageConfig,
    WorkerPoolConfig,
};
