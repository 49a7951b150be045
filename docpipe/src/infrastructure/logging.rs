// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Observability beyond plain `tracing` spans: the `ObservabilityService`
//! in [`observability`] layers health scoring and threshold-based alerting
//! on top of [`crate::infrastructure::metrics::MetricsService`].

pub mod observability;
pub use observability::*;
