// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure layer
//!
//! Concrete adapters for every port the domain layer declares: the event
//! bus, repositories, the worker pool and its resource governor, the
//! processor registry, content-addressed blob storage, and the tiered cache.
//! Configuration, logging and metrics round out the ambient stack shared by
//! every adapter.

pub mod cache;
pub mod config;
pub mod event_bus;
pub mod logging;
pub mod metrics;
pub mod processors;
pub mod repositories;
pub mod runtime;
pub mod uploads;
