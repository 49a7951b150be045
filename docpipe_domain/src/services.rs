// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain service ports
//!
//! Trait-of-behavior contracts the application layer codes against:
//! [`processor::Processor`], [`event_bus::EventBus`], [`worker_pool::WorkerPool`],
//! and [`cache::Cache`]. Concrete implementations live in the infrastructure
//! crate; the domain only fixes the shape so business logic never depends on
//! a transport, a queue library, or a storage engine.

pub mod cache;
pub mod event_bus;
pub mod processor;
pub mod worker_pool;

pub use cache::{Cache, CachedArtifact};
pub use event_bus::{BusEvent, DeliveryMode, EventBus, EventHandler, Middleware, Subscription};
pub use processor::{
    CancellationHandle, ConcurrencyClass, CostHint, InputKind, Processor, ProcessorContext,
    ProcessorDescriptor, ProcessorMetrics, ProcessorResult, ProcessorWarning,
};
pub use worker_pool::{DispatchPriority, TaskHandle, TaskResult, WorkItem, WorkerClass, WorkerPool};
