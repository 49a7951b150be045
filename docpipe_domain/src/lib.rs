// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # docpipe-domain
//!
//! Pure domain layer for the document-processing backbone: entities, value
//! objects, aggregates, domain events, and the service/repository ports the
//! application and infrastructure layers implement against. No I/O runtime,
//! no logging, no storage technology -- those are infrastructure concerns in
//! the `docpipe` crate.
//!
//! Four tightly coupled subsystems, in dependency order: the upload manager
//! (`entities::File`, `entities::UploadSession`), the pipeline manager
//! (`aggregates::PipelineSpec`, `aggregates::PipelineRun`), the worker pool
//! (`services::worker_pool`), and the event bus (`services::event_bus`)
//! connecting them, with the metadata/relationship engine
//! (`entities::Relationship`) and cache layer (`services::cache`) as
//! enrichment and acceleration layers over the same element model
//! (`entities::Element`).

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::CoreError;
