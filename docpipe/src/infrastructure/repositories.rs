// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Storage Repository
//!
//! Backend-agnostic persistence for every entity in the data model, built on
//! [`docpipe_domain::repositories::Repository`]. [`in_memory`] provides one
//! generic adapter usable for any entity (keyed by the [`Identifiable`]
//! trait, filtering expressed over the entity's own JSON serialization); it
//! backs tests and any entity without a dedicated SQL-backed adapter.
//! [`sqlite`] provides dedicated, schema-aware adapters for the two entities
//! persistence correctness matters most for: [`crate::infrastructure::repositories::sqlite::SqliteFileRepository`]
//! (content-hash dedup must survive a restart) and
//! [`crate::infrastructure::repositories::sqlite::SqlitePipelineRunRepository`]
//! (resumability depends on the checkpoint map surviving a crash).

mod identifiable;
pub mod in_memory;
pub mod schema;
pub mod sqlite;

pub use identifiable::Identifiable;
pub use in_memory::InMemoryRepository;
