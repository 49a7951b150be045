// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain entities
//!
//! Mutable-but-invariant-guarded domain objects: [`File`], [`UploadSession`],
//! [`Element`], [`Relationship`], and [`Task`]. Every state transition goes
//! through a method that enforces the entity's invariants rather than public
//! field mutation.

pub mod element;
pub mod file;
pub mod relationship;
pub mod task;
pub mod upload_session;

pub use element::{BoundingBox, Element, ElementKind, ElementPayload, Provenance};
pub use file::{File, FileStatus, ValidationReport};
pub use relationship::{Relationship, RelationshipKind};
pub use task::{Task, TaskOutcome, TaskPriority, TaskStatus};
pub use upload_session::{SessionStatus, UploadSession};
