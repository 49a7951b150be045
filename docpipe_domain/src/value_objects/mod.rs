// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Immutable value objects: typed identifiers, content hashes, cache
//! fingerprints, confidence scores, and resource requirements.

mod confidence;
mod content_hash;
mod correlation_id;
mod fingerprint;
mod ids;
mod resource_requirements;

pub use confidence::Confidence;
pub use content_hash::ContentHash;
pub use correlation_id::CorrelationId;
pub use fingerprint::Fingerprint;
pub use ids::{ElementId, FileId, GenericId, IdCategory, RelationshipId, RunId, SessionId, StageId, TaskId};
pub use resource_requirements::ResourceRequirements;
