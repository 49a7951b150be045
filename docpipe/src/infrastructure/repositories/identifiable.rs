// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Extracts an entity's own identifier so the generic in-memory repository
//! can key its store without a second lookup table.

use docpipe_domain::entities::element::Element;
use docpipe_domain::entities::file::File;
use docpipe_domain::entities::relationship::Relationship;
use docpipe_domain::entities::task::Task;
use docpipe_domain::entities::upload_session::UploadSession;
use docpipe_domain::value_objects::{ElementId, FileId, RelationshipId, SessionId, TaskId};

/// An entity that can report its own primary key.
pub trait Identifiable {
    type Id: Eq + std::hash::Hash + Clone + Send + Sync;

    fn entity_id(&self) -> Self::Id;
}

impl Identifiable for File {
    type Id = FileId;

    fn entity_id(&self) -> Self::Id {
        self.id()
    }
}

impl Identifiable for Element {
    type Id = ElementId;

    fn entity_id(&self) -> Self::Id {
        self.id()
    }
}

impl Identifiable for Relationship {
    type Id = RelationshipId;

    fn entity_id(&self) -> Self::Id {
        self.id()
    }
}

impl Identifiable for Task {
    type Id = TaskId;

    fn entity_id(&self) -> Self::Id {
        self.id()
    }
}

impl Identifiable for UploadSession {
    type Id = SessionId;

    fn entity_id(&self) -> Self::Id {
        self.id()
    }
}
