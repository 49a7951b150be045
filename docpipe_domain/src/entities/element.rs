// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `Element` entity: one atomic unit of a parsed document. Immutable
//! once written; an update produces a new version keyed by `(id, version)`
//! rather than mutating in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::value_objects::{ElementId, FileId};
use crate::CoreError;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ElementKind {
    Title,
    Paragraph,
    Table,
    Image,
    Code,
    Formula,
    ListItem,
    Caption,
    Other(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.page < 1 {
            return Err(CoreError::ValidationFailed(
                "bounding box page must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElementPayload {
    Text(String),
    Binary { storage_ref: String },
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub processor_name: String,
    pub processor_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    id: ElementId,
    document_id: FileId,
    parent_id: Option<ElementId>,
    kind: ElementKind,
    position: u32,
    version: u32,
    bbox: BoundingBox,
    payload: ElementPayload,
    attributes: HashMap<String, serde_json::Value>,
    provenance: Provenance,
}

impl Element {
    pub fn new(
        document_id: FileId,
        parent_id: Option<ElementId>,
        kind: ElementKind,
        position: u32,
        bbox: BoundingBox,
        payload: ElementPayload,
        provenance: Provenance,
    ) -> Result<Self, CoreError> {
        bbox.validate()?;
        Ok(Self {
            id: ElementId::new(),
            document_id,
            parent_id,
            kind,
            position,
            version: 1,
            bbox,
            payload,
            attributes: HashMap::new(),
            provenance,
        })
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn document_id(&self) -> FileId {
        self.document_id
    }

    pub fn parent_id(&self) -> Option<ElementId> {
        self.parent_id
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn payload(&self) -> &ElementPayload {
        &self.payload
    }

    pub fn attributes(&self) -> &HashMap<String, serde_json::Value> {
        &self.attributes
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Produces a new, higher-versioned `Element` rather than mutating this
    /// one -- elements are immutable once written per version.
    pub fn with_new_version(&self, payload: ElementPayload, provenance: Provenance) -> Self {
        Self {
            id: self.id,
            document_id: self.document_id,
            parent_id: self.parent_id,
            kind: self.kind.clone(),
            position: self.position,
            version: self.version + 1,
            bbox: self.bbox,
            payload,
            attributes: self.attributes.clone(),
            provenance,
        }
    }
}
