// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `Relationship` entity: a directional edge between two [`Element`]s.
//! Duplicate `(source, target, kind)` triples coalesce to the maximum
//! observed confidence rather than producing separate edges.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::value_objects::{Confidence, ElementId, RelationshipId};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    Spatial,
    Semantic,
    Hierarchical,
    ReadingOrder,
    Reference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    id: RelationshipId,
    source_element_id: ElementId,
    target_element_id: ElementId,
    kind: RelationshipKind,
    confidence: Confidence,
    attributes: HashMap<String, serde_json::Value>,
}

impl Relationship {
    pub fn new(
        source_element_id: ElementId,
        target_element_id: ElementId,
        kind: RelationshipKind,
        confidence: Confidence,
    ) -> Self {
        Self {
            id: RelationshipId::new(),
            source_element_id,
            target_element_id,
            kind,
            confidence,
            attributes: HashMap::new(),
        }
    }

    pub fn id(&self) -> RelationshipId {
        self.id
    }

    pub fn source_element_id(&self) -> ElementId {
        self.source_element_id
    }

    pub fn target_element_id(&self) -> ElementId {
        self.target_element_id
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn attributes(&self) -> &HashMap<String, serde_json::Value> {
        &self.attributes
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Whether `self` and `other` describe the same directed edge of the
    /// same kind, regardless of confidence or attributes.
    pub fn is_duplicate_of(&self, other: &Relationship) -> bool {
        self.source_element_id == other.source_element_id
            && self.target_element_id == other.target_element_id
            && self.kind == other.kind
    }

    /// Coalesces a duplicate edge into `self` by keeping the higher
    /// confidence of the two.
    pub fn coalesce(&mut self, other: &Relationship) {
        self.confidence = self.confidence.max(other.confidence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_edges_are_recognized_regardless_of_confidence() {
        let a = ElementId::new();
        let b = ElementId::new();
        let r1 = Relationship::new(a, b, RelationshipKind::Spatial, Confidence::new(0.4).unwrap());
        let r2 = Relationship::new(a, b, RelationshipKind::Spatial, Confidence::new(0.9).unwrap());
        assert!(r1.is_duplicate_of(&r2));
    }

    #[test]
    fn coalesce_keeps_the_higher_confidence() {
        let a = ElementId::new();
        let b = ElementId::new();
        let mut r1 = Relationship::new(a, b, RelationshipKind::Semantic, Confidence::new(0.2).unwrap());
        let r2 = Relationship::new(a, b, RelationshipKind::Semantic, Confidence::new(0.8).unwrap());
        r1.coalesce(&r2);
        assert_eq!(r1.confidence(), Confidence::new(0.8).unwrap());
    }

    #[test]
    fn different_kinds_are_not_duplicates() {
        let a = ElementId::new();
        let b = ElementId::new();
        let r1 = Relationship::new(a, b, RelationshipKind::Spatial, Confidence::new(0.5).unwrap());
        let r2 = Relationship::new(a, b, RelationshipKind::Semantic, Confidence::new(0.5).unwrap());
        assert!(!r1.is_duplicate_of(&r2));
    }
}
