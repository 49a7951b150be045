// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metadata & Relationship Engine (§4.8)
//!
//! Consumes a document's elements and produces a relationship graph plus a
//! reading-order sequence. Bounding-box coordinates are treated as fractions
//! of the page (matching how [`Element`] is constructed elsewhere in this
//! crate), so the page diagonal used to normalize spatial distance is a
//! constant `sqrt(2)` rather than a per-document page size.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use docpipe_domain::entities::relationship::{Relationship, RelationshipKind};
use docpipe_domain::entities::{BoundingBox, Element, ElementKind, ElementPayload};
use docpipe_domain::events::catalogue::RelationshipsDetected;
use docpipe_domain::events::domain_event::{DomainEvent, EventPayload};
use docpipe_domain::repositories::repository::{Filter, Query, Repository};
use docpipe_domain::services::event_bus::{BusEvent, EventBus};
use docpipe_domain::value_objects::{Confidence, CorrelationId, ElementId, FileId, RelationshipId};
use docpipe_domain::CoreError;

const PAGE_DIAGONAL: f64 = std::f64::consts::SQRT_2;

fn envelope<T: EventPayload + serde::Serialize>(correlation_id: CorrelationId, payload: T) -> BusEvent {
    let name = payload.event_name();
    let wrapped = DomainEvent::new_with_correlation(payload, correlation_id, None);
    let json = serde_json::to_value(&wrapped).unwrap_or(serde_json::Value::Null);
    BusEvent::new(name, json).with_correlation(correlation_id)
}

#[derive(Debug, Clone)]
pub struct RelationshipConfig {
    /// Proximity threshold, as a fraction of the page diagonal, below which
    /// two same-page elements get a `Spatial` edge.
    pub spatial_threshold: f64,
    /// Minimum lexical (Jaccard) overlap for a `Semantic` edge between
    /// role-compatible elements.
    pub semantic_threshold: f64,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            spatial_threshold: 0.15,
            semantic_threshold: 0.3,
        }
    }
}

pub struct RelationshipSummary {
    pub relationship_count: usize,
    pub reading_order: Vec<ElementId>,
}

pub struct RelationshipEngine {
    elements: Arc<dyn Repository<Element, Id = ElementId>>,
    relationships: Arc<dyn Repository<Relationship, Id = RelationshipId>>,
    event_bus: Arc<dyn EventBus>,
    config: RelationshipConfig,
}

impl RelationshipEngine {
    pub fn new(
        elements: Arc<dyn Repository<Element, Id = ElementId>>,
        relationships: Arc<dyn Repository<Relationship, Id = RelationshipId>>,
        event_bus: Arc<dyn EventBus>,
        config: RelationshipConfig,
    ) -> Self {
        Self {
            elements,
            relationships,
            event_bus,
            config,
        }
    }

    /// Detects relationships across every element of `document_id`,
    /// persists the result, and publishes `relationships.detected`.
    pub async fn analyze_document(&self, document_id: FileId) -> Result<RelationshipSummary, CoreError> {
        let elements = self.load_document_elements(document_id).await?;
        if elements.is_empty() {
            return Ok(RelationshipSummary {
                relationship_count: 0,
                reading_order: Vec::new(),
            });
        }

        let reading_order = reading_order(&elements);

        let mut edges = Vec::new();
        edges.extend(spatial_edges(&elements, self.config.spatial_threshold));
        edges.extend(hierarchical_edges(&elements, &reading_order));
        edges.extend(semantic_edges(&elements, self.config.semantic_threshold));

        let edges = coalesce(edges);
        let edges = drop_hierarchical_cycles(edges);

        for edge in &edges {
            self.relationships.create(edge.clone()).await?;
        }

        let _ = self
            .event_bus
            .publish(envelope(CorrelationId::new(), RelationshipsDetected {
                document_id,
                relationship_count: edges.len(),
                reading_order: reading_order.clone(),
            }))
            .await;

        Ok(RelationshipSummary {
            relationship_count: edges.len(),
            reading_order,
        })
    }

    async fn load_document_elements(&self, document_id: FileId) -> Result<Vec<Element>, CoreError> {
        let query = Query::new()
            .filter(Filter::eq("document_id", json!(document_id.to_string())))
            .paginate(0, u32::MAX);
        let page = self.elements.list(query).await?;
        Ok(page.items)
    }
}

/// Page index first, then column (k-means over x-centroids, k chosen by
/// silhouette score among k in {1, 2, 3}), then top-to-bottom within a
/// column.
fn reading_order(elements: &[Element]) -> Vec<ElementId> {
    let mut by_page: HashMap<u32, Vec<usize>> = HashMap::new();
    for (i, el) in elements.iter().enumerate() {
        by_page.entry(el.bbox().page).or_default().push(i);
    }
    let mut pages: Vec<u32> = by_page.keys().copied().collect();
    pages.sort_unstable();

    let mut order = Vec::with_capacity(elements.len());
    for page in pages {
        let indices = by_page.remove(&page).unwrap_or_default();
        let centroids: Vec<f64> = indices.iter().map(|&i| elements[i].bbox().x + elements[i].bbox().w / 2.0).collect();
        let columns = best_columns(&centroids);

        let mut rows: Vec<(usize, usize, f64)> = indices
            .iter()
            .zip(columns.iter())
            .map(|(&i, &col)| (i, col, elements[i].bbox().y))
            .collect();
        rows.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal)));

        order.extend(rows.into_iter().map(|(i, _, _)| elements[i].id()));
    }
    order
}

/// Runs 1-D k-means for every k in `1..=min(3, n)` and keeps the labeling
/// with the best silhouette score.
fn best_columns(centroids: &[f64]) -> Vec<usize> {
    let n = centroids.len();
    if n <= 1 {
        return vec![0; n];
    }
    let max_k = 3.min(n);
    let mut best_labels = vec![0; n];
    let mut best_score = f64::MIN;
    for k in 1..=max_k {
        let labels = kmeans_1d(centroids, k);
        let score = silhouette_1d(centroids, &labels, k);
        if score > best_score {
            best_score = score;
            best_labels = labels;
        }
    }
    best_labels
}

fn kmeans_1d(values: &[f64], k: usize) -> Vec<usize> {
    if k <= 1 || values.len() <= k {
        return vec![0; values.len()];
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let denom = (k - 1).max(1);
    let mut centroids: Vec<f64> = (0..k).map(|i| sorted[i * (sorted.len() - 1) / denom]).collect();

    let mut labels = vec![0usize; values.len()];
    for _ in 0..20 {
        let mut changed = false;
        for (i, &v) in values.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::MAX;
            for (c, &centroid) in centroids.iter().enumerate() {
                let dist = (v - centroid).abs();
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<f64> = values.iter().zip(labels.iter()).filter(|(_, &l)| l == c).map(|(&v, _)| v).collect();
            if !members.is_empty() {
                *centroid = members.iter().sum::<f64>() / members.len() as f64;
            }
        }
        if !changed {
            break;
        }
    }
    labels
}

fn silhouette_1d(values: &[f64], labels: &[usize], k: usize) -> f64 {
    let n = values.len();
    if k <= 1 || n <= k {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..n {
        let same: Vec<f64> = (0..n)
            .filter(|&j| j != i && labels[j] == labels[i])
            .map(|j| (values[i] - values[j]).abs())
            .collect();
        let a = if same.is_empty() { 0.0 } else { same.iter().sum::<f64>() / same.len() as f64 };

        let mut b = f64::MAX;
        for c in 0..k {
            if c == labels[i] {
                continue;
            }
            let other: Vec<f64> = (0..n).filter(|&j| labels[j] == c).map(|j| (values[i] - values[j]).abs()).collect();
            if !other.is_empty() {
                b = b.min(other.iter().sum::<f64>() / other.len() as f64);
            }
        }
        if b == f64::MAX {
            b = a;
        }
        total += if a.max(b) > 0.0 { (b - a) / a.max(b) } else { 0.0 };
    }
    total / n as f64
}

fn rect_distance(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let (ax0, ay0, ax1, ay1) = (a.x, a.y, a.x + a.w, a.y + a.h);
    let (bx0, by0, bx1, by1) = (b.x, b.y, b.x + b.w, b.y + b.h);
    let dx = if ax1 < bx0 {
        bx0 - ax1
    } else if bx1 < ax0 {
        ax0 - bx1
    } else {
        0.0
    };
    let dy = if ay1 < by0 {
        by0 - ay1
    } else if by1 < ay0 {
        ay0 - by1
    } else {
        0.0
    };
    (dx * dx + dy * dy).sqrt()
}

fn spatial_edges(elements: &[Element], threshold: f64) -> Vec<Relationship> {
    let mut edges = Vec::new();
    for i in 0..elements.len() {
        for j in (i + 1)..elements.len() {
            let (a, b) = (&elements[i], &elements[j]);
            if a.bbox().page != b.bbox().page {
                continue;
            }
            let distance = rect_distance(&a.bbox(), &b.bbox()) / PAGE_DIAGONAL;
            if distance <= threshold {
                let confidence = Confidence::clamped(1.0 - distance / threshold.max(f64::EPSILON));
                edges.push(Relationship::new(a.id(), b.id(), RelationshipKind::Spatial, confidence));
            }
        }
    }
    edges
}

/// Titles parent every subsequent non-title element, in reading order,
/// until the next title -- this domain only has one heading kind, so there
/// is no level ordering to disambiguate.
fn hierarchical_edges(elements: &[Element], reading_order: &[ElementId]) -> Vec<Relationship> {
    let by_id: HashMap<ElementId, &Element> = elements.iter().map(|e| (e.id(), e)).collect();
    let mut edges = Vec::new();
    let mut current_parent: Option<ElementId> = None;
    for id in reading_order {
        let Some(el) = by_id.get(id) else { continue };
        if matches!(el.kind(), ElementKind::Title) {
            current_parent = Some(*id);
            continue;
        }
        if let Some(parent) = current_parent {
            edges.push(Relationship::new(parent, *id, RelationshipKind::Hierarchical, Confidence::MAX));
        }
    }
    edges
}

fn roles_compatible(a: &ElementKind, b: &ElementKind) -> bool {
    matches!(
        (a, b),
        (ElementKind::Caption, ElementKind::Image)
            | (ElementKind::Image, ElementKind::Caption)
            | (ElementKind::Caption, ElementKind::Table)
            | (ElementKind::Table, ElementKind::Caption)
            | (ElementKind::Caption, ElementKind::Formula)
            | (ElementKind::Formula, ElementKind::Caption)
    )
}

fn text_of(element: &Element) -> Option<&str> {
    match element.payload() {
        ElementPayload::Text(text) => Some(text.as_str()),
        _ => None,
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn lexical_overlap(a: &str, b: &str) -> f64 {
    let (ta, tb) = (tokenize(a), tokenize(b));
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

fn semantic_edges(elements: &[Element], threshold: f64) -> Vec<Relationship> {
    let mut edges = Vec::new();
    for i in 0..elements.len() {
        for j in (i + 1)..elements.len() {
            let (a, b) = (&elements[i], &elements[j]);
            if !roles_compatible(a.kind(), b.kind()) {
                continue;
            }
            let (Some(text_a), Some(text_b)) = (text_of(a), text_of(b)) else {
                continue;
            };
            let overlap = lexical_overlap(text_a, text_b);
            if overlap >= threshold {
                edges.push(Relationship::new(a.id(), b.id(), RelationshipKind::Semantic, Confidence::clamped(overlap)));
            }
        }
    }
    edges
}

/// Duplicate `(source, target, kind)` triples coalesce to the max
/// confidence observed.
fn coalesce(edges: Vec<Relationship>) -> Vec<Relationship> {
    let mut result: Vec<Relationship> = Vec::with_capacity(edges.len());
    for edge in edges {
        match result.iter_mut().find(|existing: &&mut Relationship| existing.is_duplicate_of(&edge)) {
            Some(existing) => existing.coalesce(&edge),
            None => result.push(edge),
        }
    }
    result
}

/// Drops any `Hierarchical` edge that would close a cycle, in input order
/// -- the first edge among a cycle wins, later ones are dropped with a
/// warning. Mirrors the acyclicity check `PipelineSpec::new` runs over its
/// stage DAG.
fn drop_hierarchical_cycles(edges: Vec<Relationship>) -> Vec<Relationship> {
    let mut adjacency: HashMap<ElementId, Vec<ElementId>> = HashMap::new();
    let mut kept = Vec::with_capacity(edges.len());
    for edge in edges {
        if edge.kind() != RelationshipKind::Hierarchical {
            kept.push(edge);
            continue;
        }
        if creates_cycle(&adjacency, edge.source_element_id(), edge.target_element_id()) {
            warn!(
                source = %edge.source_element_id(),
                target = %edge.target_element_id(),
                "dropping hierarchical edge that would close a cycle"
            );
            continue;
        }
        adjacency.entry(edge.source_element_id()).or_default().push(edge.target_element_id());
        kept.push(edge);
    }
    kept
}

fn creates_cycle(adjacency: &HashMap<ElementId, Vec<ElementId>>, source: ElementId, target: ElementId) -> bool {
    if source == target {
        return true;
    }
    let mut stack = vec![target];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == source {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_domain::entities::Provenance;

    use crate::infrastructure::event_bus::InProcessEventBus;
    use crate::infrastructure::repositories::in_memory::InMemoryRepository;

    fn provenance() -> Provenance {
        Provenance {
            processor_name: "extractor".into(),
            processor_version: "1.0.0".into(),
        }
    }

    fn element(document_id: FileId, kind: ElementKind, position: u32, bbox: BoundingBox, text: &str) -> Element {
        Element::new(document_id, None, kind, position, bbox, ElementPayload::Text(text.into()), provenance()).unwrap()
    }

    fn bbox(page: u32, x: f64, y: f64) -> BoundingBox {
        BoundingBox { page, x, y, w: 0.1, h: 0.05 }
    }

    async fn engine() -> (RelationshipEngine, Arc<InMemoryRepository<Element>>, FileId) {
        let elements: Arc<InMemoryRepository<Element>> = Arc::new(InMemoryRepository::new());
        let relationships: Arc<InMemoryRepository<Relationship>> = Arc::new(InMemoryRepository::new());
        let event_bus = Arc::new(InProcessEventBus::new(64));
        let engine = RelationshipEngine::new(elements.clone(), relationships, event_bus, RelationshipConfig::default());
        (engine, elements, FileId::new())
    }

    #[tokio::test]
    async fn nearby_same_page_elements_get_a_spatial_edge() {
        let (engine, elements, document_id) = engine().await;
        elements
            .create(element(document_id, ElementKind::Paragraph, 0, bbox(1, 0.0, 0.0), "alpha"))
            .await
            .unwrap();
        elements
            .create(element(document_id, ElementKind::Paragraph, 1, bbox(1, 0.02, 0.0), "beta"))
            .await
            .unwrap();

        let summary = engine.analyze_document(document_id).await.unwrap();
        assert_eq!(summary.relationship_count, 1);
    }

    #[tokio::test]
    async fn a_title_parents_the_following_paragraphs_until_the_next_title() {
        let (engine, elements, document_id) = engine().await;
        elements
            .create(element(document_id, ElementKind::Title, 0, bbox(1, 0.0, 0.0), "Section One"))
            .await
            .unwrap();
        elements
            .create(element(document_id, ElementKind::Paragraph, 1, bbox(1, 0.0, 0.2), "body text"))
            .await
            .unwrap();
        elements
            .create(element(document_id, ElementKind::Title, 2, bbox(1, 0.0, 0.4), "Section Two"))
            .await
            .unwrap();
        elements
            .create(element(document_id, ElementKind::Paragraph, 3, bbox(1, 0.0, 0.6), "more text"))
            .await
            .unwrap();

        let summary = engine.analyze_document(document_id).await.unwrap();
        assert_eq!(summary.reading_order.len(), 4);
        // At least the two title -> body hierarchical edges should have
        // landed among whatever spatial edges also formed.
        assert!(summary.relationship_count >= 2);
    }

    #[tokio::test]
    async fn caption_and_image_with_shared_vocabulary_get_a_semantic_edge() {
        let (engine, elements, document_id) = engine().await;
        elements
            .create(element(
                document_id,
                ElementKind::Image,
                0,
                bbox(1, 0.0, 0.0),
                "quarterly revenue chart",
            ))
            .await
            .unwrap();
        elements
            .create(element(
                document_id,
                ElementKind::Caption,
                1,
                bbox(1, 0.8, 0.8),
                "Figure 1: quarterly revenue chart by region",
            ))
            .await
            .unwrap();

        let summary = engine.analyze_document(document_id).await.unwrap();
        assert!(summary.relationship_count >= 1);
    }

    #[tokio::test]
    async fn an_empty_document_produces_no_relationships() {
        let (engine, _elements, document_id) = engine().await;
        let summary = engine.analyze_document(document_id).await.unwrap();
        assert_eq!(summary.relationship_count, 0);
        assert!(summary.reading_order.is_empty());
    }

    #[test]
    fn duplicate_candidate_edges_coalesce_to_the_max_confidence() {
        let a = ElementId::new();
        let b = ElementId::new();
        let low = Relationship::new(a, b, RelationshipKind::Spatial, Confidence::new(0.2).unwrap());
        let high = Relationship::new(a, b, RelationshipKind::Spatial, Confidence::new(0.9).unwrap());
        let result = coalesce(vec![low, high]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence(), Confidence::new(0.9).unwrap());
    }

    #[test]
    fn a_hierarchical_edge_that_would_close_a_cycle_is_dropped() {
        let a = ElementId::new();
        let b = ElementId::new();
        let forward = Relationship::new(a, b, RelationshipKind::Hierarchical, Confidence::MAX);
        let backward = Relationship::new(b, a, RelationshipKind::Hierarchical, Confidence::MAX);
        let result = drop_hierarchical_cycles(vec![forward, backward]);
        assert_eq!(result.len(), 1);
    }
}
