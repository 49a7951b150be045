// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processor contract
//!
//! A flat, single trait that every plug-in processor implements, whatever
//! format it parses or enrichment it performs. This replaces what a
//! class-per-format hierarchy would otherwise produce: one
//! `process(ctx) -> ProcessorResult` method, a declared set of input kinds,
//! and a tagged `concurrency_class()`/`cost_hint()` pair the worker pool and
//! registry use for dispatch, instead of deep inheritance or dynamic
//! dispatch keyed on file type.
//!
//! Processors must be deterministic given identical input and options --
//! the cache layer's correctness (single-flight, fingerprint-keyed reuse)
//! depends on re-running a processor with the same input producing an
//! equivalent result set, compared by element id + content hash.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::entities::{Element, File};
use crate::value_objects::{ContentHash, FileId};
use crate::CoreError;

/// Coarse cost estimate a processor declares for itself; used by the
/// registry's tie-breaking and the pipeline manager's critical-path
/// computation, not as a hard resource reservation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CostHint {
    Small,
    Medium,
    Large,
}

/// Which worker class a processor's invocations should be dispatched to.
/// Mirrors the three worker classes in the concurrency model.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConcurrencyClass {
    CpuBound,
    IoBound,
    Gpu,
}

/// What a processor accepts as input: a file mime glob (`"application/pdf"`,
/// `"image/*"`) or an element kind it transforms (`"table"`, `"paragraph"`).
/// Specificity for registry tie-breaking is simply: exact match > glob
/// match > wildcard.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum InputKind {
    Mime(String),
    ElementKind(String),
}

impl InputKind {
    /// Higher is more specific; used to break priority ties in registry
    /// lookup.
    pub fn specificity(&self) -> u8 {
        match self {
            InputKind::Mime(m) if m.ends_with("/*") => 1,
            InputKind::Mime(_) => 2,
            InputKind::ElementKind(_) => 2,
        }
    }

    pub fn matches_mime(&self, mime: &str) -> bool {
        match self {
            InputKind::Mime(pattern) => {
                if let Some(prefix) = pattern.strip_suffix("/*") {
                    mime.starts_with(prefix) && mime.as_bytes().get(prefix.len()) == Some(&b'/')
                } else {
                    pattern == mime
                }
            }
            InputKind::ElementKind(_) => false,
        }
    }
}

/// Declarative description of a processor, independent of its `process()`
/// implementation; what the registry stores and matches against.
#[derive(Debug, Clone)]
pub struct ProcessorDescriptor {
    pub name: String,
    pub version: String,
    pub accepted_inputs: Vec<InputKind>,
    pub produced_artifact_schema: String,
    pub cost_hint: CostHint,
    pub concurrency_class: ConcurrencyClass,
    /// Registry lookup picks the highest-priority match; ties broken by
    /// declared specificity of the matched `InputKind`.
    pub priority: i32,
}

/// A cancellation handle threaded into every processor invocation. Checked
/// at the processor's own declared safe points (after each I/O, each
/// element batch) rather than preempted.
#[derive(Debug, Clone)]
pub struct CancellationHandle(Arc<std::sync::atomic::AtomicBool>);

impl CancellationHandle {
    pub fn new() -> Self {
        Self(Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A cache handle a processor may consult for sub-computations it wants to
/// memoize independently of the pipeline manager's stage-level cache
/// lookup. Kept intentionally narrow (get/put of opaque bytes) -- the full
/// single-flight `Cache` contract lives in [`crate::services::cache`].
#[async_trait]
pub trait ProcessorCacheHandle: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError>;
}

/// Everything a processor needs to do its work, handed in by the worker
/// pool at invocation time.
pub struct ProcessorContext {
    pub document_id: FileId,
    pub file: File,
    pub elements: Vec<Element>,
    pub options: Value,
    pub cancellation: CancellationHandle,
    pub cache: Option<Arc<dyn ProcessorCacheHandle>>,
}

impl ProcessorContext {
    pub fn input_fingerprint_source(&self) -> ContentHash {
        self.file.content_hash()
    }
}

/// Non-fatal observations a processor surfaces alongside its result, e.g.
/// "page 4 failed OCR, left blank" -- distinct from an `Err` return, which
/// aborts the stage.
#[derive(Debug, Clone)]
pub struct ProcessorWarning {
    pub message: String,
    pub element_id: Option<crate::value_objects::ElementId>,
}

/// Free-form numeric metrics a processor reports for observability
/// (elements_emitted, pages_processed, ...); surfaced via progress/metrics,
/// never interpreted by the pipeline manager itself.
pub type ProcessorMetrics = std::collections::HashMap<String, f64>;

#[derive(Debug, Clone)]
pub struct ProcessorResult {
    pub elements: Vec<Element>,
    pub metrics: ProcessorMetrics,
    pub warnings: Vec<ProcessorWarning>,
}

impl ProcessorResult {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            elements,
            metrics: ProcessorMetrics::new(),
            warnings: Vec::new(),
        }
    }
}

/// The flat processor contract. One trait for every plug-in, whatever it
/// parses: a PDF text extractor and a reading-order resolver both implement
/// this, distinguished only by their [`ProcessorDescriptor`].
#[async_trait]
pub trait Processor: Send + Sync {
    fn descriptor(&self) -> &ProcessorDescriptor;

    async fn process(&self, ctx: ProcessorContext) -> Result<ProcessorResult, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_glob_matches_prefix_but_not_other_types() {
        let glob = InputKind::Mime("image/*".into());
        assert!(glob.matches_mime("image/png"));
        assert!(!glob.matches_mime("application/pdf"));
        assert!(!glob.matches_mime("imagexpng"));
    }

    #[test]
    fn exact_mime_is_more_specific_than_glob() {
        let exact = InputKind::Mime("application/pdf".into());
        let glob = InputKind::Mime("application/*".into());
        assert!(exact.specificity() > glob.specificity());
    }

    #[test]
    fn cancellation_handle_observes_cancel_across_clones() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
