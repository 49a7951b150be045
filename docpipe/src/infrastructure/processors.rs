// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processor Registry (§4.4)
//!
//! Dynamic registration and lookup of [`Processor`] implementations by
//! accepted input. Lookup picks the highest-[`priority`](ProcessorDescriptor::priority)
//! match, breaking ties by the matched [`InputKind::specificity`]; a
//! processor is versioned by its own `descriptor().version`, so two
//! versions of the same name can be registered side by side and selected
//! explicitly.

use std::sync::Arc;

use dashmap::DashMap;

use docpipe_domain::services::processor::{InputKind, Processor};
use docpipe_domain::CoreError;

/// One registered processor, keyed by `(name, version)` for direct lookup
/// and scanned by accepted input for mime/element-kind dispatch.
pub struct ProcessorRegistry {
    by_name_version: DashMap<(String, String), Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            by_name_version: DashMap::new(),
        }
    }

    /// Registers a processor. Registering the same `(name, version)` twice
    /// replaces the prior registration -- useful for hot-reloading a single
    /// processor during development, never relied on in steady-state
    /// operation.
    pub fn register(&self, processor: Arc<dyn Processor>) {
        let descriptor = processor.descriptor();
        let key = (descriptor.name.clone(), descriptor.version.clone());
        self.by_name_version.insert(key, processor);
    }

    pub fn get(&self, name: &str, version: &str) -> Option<Arc<dyn Processor>> {
        self.by_name_version
            .get(&(name.to_string(), version.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Returns every processor whose `accepted_inputs` includes a mime that
    /// matches `mime`, ordered by `(priority desc, specificity desc)` --
    /// the order a stage's fallback chain should try them in.
    pub fn find_for_mime(&self, mime: &str) -> Vec<Arc<dyn Processor>> {
        let mut matches: Vec<(i32, u8, Arc<dyn Processor>)> = self
            .by_name_version
            .iter()
            .filter_map(|entry| {
                let processor = entry.value().clone();
                let descriptor = processor.descriptor();
                let best_specificity = descriptor
                    .accepted_inputs
                    .iter()
                    .filter(|input| input.matches_mime(mime))
                    .map(InputKind::specificity)
                    .max()?;
                Some((descriptor.priority, best_specificity, processor))
            })
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        matches.into_iter().map(|(_, _, processor)| processor).collect()
    }

    /// Returns every processor that accepts the given element kind as
    /// input (an enrichment stage consuming another stage's output),
    /// ordered the same way as [`Self::find_for_mime`].
    pub fn find_for_element_kind(&self, kind: &str) -> Vec<Arc<dyn Processor>> {
        let mut matches: Vec<(i32, Arc<dyn Processor>)> = self
            .by_name_version
            .iter()
            .filter_map(|entry| {
                let processor = entry.value().clone();
                let descriptor = processor.descriptor();
                let accepts = descriptor
                    .accepted_inputs
                    .iter()
                    .any(|input| matches!(input, InputKind::ElementKind(k) if k == kind));
                accepts.then(|| (descriptor.priority, processor))
            })
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        matches.into_iter().map(|(_, processor)| processor).collect()
    }

    /// The single best processor for `mime`, or `UnknownProcessor` if none
    /// is registered for it.
    pub fn resolve_for_mime(&self, mime: &str) -> Result<Arc<dyn Processor>, CoreError> {
        self.find_for_mime(mime)
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::UnknownProcessor(mime.to_string()))
    }

    /// Resolves a processor by the bare name a [`StageSpec`](docpipe_domain::aggregates::StageSpec)
    /// declares, picking the highest-priority registered version when more
    /// than one is registered under the same name.
    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<dyn Processor>, CoreError> {
        self.by_name_version
            .iter()
            .filter(|entry| entry.key().0 == name)
            .max_by_key(|entry| entry.value().descriptor().priority)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::UnknownProcessor(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_name_version.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name_version.is_empty()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docpipe_domain::services::processor::{
        ConcurrencyClass, CostHint, ProcessorContext, ProcessorDescriptor, ProcessorResult,
    };

    struct StubProcessor(ProcessorDescriptor);

    #[async_trait]
    impl Processor for StubProcessor {
        fn descriptor(&self) -> &ProcessorDescriptor {
            &self.0
        }

        async fn process(&self, ctx: ProcessorContext) -> Result<ProcessorResult, CoreError> {
            Ok(ProcessorResult::new(ctx.elements))
        }
    }

    fn descriptor(name: &str, priority: i32, inputs: Vec<InputKind>) -> ProcessorDescriptor {
        ProcessorDescriptor {
            name: name.into(),
            version: "1.0.0".into(),
            accepted_inputs: inputs,
            produced_artifact_schema: "test".into(),
            cost_hint: CostHint::Small,
            concurrency_class: ConcurrencyClass::CpuBound,
            priority,
        }
    }

    #[test]
    fn exact_mime_match_outranks_glob_match_regardless_of_priority_tie() {
        let registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor(descriptor(
            "glob",
            10,
            vec![InputKind::Mime("application/*".into())],
        ))));
        registry.register(Arc::new(StubProcessor(descriptor(
            "exact",
            10,
            vec![InputKind::Mime("application/pdf".into())],
        ))));

        let matches = registry.find_for_mime("application/pdf");
        assert_eq!(matches[0].descriptor().name, "exact");
    }

    #[test]
    fn higher_priority_wins_over_lower_priority_regardless_of_specificity() {
        let registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor(descriptor(
            "low-priority-exact",
            1,
            vec![InputKind::Mime("application/pdf".into())],
        ))));
        registry.register(Arc::new(StubProcessor(descriptor(
            "high-priority-glob",
            100,
            vec![InputKind::Mime("application/*".into())],
        ))));

        let matches = registry.find_for_mime("application/pdf");
        assert_eq!(matches[0].descriptor().name, "high-priority-glob");
    }

    #[test]
    fn resolve_by_name_picks_the_highest_priority_version() {
        let registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor(descriptor(
            "extractor",
            1,
            vec![InputKind::Mime("application/pdf".into())],
        ))));
        let mut high = descriptor("extractor", 50, vec![InputKind::Mime("application/pdf".into())]);
        high.version = "2.0.0".into();
        registry.register(Arc::new(StubProcessor(high)));

        let resolved = registry.resolve_by_name("extractor").unwrap();
        assert_eq!(resolved.descriptor().version, "2.0.0");
    }

    #[test]
    fn resolve_for_mime_errors_on_no_registration() {
        let registry = ProcessorRegistry::new();
        assert!(registry.resolve_for_mime("text/plain").is_err());
    }

    #[test]
    fn find_for_element_kind_ignores_mime_only_processors() {
        let registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor(descriptor(
            "mime-only",
            5,
            vec![InputKind::Mime("application/pdf".into())],
        ))));
        registry.register(Arc::new(StubProcessor(descriptor(
            "table-enricher",
            5,
            vec![InputKind::ElementKind("table".into())],
        ))));

        let matches = registry.find_for_element_kind("table");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].descriptor().name, "table-enricher");
    }
}
