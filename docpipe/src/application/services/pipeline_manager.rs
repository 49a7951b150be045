// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Manager (§4.6)
//!
//! Drives one [`PipelineRun`] through its [`PipelineSpec`] DAG: dispatches
//! each ready stage to the worker pool, persists a checkpoint on success,
//! retries on failure per the stage's [`RetryPolicy`], and applies
//! `on_failure` semantics via the aggregate itself. `execute` runs the DAG
//! to completion (or to the point no further stage is ready); `cancel` and
//! `resume` are thin wrappers around the aggregate's own state machine.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tracing::{info, warn};

use docpipe_domain::aggregates::{PipelineRun, PipelineSpec, RunState};
use docpipe_domain::entities::{Element, File};
use docpipe_domain::events::catalogue::{RunStateChanged, StageCompleted, StageFailed, StageSkipped};
use docpipe_domain::events::domain_event::{DomainEvent, EventPayload};
use docpipe_domain::repositories::repository::{Filter, Query, Repository};
use docpipe_domain::services::event_bus::{BusEvent, EventBus};
use docpipe_domain::services::processor::{CancellationHandle, ProcessorContext};
use docpipe_domain::services::worker_pool::{DispatchPriority, WorkerClass};
use docpipe_domain::value_objects::{CorrelationId, ElementId, FileId, RunId, StageId};
use docpipe_domain::CoreError;

use crate::application::services::progress_tracker::ProgressTracker;
use crate::infrastructure::logging::ObservabilityService;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::processors::ProcessorRegistry;
use crate::infrastructure::runtime::worker_pool::LocalWorkerPool;

/// One stage's terminal result, carried out of [`PipelineManager::dispatch_stage`]
/// instead of mutating the run directly so a batch of stages can be awaited
/// concurrently via `join_all` and applied to the run afterwards.
enum StageOutcome {
    Completed {
        stage_id: StageId,
        processor_name: String,
        artifact_ref: String,
        duration: Duration,
    },
    Failed {
        stage_id: StageId,
        processor_name: String,
        attempts: u32,
        reason: String,
        duration: Duration,
    },
}

impl StageOutcome {
    fn failed(stage_id: StageId, processor_name: String, attempts: u32, reason: impl Into<String>, duration: Duration) -> Self {
        Self::Failed {
            stage_id,
            processor_name,
            attempts,
            reason: reason.into(),
            duration,
        }
    }
}

fn envelope<T: EventPayload + serde::Serialize>(correlation_id: CorrelationId, payload: T) -> BusEvent {
    let name = payload.event_name();
    let wrapped = DomainEvent::new_with_correlation(payload, correlation_id, None);
    let json = serde_json::to_value(&wrapped).unwrap_or(serde_json::Value::Null);
    BusEvent::new(name, json).with_correlation(correlation_id)
}

/// Orchestrates DAG execution; holds no state of its own beyond the ports it
/// was constructed with -- every run's state lives in its persisted
/// `PipelineRun`.
pub struct PipelineManager {
    specs: Arc<dyn Repository<PipelineSpec, Id = String>>,
    runs: Arc<dyn Repository<PipelineRun, Id = RunId>>,
    files: Arc<dyn Repository<File, Id = FileId>>,
    elements: Arc<dyn Repository<Element, Id = ElementId>>,
    registry: Arc<ProcessorRegistry>,
    worker_pool: Arc<LocalWorkerPool>,
    event_bus: Arc<dyn EventBus>,
    progress: Option<Arc<ProgressTracker>>,
    metrics: Option<Arc<MetricsService>>,
    observability: Option<Arc<ObservabilityService>>,
}

impl PipelineManager {
    pub fn new(
        specs: Arc<dyn Repository<PipelineSpec, Id = String>>,
        runs: Arc<dyn Repository<PipelineRun, Id = RunId>>,
        files: Arc<dyn Repository<File, Id = FileId>>,
        elements: Arc<dyn Repository<Element, Id = ElementId>>,
        registry: Arc<ProcessorRegistry>,
        worker_pool: Arc<LocalWorkerPool>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            specs,
            runs,
            files,
            elements,
            registry,
            worker_pool,
            event_bus,
            progress: None,
            metrics: None,
            observability: None,
        }
    }

    /// Registers a progress tracker to be told how many stages a newly
    /// created run will execute, so it can translate `stage.*` events into
    /// a completion fraction. Optional -- a manager without one still runs
    /// the DAG, it just emits no progress events.
    pub fn with_progress_tracker(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Registers a metrics service to record run/stage counters and
    /// durations against. Optional -- a manager without one still runs the
    /// DAG, it just reports nothing to Prometheus.
    pub fn with_metrics(mut self, metrics: Arc<MetricsService>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registers a health/alerting layer on top of the same metrics a run
    /// reports to. Optional -- a manager without one still runs the DAG and
    /// reports raw counters, it just never scores health or raises alerts.
    pub fn with_observability(mut self, observability: Arc<ObservabilityService>) -> Self {
        self.observability = Some(observability);
        self
    }

    pub async fn register_spec(&self, spec: PipelineSpec) -> Result<(), CoreError> {
        self.specs.create(spec).await?;
        Ok(())
    }

    pub async fn create_run(&self, spec_name: &str, document_id: FileId) -> Result<RunId, CoreError> {
        let spec = self.load_spec(spec_name).await?;
        let file = self
            .files
            .get(&document_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("file {document_id} not found")))?;
        let run = PipelineRun::create(&spec, file.id(), CorrelationId::new());
        let id = run.id();
        if let Some(progress) = &self.progress {
            progress.register_run(id, spec.stages().len() as u32);
        }
        self.runs.create(run).await?;
        Ok(id)
    }

    /// Drives `run_id` forward: starts it if still `created`, then
    /// repeatedly dispatches every currently-ready stage until none remain
    /// ready, retrying each per its `RetryPolicy` and applying `on_failure`
    /// on exhaustion. Returns the run's terminal (or stalled) state.
    pub async fn execute(&self, run_id: RunId) -> Result<RunState, CoreError> {
        let started_at = std::time::Instant::now();
        let mut run = self.load_run(run_id).await?;
        let spec = self.load_spec(run.spec_name()).await?;
        let before = run.state();

        if run.state() == RunState::Created {
            run.start()?;
            if let Some(metrics) = &self.metrics {
                metrics.record_run_started();
            }
        }

        while run.state() == RunState::Running {
            let ready = run.ready_stages(&spec);
            if ready.is_empty() {
                break;
            }
            for stage_id in &ready {
                run.mark_stage_running(*stage_id);
            }

            let document_id = run.document_id();
            let outcomes = join_all(ready.iter().map(|&stage_id| self.dispatch_stage(document_id, &spec, stage_id))).await;

            for outcome in outcomes {
                self.apply_stage_outcome(&mut run, &spec, outcome).await;
                if run.state() != RunState::Running {
                    break;
                }
            }
            run.try_complete(&spec);
        }

        self.runs.update(run.clone()).await?;
        if run.state() != before {
            let _ = self
                .event_bus
                .publish(envelope(run.correlation_id(), RunStateChanged {
                    run_id: run.id(),
                    document_id: run.document_id(),
                    from: format!("{before:?}"),
                    to: run.state(),
                }))
                .await;
        }
        if let Some(metrics) = &self.metrics {
            match run.state() {
                RunState::Completed => metrics.record_run_completed(started_at.elapsed()),
                RunState::Failed => metrics.record_run_failed(started_at.elapsed()),
                _ => {}
            }
        }
        if let Some(observability) = &self.observability {
            if matches!(run.state(), RunState::Completed | RunState::Failed) {
                let (errors, warnings) = spec.stages().iter().fold((0u32, 0u32), |(errors, warnings), stage| {
                    match run.stage_state(stage.id) {
                        Some(docpipe_domain::aggregates::StageState::Failed { .. }) => (errors + 1, warnings),
                        Some(docpipe_domain::aggregates::StageState::Skipped { .. }) => (errors, warnings + 1),
                        _ => (errors, warnings),
                    }
                });
                observability
                    .record_run_completion(started_at.elapsed(), run.state() == RunState::Completed, errors, warnings)
                    .await;
            }
        }
        Ok(run.state())
    }

    /// Runs one stage to its terminal outcome (success, or retry exhaustion)
    /// against only the immutable parts of a run -- this lets `execute` fan
    /// a batch of ready stages out via [`join_all`] without juggling
    /// overlapping `&mut PipelineRun` borrows. The caller applies the
    /// returned outcome to the run sequentially afterwards.
    async fn dispatch_stage(&self, document_id: FileId, spec: &PipelineSpec, stage_id: StageId) -> StageOutcome {
        let stage_started_at = std::time::Instant::now();
        let Some(stage) = spec.stage(stage_id) else {
            return StageOutcome::failed(stage_id, String::new(), 1, "stage not found in spec", stage_started_at.elapsed());
        };

        let processor = match self.registry.resolve_by_name(&stage.processor_name) {
            Ok(p) => p,
            Err(e) => {
                warn!(stage = %stage_id, error = %e, "no processor registered for stage");
                return StageOutcome::failed(stage_id, stage.processor_name.clone(), 1, e.to_string(), stage_started_at.elapsed());
            }
        };

        let file = match self.files.get(&document_id).await {
            Ok(Some(f)) => f,
            Ok(None) => {
                return StageOutcome::failed(
                    stage_id,
                    stage.processor_name.clone(),
                    1,
                    "document not found",
                    stage_started_at.elapsed(),
                );
            }
            Err(e) => {
                return StageOutcome::failed(stage_id, stage.processor_name.clone(), 1, e.to_string(), stage_started_at.elapsed());
            }
        };

        let elements = self.load_document_elements(document_id).await.unwrap_or_default();
        let max_attempts = stage.retry_policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let ctx = ProcessorContext {
                document_id,
                file: file.clone(),
                elements: elements.clone(),
                options: json!({}),
                cancellation: CancellationHandle::new(),
                cache: None,
            };
            let priority = DispatchPriority {
                explicit_priority: 0,
                deadline: None,
                submit_order: attempt as u64,
            };

            let dispatch = self
                .worker_pool
                .submit_processor(processor.clone(), ctx, document_id, WorkerClass::Cooperative, priority)
                .await;

            let outcome = match dispatch {
                Ok(handle) => {
                    let awaited = self.worker_pool.await_result(handle, Some(stage.timeout)).await;
                    match awaited {
                        Ok(_result) => self.worker_pool.take_processor_result(handle),
                        Err(e) => Some(Err(e)),
                    }
                }
                Err(e) => Some(Err(e)),
            };

            match outcome {
                Some(Ok(result)) => {
                    if !result.elements.is_empty() {
                        let _ = self.elements.bulk_create(result.elements.clone()).await;
                    }
                    let artifact_ref = format!("elements:{}", result.elements.len());
                    return StageOutcome::Completed {
                        stage_id,
                        processor_name: stage.processor_name.clone(),
                        artifact_ref,
                        duration: stage_started_at.elapsed(),
                    };
                }
                Some(Err(e)) if attempt < max_attempts => {
                    let jitter = 1.0;
                    let delay = stage.retry_policy.delay_for_attempt(attempt, jitter);
                    info!(stage = %stage_id, attempt, error = %e, "stage failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Some(Err(e)) => {
                    return StageOutcome::failed(stage_id, stage.processor_name.clone(), attempt, e.to_string(), stage_started_at.elapsed());
                }
                None => {
                    return StageOutcome::failed(
                        stage_id,
                        stage.processor_name.clone(),
                        attempt,
                        "no result recorded",
                        stage_started_at.elapsed(),
                    );
                }
            }
        }

        StageOutcome::failed(
            stage_id,
            stage.processor_name.clone(),
            max_attempts,
            "retry loop exited without a result",
            stage_started_at.elapsed(),
        )
    }

    /// Applies one stage's terminal outcome to the run: records the
    /// checkpoint or failure, reports metrics, and publishes the matching
    /// event(s). Called once per outcome, sequentially, after a batch of
    /// concurrently-dispatched stages all resolve.
    async fn apply_stage_outcome(&self, run: &mut PipelineRun, spec: &PipelineSpec, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Completed { stage_id, processor_name, artifact_ref, duration } => {
                run.mark_stage_completed(stage_id, artifact_ref.clone());
                if let Some(metrics) = &self.metrics {
                    metrics.record_stage_completed(&processor_name, duration);
                }
                let _ = self
                    .event_bus
                    .publish(envelope(run.correlation_id(), StageCompleted {
                        run_id: run.id(),
                        stage_id,
                        artifact_ref,
                    }))
                    .await;
            }
            StageOutcome::Failed { stage_id, processor_name, attempts, reason, duration } => {
                run.mark_stage_failed(stage_id, attempts, spec);
                if let Some(metrics) = &self.metrics {
                    metrics.record_stage_failed(&processor_name, duration);
                }
                self.publish_stage_failed(run, stage_id, attempts, reason).await;
            }
        }
    }

    async fn publish_stage_failed(&self, run: &PipelineRun, stage_id: StageId, attempts: u32, reason: String) {
        let _ = self
            .event_bus
            .publish(envelope(run.correlation_id(), StageFailed {
                run_id: run.id(),
                stage_id,
                attempts,
                reason,
            }))
            .await;
        if let Some(docpipe_domain::aggregates::StageState::Skipped { reason }) = run.stage_state(stage_id) {
            let _ = self
                .event_bus
                .publish(envelope(run.correlation_id(), StageSkipped {
                    run_id: run.id(),
                    stage_id,
                    reason: reason.clone(),
                }))
                .await;
        }
    }

    /// Returns the current state of a run without driving it forward --
    /// the `status` subcommand's query, kept separate from `execute` so
    /// polling a run never has the side effect of dispatching its stages.
    pub async fn status(&self, run_id: RunId) -> Result<RunState, CoreError> {
        Ok(self.load_run(run_id).await?.state())
    }

    pub async fn cancel(&self, run_id: RunId) -> Result<(), CoreError> {
        let mut run = self.load_run(run_id).await?;
        run.cancel()?;
        let correlation_id = run.correlation_id();
        let document_id = run.document_id();
        let run_id = run.id();
        self.runs.update(run).await?;
        let _ = self
            .event_bus
            .publish(envelope(correlation_id, RunStateChanged {
                run_id,
                document_id,
                from: "Running".into(),
                to: RunState::Cancelled,
            }))
            .await;
        Ok(())
    }

    /// Resumes a failed/cancelled run from its checkpoints and drives it
    /// forward again.
    pub async fn resume(&self, run_id: RunId) -> Result<RunState, CoreError> {
        let mut run = self.load_run(run_id).await?;
        run.resume()?;
        self.runs.update(run).await?;
        self.execute(run_id).await
    }

    async fn load_run(&self, run_id: RunId) -> Result<PipelineRun, CoreError> {
        self.runs
            .get(&run_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("pipeline run {run_id} not found")))
    }

    async fn load_spec(&self, spec_name: &str) -> Result<PipelineSpec, CoreError> {
        self.specs
            .get(&spec_name.to_string())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("pipeline spec '{spec_name}' not found")))
    }

    async fn load_document_elements(&self, document_id: FileId) -> Result<Vec<Element>, CoreError> {
        let query = Query::new()
            .filter(Filter::eq("document_id", json!(document_id.to_string())))
            .paginate(0, u32::MAX);
        let page = self.elements.list(query).await?;
        Ok(page.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docpipe_domain::aggregates::{OnFailure, RetryPolicy, StageSpec};
    use docpipe_domain::entities::{BoundingBox, ElementPayload, Provenance};
    use docpipe_domain::services::processor::{
        ConcurrencyClass, CostHint, InputKind, Processor, ProcessorDescriptor, ProcessorResult,
    };
    use docpipe_domain::value_objects::ContentHash;

    use crate::infrastructure::event_bus::InProcessEventBus;
    use crate::infrastructure::repositories::in_memory::{
        InMemoryPipelineRunRepository, InMemoryPipelineSpecRepository, InMemoryRepository,
    };
    use crate::infrastructure::runtime::resource_manager::{GlobalResourceManager, ResourceConfig};

    struct NoopExtractor(ProcessorDescriptor);

    #[async_trait]
    impl Processor for NoopExtractor {
        fn descriptor(&self) -> &ProcessorDescriptor {
            &self.0
        }

        async fn process(&self, ctx: ProcessorContext) -> Result<ProcessorResult, CoreError> {
            let element = Element::new(
                ctx.document_id,
                None,
                docpipe_domain::entities::ElementKind::Paragraph,
                0,
                BoundingBox { page: 1, x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
                ElementPayload::Text("hello".into()),
                Provenance {
                    processor_name: "extractor".into(),
                    processor_version: "1.0.0".into(),
                },
            )?;
            Ok(ProcessorResult::new(vec![element]))
        }
    }

    fn descriptor(name: &str) -> ProcessorDescriptor {
        ProcessorDescriptor {
            name: name.into(),
            version: "1.0.0".into(),
            accepted_inputs: vec![InputKind::Mime("application/pdf".into())],
            produced_artifact_schema: "element".into(),
            cost_hint: CostHint::Small,
            concurrency_class: ConcurrencyClass::CpuBound,
            priority: 1,
        }
    }

    async fn manager() -> (PipelineManager, FileId) {
        let specs = Arc::new(InMemoryPipelineSpecRepository::new());
        let runs = Arc::new(InMemoryPipelineRunRepository::new());
        let files: Arc<InMemoryRepository<File>> = Arc::new(InMemoryRepository::new());
        let elements: Arc<InMemoryRepository<Element>> = Arc::new(InMemoryRepository::new());
        let registry = Arc::new(ProcessorRegistry::new());
        registry.register(Arc::new(NoopExtractor(descriptor("extract"))));
        let resources = Arc::new(GlobalResourceManager::new(ResourceConfig::default()).unwrap());
        let worker_pool = LocalWorkerPool::new(resources);
        let event_bus = Arc::new(InProcessEventBus::new(64));

        let file = File::receive(
            ContentHash::of_bytes(b"pdf bytes"),
            "application/pdf",
            9,
            "in.pdf",
            docpipe_domain::value_objects::SessionId::new(),
        );
        let document_id = file.id();
        files.create(file).await.unwrap();

        let a = StageId::new();
        let spec = PipelineSpec::new(
            "extract-only",
            vec![StageSpec::new(a, "extract")
                .with_retry(RetryPolicy::none())
                .with_on_failure(OnFailure::FailPipeline)],
        )
        .unwrap();
        specs.create(spec).await.unwrap();

        let manager = PipelineManager::new(specs, runs, files, elements, registry, worker_pool, event_bus);
        (manager, document_id)
    }

    #[tokio::test]
    async fn a_single_stage_run_completes_and_persists_elements() {
        let (manager, document_id) = manager().await;
        let run_id = manager.create_run("extract-only", document_id).await.unwrap();
        let state = manager.execute(run_id).await.unwrap();
        assert_eq!(state, RunState::Completed);
    }

    #[tokio::test]
    async fn status_reports_the_run_s_state_without_driving_it() {
        let (manager, document_id) = manager().await;
        let run_id = manager.create_run("extract-only", document_id).await.unwrap();
        assert_eq!(manager.status(run_id).await.unwrap(), RunState::Created);
    }

    #[tokio::test]
    async fn create_run_registers_the_stage_count_with_a_progress_tracker() {
        let (manager, document_id) = manager().await;
        let bus = Arc::new(InProcessEventBus::new(64));
        let progress = ProgressTracker::new(bus, crate::infrastructure::config::ProgressConfig::default());
        let manager = manager.with_progress_tracker(progress.clone());

        let run_id = manager.create_run("extract-only", document_id).await.unwrap();
        assert_eq!(progress.registered_stage_total(run_id), Some(1));
    }

    #[tokio::test]
    async fn create_run_against_an_unknown_spec_fails() {
        let (manager, document_id) = manager().await;
        assert!(manager.create_run("missing", document_id).await.is_err());
    }

    #[tokio::test]
    async fn a_run_wired_to_observability_reports_its_completion() {
        let (manager, document_id) = manager().await;
        let metrics = Arc::new(MetricsService::new().unwrap());
        let observability = Arc::new(ObservabilityService::new(metrics));
        let manager = manager.with_observability(observability.clone());

        let run_id = manager.create_run("extract-only", document_id).await.unwrap();
        manager.execute(run_id).await.unwrap();

        let health = observability.get_system_health().await;
        assert_eq!(health.active_operations, 0);
    }

    #[tokio::test]
    async fn cancel_transitions_a_running_run_to_cancelled() {
        let (manager, document_id) = manager().await;
        let run_id = manager.create_run("extract-only", document_id).await.unwrap();
        // Start without executing so it's still cancellable.
        let mut run = manager.runs.get(&run_id).await.unwrap().unwrap();
        run.start().unwrap();
        manager.runs.update(run).await.unwrap();
        manager.cancel(run_id).await.unwrap();
        let run = manager.runs.get(&run_id).await.unwrap().unwrap();
        assert_eq!(run.state(), RunState::Cancelled);
    }
}
