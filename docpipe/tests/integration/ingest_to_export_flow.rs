//! Drives a document through ingest, a single-stage pipeline run, and
//! export, using the same in-memory/in-process adapters the unit tests
//! use, but composed the way `main.rs` composes them.

use std::sync::Arc;

use async_trait::async_trait;
use docpipe::application::services::{Exporter, PipelineManager, UploadManager};
use docpipe::infrastructure::event_bus::InProcessEventBus;
use docpipe::infrastructure::processors::ProcessorRegistry;
use docpipe::infrastructure::repositories::in_memory::{
    InMemoryPipelineRunRepository, InMemoryPipelineSpecRepository, InMemoryRepository,
};
use docpipe::infrastructure::runtime::resource_manager::{GlobalResourceManager, ResourceConfig};
use docpipe::infrastructure::runtime::worker_pool::LocalWorkerPool;
use docpipe::infrastructure::uploads::BlobStore;
use docpipe_domain::aggregates::{PipelineSpec, RetryPolicy, StageSpec};
use docpipe_domain::entities::upload_session::UploadSession;
use docpipe_domain::entities::{BoundingBox, Element, ElementKind, ElementPayload, File, Provenance};
use docpipe_domain::repositories::repository::Repository;
use docpipe_domain::services::processor::{
    ConcurrencyClass, CostHint, InputKind, Processor, ProcessorContext, ProcessorDescriptor, ProcessorResult,
};
use docpipe_domain::value_objects::StageId;
use docpipe_domain::CoreError;

struct FakeTextExtractor(ProcessorDescriptor);

#[async_trait]
impl Processor for FakeTextExtractor {
    fn descriptor(&self) -> &ProcessorDescriptor {
        &self.0
    }

    async fn process(&self, ctx: ProcessorContext) -> Result<ProcessorResult, CoreError> {
        let title = Element::new(
            ctx.document_id,
            None,
            ElementKind::Title,
            0,
            BoundingBox { page: 1, x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
            ElementPayload::Text("Quarterly Report".into()),
            Provenance { processor_name: "extract".into(), processor_version: "1.0.0".into() },
        )?;
        let body = Element::new(
            ctx.document_id,
            None,
            ElementKind::Paragraph,
            1,
            BoundingBox { page: 1, x: 0.0, y: 0.1, w: 1.0, h: 0.8 },
            ElementPayload::Text("Revenue grew 12% year over year.".into()),
            Provenance { processor_name: "extract".into(), processor_version: "1.0.0".into() },
        )?;
        Ok(ProcessorResult::new(vec![title, body]))
    }
}

#[tokio::test]
async fn a_document_ingested_and_run_exports_its_extracted_text() {
    let dir = tempfile::tempdir().unwrap();

    let files: Arc<InMemoryRepository<File>> = Arc::new(InMemoryRepository::new());
    let sessions: Arc<InMemoryRepository<UploadSession>> = Arc::new(InMemoryRepository::new());
    let elements: Arc<InMemoryRepository<Element>> = Arc::new(InMemoryRepository::new());
    let specs = Arc::new(InMemoryPipelineSpecRepository::new());
    let runs = Arc::new(InMemoryPipelineRunRepository::new());

    let blob_store = Arc::new(BlobStore::new(dir.path()));
    let event_bus = Arc::new(InProcessEventBus::new(64));

    let registry = Arc::new(ProcessorRegistry::new());
    registry.register(Arc::new(FakeTextExtractor(ProcessorDescriptor {
        name: "extract".into(),
        version: "1.0.0".into(),
        accepted_inputs: vec![InputKind::Mime("text/plain".into())],
        produced_artifact_schema: "element".into(),
        cost_hint: CostHint::Small,
        concurrency_class: ConcurrencyClass::CpuBound,
        priority: 1,
    })));
    let resources = Arc::new(GlobalResourceManager::new(ResourceConfig::default()).unwrap());
    let worker_pool = LocalWorkerPool::new(resources);

    let upload_manager = UploadManager::new(
        files.clone(),
        sessions,
        blob_store,
        event_bus.clone(),
        std::time::Duration::from_secs(3600),
    );
    let pipeline_manager =
        PipelineManager::new(specs.clone(), runs, files, elements.clone(), registry, worker_pool, event_bus);
    let exporter = Exporter::new(elements);

    let stage = StageId::new();
    let spec = PipelineSpec::new(
        "extract-only",
        vec![StageSpec::new(stage, "extract").with_retry(RetryPolicy::none())],
    )
    .unwrap();
    specs.create(spec).await.unwrap();

    let session = upload_manager.open_session("integration-test").await.unwrap();
    let uploaded = upload_manager
        .upload(session, "text/plain", "report.txt", b"irrelevant source bytes".to_vec())
        .await
        .unwrap();
    upload_manager.finalize(uploaded.id()).await.unwrap();
    upload_manager.close_session(session).await.unwrap();

    let run_id = pipeline_manager.create_run("extract-only", uploaded.id()).await.unwrap();
    let state = pipeline_manager.execute(run_id).await.unwrap();
    assert_eq!(state, docpipe_domain::aggregates::RunState::Completed);
    assert_eq!(pipeline_manager.status(run_id).await.unwrap(), docpipe_domain::aggregates::RunState::Completed);

    let rendered = exporter
        .export(&[uploaded.id()], docpipe::application::commands::ExportFormat::Markdown, None)
        .await
        .unwrap();
    assert!(rendered.starts_with("# Quarterly Report"));
    assert!(rendered.contains("Revenue grew 12% year over year."));
}
