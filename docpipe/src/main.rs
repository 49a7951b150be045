// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Composition root: wires every port to its concrete infrastructure
//! adapter, then dispatches one validated CLI command. Initialization
//! order -- tracing, resource governor, storage, then services -- mirrors
//! the teacher's own `main`: observability comes up first, so every later
//! failure is logged through `tracing`, not just printed to stderr.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use docpipe_bootstrap::exit_code::result_to_exit_code;
use docpipe_bootstrap::{bootstrap_cli, ValidatedCommand};

use docpipe::application::commands::ExportFormat;
use docpipe::application::services::{Exporter, PipelineManager, ProgressTracker, RelationshipEngine, UploadManager};
use docpipe::infrastructure::cache::TieredCache;
use docpipe::infrastructure::config::AppConfig;
use docpipe::infrastructure::event_bus::InProcessEventBus;
use docpipe::infrastructure::logging::ObservabilityService;
use docpipe::infrastructure::metrics::{MetricsEndpoint, MetricsService};
use docpipe::infrastructure::processors::ProcessorRegistry;
use docpipe::infrastructure::repositories::in_memory::{InMemoryPipelineSpecRepository, InMemoryRepository};
use docpipe::infrastructure::repositories::schema;
use docpipe::infrastructure::repositories::sqlite::{SqliteFileRepository, SqlitePipelineRunRepository};
use docpipe::infrastructure::runtime::resource_manager::{GlobalResourceManager, ResourceConfig, StorageType};
use docpipe::infrastructure::runtime::worker_pool::LocalWorkerPool;
use docpipe::infrastructure::uploads::BlobStore;
use docpipe_domain::entities::relationship::Relationship;
use docpipe_domain::entities::upload_session::UploadSession;
use docpipe_domain::entities::Element;
use docpipe_domain::services::event_bus::{DeliveryMode, EventBus};
use docpipe_domain::value_objects::{FileId, RunId};
use docpipe_domain::CoreError;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let validated_cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            return std::process::ExitCode::from(2);
        }
    };

    init_tracing(validated_cli.verbose);
    result_to_exit_code(run(validated_cli).await)
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(cli: docpipe_bootstrap::ValidatedCli) -> Result<(), CoreError> {
    let config = AppConfig::load(cli.config.as_deref())?;

    let mut resource_config = ResourceConfig::from_worker_pool_config(&config.worker_pool);
    if let Some(cpu) = cli.cpu_threads {
        resource_config.cpu_tokens = Some(cpu);
    }
    if let Some(io) = cli.io_threads {
        resource_config.io_tokens = Some(io);
    }
    if let Some(storage_type) = cli.storage_type.as_deref() {
        resource_config.storage_type = match storage_type {
            "nvme" => StorageType::NVMe,
            "ssd" => StorageType::Ssd,
            "hdd" => StorageType::Hdd,
            other => return Err(CoreError::ValidationFailed(format!("unknown storage type '{other}'"))),
        };
    }
    let resources = Arc::new(GlobalResourceManager::new(resource_config)?);

    let metrics = Arc::new(MetricsService::new()?);
    let metrics_endpoint = MetricsEndpoint::new(metrics.clone(), config.metrics_port());
    tokio::spawn(async move {
        if let Err(e) = metrics_endpoint.start().await {
            tracing::error!("metrics endpoint exited: {e}");
        }
    });
    let observability = Arc::new(ObservabilityService::new(metrics.clone()));

    let pool = schema::initialize_database(&config.storage.database_url)
        .await
        .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;

    let files = Arc::new(SqliteFileRepository::new(pool.clone()));
    let runs = Arc::new(SqlitePipelineRunRepository::new(pool));
    let specs = Arc::new(InMemoryPipelineSpecRepository::new());
    let sessions: Arc<InMemoryRepository<UploadSession>> = Arc::new(InMemoryRepository::new());
    let elements: Arc<InMemoryRepository<Element>> = Arc::new(InMemoryRepository::new());
    let relationships: Arc<InMemoryRepository<Relationship>> = Arc::new(InMemoryRepository::new());

    let blob_store = Arc::new(BlobStore::new(config.storage.blob_directory.clone()));
    // Constructed so the L1/L2/L3 tiers are live from process start; no
    // `Processor` in this crate consults it yet (§4.4 is a plug-in point,
    // and `ProcessorCacheHandle` has no adapter over `Cache` yet either).
    let _cache = TieredCache::new(&config.cache);

    let event_bus = Arc::new(InProcessEventBus::new(cli.channel_depth));
    let progress = ProgressTracker::new(event_bus.clone(), config.progress.clone());
    event_bus
        .subscribe("stage.*", DeliveryMode::Parallel, progress.clone())
        .await?;

    // No concrete `Processor` ships in this crate -- it is a plug-in point
    // (§4.4); an empty registry means every stage dispatch fails fast with
    // `no processor registered` rather than silently doing nothing.
    let registry = Arc::new(ProcessorRegistry::new());
    let worker_pool = LocalWorkerPool::new(resources);

    let upload_manager = UploadManager::new(
        files.clone(),
        sessions,
        blob_store,
        event_bus.clone(),
        config.upload_session_ttl(),
    )
    .with_metrics(metrics.clone());
    let pipeline_manager =
        PipelineManager::new(specs, runs, files, elements.clone(), registry, worker_pool, event_bus.clone())
            .with_progress_tracker(progress)
            .with_metrics(metrics)
            .with_observability(observability);
    let relationship_engine = RelationshipEngine::new(elements.clone(), relationships, event_bus, Default::default());
    let exporter = Exporter::new(elements);

    match cli.command {
        ValidatedCommand::Ingest { paths, session } => {
            ingest(&upload_manager, paths, session).await?;
        }
        ValidatedCommand::Run { spec, document } => {
            let document_id = FileId::from_str(&document)?;
            let run_id = pipeline_manager.create_run(&spec, document_id).await?;
            let state = pipeline_manager.execute(run_id).await?;
            relationship_engine.analyze_document(document_id).await?;
            println!("run {run_id} finished in state {state:?}");
        }
        ValidatedCommand::Status { run } => {
            let run_id = RunId::from_str(&run)?;
            let state = pipeline_manager.status(run_id).await?;
            println!("{state:?}");
        }
        ValidatedCommand::Cancel { run } => {
            let run_id = RunId::from_str(&run)?;
            pipeline_manager.cancel(run_id).await?;
        }
        ValidatedCommand::Resume { run } => {
            let run_id = RunId::from_str(&run)?;
            let state = pipeline_manager.resume(run_id).await?;
            println!("run {run_id} finished in state {state:?}");
        }
        ValidatedCommand::Export { format, documents, output } => {
            let format = ExportFormat::from_str(&format).map_err(CoreError::ValidationFailed)?;
            let document_ids = documents
                .iter()
                .map(|d| FileId::from_str(d))
                .collect::<Result<Vec<_>, _>>()?;
            let rendered = exporter.export(&document_ids, format, output.as_deref()).await?;
            if output.is_none() {
                println!("{rendered}");
            }
        }
    }

    Ok(())
}

async fn ingest(
    upload_manager: &UploadManager<SqliteFileRepository, InMemoryRepository<UploadSession>>,
    paths: Vec<PathBuf>,
    session: Option<String>,
) -> Result<(), CoreError> {
    let session_id = upload_manager.open_session(session.unwrap_or_else(|| "cli".to_string())).await?;

    for path in paths {
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CoreError::ValidationFailed(format!("reading {}: {e}", path.display())))?;
        let mime = guess_mime(&path);
        let file = upload_manager.upload(session_id, mime, &path, bytes).await?;
        upload_manager.finalize(file.id()).await?;
        println!("ingested {} as {}", path.display(), file.id());
    }
    upload_manager.close_session(session_id).await
}

/// Maps a handful of common extensions onto the mime prefixes the upload
/// manager's validation step accepts (`application/pdf`, `text/*`,
/// `image/*`); anything else is declared `application/octet-stream` and
/// left for validation to reject.
fn guess_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).unwrap_or_default().to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "txt" | "md" | "csv" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
