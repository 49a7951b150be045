// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Manager (§4.3)
//!
//! Owns the file-ingestion path: opening an upload session, validating and
//! hashing each file, deduplicating by content hash, and emitting the
//! `file.received`/`file.validated`|`file.rejected`/`file.stored` events
//! other components (the Pipeline Manager, the Progress Tracker) react to.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use docpipe_domain::entities::file::{File, FileStatus, ValidationReport};
use docpipe_domain::entities::upload_session::UploadSession;
use docpipe_domain::events::catalogue::{FileReceived, FileRejected, FileStored, FileValidated};
use docpipe_domain::events::domain_event::{DomainEvent, EventPayload};
use docpipe_domain::repositories::repository::Repository;
use docpipe_domain::services::event_bus::{BusEvent, EventBus};
use docpipe_domain::value_objects::{ContentHash, CorrelationId, FileId, SessionId};
use docpipe_domain::CoreError;

use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::repositories::in_memory::InMemoryRepository;
use crate::infrastructure::repositories::sqlite::SqliteFileRepository;
use crate::infrastructure::uploads::BlobStore;

/// Mime types the validation step accepts; anything else is rejected
/// outright rather than queued for a pipeline that has nothing to run
/// against it.
const ACCEPTED_MIME_PREFIXES: &[&str] = &["application/pdf", "text/", "image/"];

/// Content-hash dedup lookup, implemented directly against whatever index
/// the backing repository keeps -- `SqliteFileRepository` has a real SQL
/// column for it, `InMemoryRepository` falls back to a scan.
#[async_trait]
pub trait FileLookup: Send + Sync {
    async fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<File>, CoreError>;
}

#[async_trait]
impl FileLookup for SqliteFileRepository {
    async fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<File>, CoreError> {
        SqliteFileRepository::find_by_content_hash(self, hash).await
    }
}

#[async_trait]
impl FileLookup for InMemoryRepository<File> {
    async fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<File>, CoreError> {
        let page = self
            .list(docpipe_domain::repositories::repository::Query::new().paginate(0, u32::MAX))
            .await?;
        Ok(page.items.into_iter().find(|file| file.content_hash() == *hash))
    }
}

fn envelope<T: EventPayload + serde::Serialize>(correlation_id: CorrelationId, payload: T) -> BusEvent {
    let name = payload.event_name();
    let wrapped = DomainEvent::new_with_correlation(payload, correlation_id, None);
    let json = serde_json::to_value(&wrapped).unwrap_or(serde_json::Value::Null);
    BusEvent::new(name, json).with_correlation(correlation_id)
}

/// Orchestrates file ingestion: `open_session` starts an `UploadSession`
/// with the configured TTL, `upload` accepts one file into it, `finalize`
/// closes the session off and marks the file queued for the Pipeline
/// Manager.
pub struct UploadManager<R, S>
where
    R: Repository<File, Id = FileId> + FileLookup,
    S: Repository<UploadSession, Id = SessionId>,
{
    files: Arc<R>,
    sessions: Arc<S>,
    blob_store: Arc<BlobStore>,
    event_bus: Arc<dyn EventBus>,
    session_ttl: chrono::Duration,
    metrics: Option<Arc<MetricsService>>,
}

impl<R, S> UploadManager<R, S>
where
    R: Repository<File, Id = FileId> + FileLookup,
    S: Repository<UploadSession, Id = SessionId>,
{
    pub fn new(
        files: Arc<R>,
        sessions: Arc<S>,
        blob_store: Arc<BlobStore>,
        event_bus: Arc<dyn EventBus>,
        session_ttl: std::time::Duration,
    ) -> Self {
        Self {
            files,
            sessions,
            blob_store,
            event_bus,
            session_ttl: chrono::Duration::from_std(session_ttl).unwrap_or(chrono::Duration::hours(1)),
            metrics: None,
        }
    }

    /// Registers a metrics service to record file ingestion counters
    /// against. Optional -- a manager without one still ingests files, it
    /// just reports nothing to Prometheus.
    pub fn with_metrics(mut self, metrics: Arc<MetricsService>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn open_session(&self, owner: impl Into<String>) -> Result<SessionId, CoreError> {
        let session = UploadSession::open(owner, self.session_ttl);
        let id = session.id();
        self.sessions.create(session).await?;
        Ok(id)
    }

    /// Accepts one file's bytes into `session_id`: hashes, dedups, validates
    /// against the declared mime, stores the blob on a pass, and persists
    /// the resulting `File` in whichever status validation produced.
    pub async fn upload(
        &self,
        session_id: SessionId,
        declared_mime: impl Into<String>,
        source_path: impl AsRef<Path>,
        bytes: Vec<u8>,
    ) -> Result<File, CoreError> {
        let mut session = self
            .sessions
            .get(&session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("upload session {session_id} not found")))?;
        if session.status() != docpipe_domain::entities::upload_session::SessionStatus::Open
            || session.is_expired_at(Utc::now())
        {
            return Err(CoreError::ValidationFailed(format!(
                "upload session {session_id} is not open"
            )));
        }

        let declared_mime = declared_mime.into();
        let source_path = source_path.as_ref().to_string_lossy().to_string();
        let hash = ContentHash::of_bytes(&bytes);
        let correlation_id = CorrelationId::new();

        let duplicate_of = self.files.find_by_content_hash(&hash).await?;
        if let Some(duplicate) = &duplicate_of {
            info!(existing_file_id = %duplicate.id(), %hash, "duplicate content, will skip blob write");
        }

        let mut file = File::receive(hash, declared_mime.clone(), bytes.len() as u64, source_path, session_id);
        if let Some(metrics) = &self.metrics {
            metrics.record_file_received();
        }
        let _ = self
            .event_bus
            .publish(envelope(correlation_id, FileReceived {
                file_id: file.id(),
                session_id,
                size_bytes: file.size_bytes(),
            }))
            .await;

        let report = self.validate(&declared_mime, &bytes);
        if report.passed {
            file.validate(report.clone(), report.detected_mime.clone())?;
            let _ = self
                .event_bus
                .publish(envelope(correlation_id, FileValidated {
                    file_id: file.id(),
                    content_hash: hash,
                    detected_mime: report.detected_mime,
                }))
                .await;

            let deduplicated = duplicate_of.is_some();
            let path = if deduplicated {
                self.blob_store.path_for(hash)
            } else {
                let path = self.blob_store.put(hash, &bytes).await?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_bytes_stored(file.size_bytes());
                }
                path
            };
            let _ = self
                .event_bus
                .publish(envelope(correlation_id, FileStored {
                    file_id: file.id(),
                    content_hash: hash,
                    storage_ref: path.to_string_lossy().to_string(),
                    deduplicated,
                }))
                .await;
        } else {
            warn!(file_id = %file.id(), reasons = ?report.reasons, "upload rejected");
            file.reject(report.clone())?;
            if let Some(metrics) = &self.metrics {
                metrics.record_file_rejected();
            }
            let _ = self
                .event_bus
                .publish(envelope(correlation_id, FileRejected {
                    file_id: file.id(),
                    reasons: report.reasons,
                }))
                .await;
        }

        session.add_file(file.id(), Utc::now())?;
        self.sessions.update(session).await?;
        self.files.create(file).await
    }

    /// Marks a validated file ready for the Pipeline Manager to pick up.
    pub async fn finalize(&self, file_id: FileId) -> Result<File, CoreError> {
        let mut file = self
            .files
            .get(&file_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("file {file_id} not found")))?;
        if file.status() != FileStatus::Validated {
            return Err(CoreError::ValidationFailed(format!(
                "file {file_id} must be validated before it can be finalized, is {:?}",
                file.status()
            )));
        }
        file.enqueue()?;
        self.files.update(file).await
    }

    /// Closes a session off -- no further files may be added, but already
    /// uploaded files remain queryable through their own ids.
    pub async fn close_session(&self, session_id: SessionId) -> Result<(), CoreError> {
        let mut session = self
            .sessions
            .get(&session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("upload session {session_id} not found")))?;
        session.finalize(Utc::now())?;
        self.sessions.update(session).await?;
        Ok(())
    }

    fn validate(&self, declared_mime: &str, bytes: &[u8]) -> ValidationReport {
        let mut reasons = Vec::new();
        if bytes.is_empty() {
            reasons.push("file is empty".to_string());
        }
        let accepted = ACCEPTED_MIME_PREFIXES.iter().any(|prefix| declared_mime.starts_with(prefix));
        if !accepted {
            reasons.push(format!("declared mime {declared_mime} is not accepted"));
        }

        let detected_mime = match sniff_mime(bytes) {
            Some(sniffed) => {
                if sniffed != declared_mime {
                    reasons.push(format!(
                        "declared mime {declared_mime} does not match detected signature {sniffed}"
                    ));
                }
                sniffed.to_string()
            }
            None if declared_mime.starts_with("text/") => declared_mime.to_string(),
            None => {
                reasons.push(format!("no recognized file signature for declared mime {declared_mime}"));
                declared_mime.to_string()
            }
        };

        ValidationReport {
            declared_mime: declared_mime.to_string(),
            detected_mime,
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

/// Inspects the payload's leading bytes for a known file signature. `text/*`
/// has no universal magic number, so it is left to the caller to trust
/// declared mime for that prefix; binary formats with a signature are
/// corroborated here so a mislabeled upload is caught instead of trusted.
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    const PDF_MAGIC: &[u8] = b"%PDF-";
    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

    if bytes.starts_with(PDF_MAGIC) {
        Some("application/pdf")
    } else if bytes.starts_with(PNG_MAGIC) {
        Some("image/png")
    } else if bytes.starts_with(JPEG_MAGIC) {
        Some("image/jpeg")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_bus::InProcessEventBus;

    type TestManager = UploadManager<InMemoryRepository<File>, InMemoryRepository<UploadSession>>;

    async fn manager() -> (TestManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let files = Arc::new(InMemoryRepository::new());
        let sessions = Arc::new(InMemoryRepository::new());
        let blob_store = Arc::new(BlobStore::new(dir.path()));
        let event_bus = Arc::new(InProcessEventBus::new(64));
        let manager = UploadManager::new(
            files,
            sessions,
            blob_store,
            event_bus,
            std::time::Duration::from_secs(3600),
        );
        (manager, dir)
    }

    #[tokio::test]
    async fn accepted_mime_is_validated_and_stored() {
        let (manager, _dir) = manager().await;
        let session = manager.open_session("alice").await.unwrap();
        let file = manager
            .upload(session, "application/pdf", "in.pdf", b"%PDF-1.4".to_vec())
            .await
            .unwrap();
        assert_eq!(file.status(), FileStatus::Validated);
        assert!(manager.blob_store.exists(file.content_hash()));
    }

    #[tokio::test]
    async fn unaccepted_mime_is_rejected_without_storing_a_blob() {
        let (manager, _dir) = manager().await;
        let session = manager.open_session("alice").await.unwrap();
        let file = manager
            .upload(session, "application/x-unknown", "in.bin", b"data".to_vec())
            .await
            .unwrap();
        assert_eq!(file.status(), FileStatus::Rejected);
        assert!(!manager.blob_store.exists(file.content_hash()));
    }

    #[tokio::test]
    async fn uploading_identical_bytes_twice_mints_a_new_file_and_skips_the_blob_write() {
        let (manager, _dir) = manager().await;
        let session = manager.open_session("alice").await.unwrap();
        let first = manager
            .upload(session, "text/plain", "a.txt", b"same bytes".to_vec())
            .await
            .unwrap();
        let second = manager
            .upload(session, "text/plain", "b.txt", b"same bytes".to_vec())
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.content_hash(), second.content_hash());
        assert!(manager.blob_store.exists(second.content_hash()));
    }

    #[tokio::test]
    async fn a_pdf_declared_as_an_image_is_rejected_on_signature_mismatch() {
        let (manager, _dir) = manager().await;
        let session = manager.open_session("alice").await.unwrap();
        let file = manager
            .upload(session, "image/png", "fake.png", b"%PDF-1.4".to_vec())
            .await
            .unwrap();
        assert_eq!(file.status(), FileStatus::Rejected);
    }

    #[tokio::test]
    async fn finalize_requires_a_validated_file() {
        let (manager, _dir) = manager().await;
        let session = manager.open_session("alice").await.unwrap();
        let rejected = manager
            .upload(session, "application/x-unknown", "in.bin", b"data".to_vec())
            .await
            .unwrap();
        assert!(manager.finalize(rejected.id()).await.is_err());
    }

    #[tokio::test]
    async fn upload_against_an_unknown_session_is_rejected() {
        let (manager, _dir) = manager().await;
        let result = manager
            .upload(SessionId::new(), "application/pdf", "in.pdf", b"data".to_vec())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn closing_a_session_prevents_further_uploads() {
        let (manager, _dir) = manager().await;
        let session = manager.open_session("alice").await.unwrap();
        manager.close_session(session).await.unwrap();
        let result = manager
            .upload(session, "application/pdf", "in.pdf", b"data".to_vec())
            .await;
        assert!(result.is_err());
    }
}
