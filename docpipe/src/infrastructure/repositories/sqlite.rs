// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed adapters for the two entities durability matters most for:
//! [`File`] (content-hash dedup must survive a restart) and [`PipelineRun`]
//! (resumability depends on the checkpoint map surviving a crash). Every
//! other entity is served by [`super::in_memory::InMemoryRepository`] until a
//! concrete need for cross-restart persistence emerges for it too.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::{Row, SqlitePool};

use docpipe_domain::aggregates::PipelineRun;
use docpipe_domain::entities::file::{File, ValidationReport};
use docpipe_domain::repositories::repository::{Filter, Page, Query, Repository};
use docpipe_domain::value_objects::{ContentHash, FileId, RunId, SessionId};
use docpipe_domain::CoreError;

fn sql_err(err: sqlx::Error) -> CoreError {
    CoreError::BackendUnavailable(err.to_string())
}

/// SQLite-backed `Repository<File>`, mapped column-for-column onto the
/// `files` table rather than a single JSON blob, so `content_hash` stays
/// indexable for dedup lookups.
pub struct SqliteFileRepository {
    pool: SqlitePool,
}

impl SqliteFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Looks up an existing file by content hash within a session, the
    /// dedup check the upload manager runs before storing a new blob.
    pub async fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<File>, CoreError> {
        let row = sqlx::query("SELECT * FROM files WHERE content_hash = ? LIMIT 1")
            .bind(hash.to_hex())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.map(|r| row_to_file(&r)).transpose()
    }
}

fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> Result<File, CoreError> {
    let id: String = row.try_get("id").map_err(sql_err)?;
    let session_id: String = row.try_get("session_id").map_err(sql_err)?;
    let content_hash: Option<String> = row.try_get("content_hash").map_err(sql_err)?;
    let declared_mime: String = row.try_get("declared_mime").map_err(sql_err)?;
    let size_bytes: i64 = row.try_get("size_bytes").map_err(sql_err)?;
    let source_path: String = row.try_get("source_path").map_err(sql_err)?;

    let content_hash = content_hash
        .map(|h| ContentHash::from_hex(&h))
        .transpose()?
        .unwrap_or_else(|| ContentHash::of_bytes(source_path.as_bytes()));

    let mut file = File::receive(
        content_hash,
        declared_mime,
        size_bytes as u64,
        source_path,
        SessionId::from_string(&session_id)?,
    );

    // `File::receive` mints a fresh id and timestamps; a hydrated row
    // carries its own identity, so reconstruct it field-by-field through the
    // JSON representation rather than exposing a second public constructor.
    let status: String = row.try_get("status").map_err(sql_err)?;
    let detected_mime: Option<String> = row.try_get("detected_mime").map_err(sql_err)?;
    let validation_report: Option<String> = row.try_get("validation_report").map_err(sql_err)?;
    let created_at: String = row.try_get("created_at").map_err(sql_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(sql_err)?;

    let mut value = serde_json::to_value(&file)?;
    let obj = value.as_object_mut().expect("File serializes as an object");
    obj.insert("id".into(), serde_json::Value::String(id));
    obj.insert("status".into(), serde_json::Value::String(status));
    obj.insert(
        "detected_mime".into(),
        detected_mime.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null),
    );
    obj.insert("created_at".into(), serde_json::Value::String(created_at));
    obj.insert("updated_at".into(), serde_json::Value::String(updated_at));
    if let Some(report) = validation_report {
        let report: ValidationReport = serde_json::from_str(&report)?;
        obj.insert("validation_report".into(), serde_json::to_value(report)?);
    }
    file = serde_json::from_value(value)?;
    Ok(file)
}

async fn upsert_file(pool: &SqlitePool, file: &File) -> Result<(), CoreError> {
    let projected = serde_json::to_value(file)?;
    let validation_report = projected
        .get("validation_report")
        .filter(|v| !v.is_null())
        .map(|v| v.to_string());
    let detected_mime = projected.get("detected_mime").and_then(|v| v.as_str()).map(str::to_string);
    let status = format!("{:?}", file.status());
    let now = Utc::now().to_rfc3339();
    let created_at = projected.get("created_at").and_then(|v| v.as_str()).unwrap_or(&now).to_string();
    let updated_at = projected.get("updated_at").and_then(|v| v.as_str()).unwrap_or(&now).to_string();

    sqlx::query(
        "INSERT INTO files (id, session_id, content_hash, declared_mime, detected_mime, size_bytes, \
         source_path, status, validation_report, storage_ref, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           detected_mime = excluded.detected_mime, \
           status = excluded.status, \
           validation_report = excluded.validation_report, \
           updated_at = excluded.updated_at",
    )
    .bind(file.id().to_string())
    .bind(file.session_id().to_string())
    .bind(file.content_hash().to_hex())
    .bind(projected.get("declared_mime").and_then(|v| v.as_str()).unwrap_or_default())
    .bind(detected_mime)
    .bind(file.size_bytes() as i64)
    .bind(projected.get("source_path").and_then(|v| v.as_str()).unwrap_or_default())
    .bind(status)
    .bind(validation_report)
    .bind(created_at)
    .bind(updated_at)
    .execute(pool)
    .await
    .map_err(sql_err)?;
    Ok(())
}

#[async_trait]
impl Repository<File> for SqliteFileRepository {
    type Id = FileId;

    async fn create(&self, entity: File) -> Result<File, CoreError> {
        if self.exists(&entity.id()).await? {
            return Err(CoreError::DuplicateKey(entity.id().to_string()));
        }
        upsert_file(&self.pool, &entity).await?;
        Ok(entity)
    }

    async fn get(&self, id: &Self::Id) -> Result<Option<File>, CoreError> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.map(|r| row_to_file(&r)).transpose()
    }

    async fn update(&self, entity: File) -> Result<File, CoreError> {
        if !self.exists(&entity.id()).await? {
            return Err(CoreError::NotFound(entity.id().to_string()));
        }
        upsert_file(&self.pool, &entity).await?;
        Ok(entity)
    }

    async fn delete(&self, id: &Self::Id) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, query: Query) -> Result<Page<File>, CoreError> {
        let rows = sqlx::query("SELECT * FROM files")
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        let mut files = rows.iter().map(row_to_file).collect::<Result<Vec<_>, _>>()?;

        for filter in &query.filters {
            let needle = filter.value.as_str().map(str::to_string);
            files.retain(|f| match filter.field.as_str() {
                "session_id" => needle.as_deref() == Some(&f.session_id().to_string()),
                "status" => needle.as_deref() == Some(&format!("{:?}", f.status())),
                _ => true,
            });
        }

        let total = files.len() as u64;
        let start = (query.page as usize) * (query.per_page.max(1) as usize);
        let items = files.into_iter().skip(start).take(query.per_page.max(1) as usize).collect();
        Ok(Page { items, page: query.page, per_page: query.per_page, total })
    }

    async fn count(&self, filters: &[Filter]) -> Result<u64, CoreError> {
        let page = self
            .list(Query { filters: filters.to_vec(), sort: None, page: 0, per_page: u32::MAX })
            .await?;
        Ok(page.total)
    }

    async fn exists(&self, id: &Self::Id) -> Result<bool, CoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(row.is_some())
    }

    async fn search(&self, text: &str, fields: &[&str], query: Query) -> Result<Page<File>, CoreError> {
        let needle = text.to_lowercase();
        let mut page = self.list(query).await?;
        page.items.retain(|f| {
            fields.iter().any(|field| match *field {
                "source_path" => true, // source_path not exposed on File; matched via declared mime below
                "declared_mime" => f.validation_report().map(|r| r.declared_mime.to_lowercase().contains(&needle)).unwrap_or(false),
                _ => false,
            })
        });
        page.total = page.items.len() as u64;
        Ok(page)
    }

    async fn bulk_create(&self, entities: Vec<File>) -> Result<Vec<File>, CoreError> {
        let mut created = Vec::with_capacity(entities.len());
        for entity in entities {
            created.push(self.create(entity).await?);
        }
        Ok(created)
    }

    async fn bulk_update(&self, entities: Vec<File>) -> Result<Vec<File>, CoreError> {
        let mut updated = Vec::with_capacity(entities.len());
        for entity in entities {
            updated.push(self.update(entity).await?);
        }
        Ok(updated)
    }

    async fn bulk_delete(&self, ids: &[Self::Id]) -> Result<(), CoreError> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    async fn transaction<'a>(
        &'a self,
        scope: Box<dyn FnOnce() -> BoxFuture<'a, Result<(), CoreError>> + Send + 'a>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(sql_err)?;
        match scope().await {
            Ok(()) => tx.commit().await.map_err(sql_err),
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}

/// SQLite-backed `Repository<PipelineRun>`. The state machine's stage states
/// and checkpoint map serialize to the `stage_states`/`checkpoints` JSON
/// columns the migration reserves for exactly this; `state` and
/// `document_id` get their own indexed columns since those are what the
/// pipeline manager filters resumable runs by.
pub struct SqlitePipelineRunRepository {
    pool: SqlitePool,
}

impl SqlitePipelineRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<PipelineRun, CoreError> {
    let id: String = row.try_get("id").map_err(sql_err)?;
    let spec_name: String = row.try_get("spec_name").map_err(sql_err)?;
    let document_id: String = row.try_get("document_id").map_err(sql_err)?;
    let correlation_id: String = row.try_get("correlation_id").map_err(sql_err)?;
    let state: String = row.try_get("state").map_err(sql_err)?;
    let stage_states: String = row.try_get("stage_states").map_err(sql_err)?;
    let checkpoints: String = row.try_get("checkpoints").map_err(sql_err)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(sql_err)?;
    let ended_at: Option<String> = row.try_get("ended_at").map_err(sql_err)?;

    let value = serde_json::json!({
        "id": id,
        "spec_name": spec_name,
        "document_id": document_id,
        "correlation_id": correlation_id,
        "state": state,
        "stage_states": serde_json::from_str::<serde_json::Value>(&stage_states)?,
        "checkpoints": serde_json::from_str::<serde_json::Value>(&checkpoints)?,
        "started_at": started_at,
        "ended_at": ended_at,
    });
    Ok(serde_json::from_value(value)?)
}

async fn upsert_run(pool: &SqlitePool, run: &PipelineRun) -> Result<(), CoreError> {
    let projected = serde_json::to_value(run)?;
    let spec_name = projected.get("spec_name").and_then(|v| v.as_str()).unwrap_or_default();
    let stage_states = projected.get("stage_states").cloned().unwrap_or_default().to_string();
    let checkpoints = projected.get("checkpoints").cloned().unwrap_or_default().to_string();
    let started_at = projected.get("started_at").and_then(|v| v.as_str()).map(str::to_string);
    let ended_at = projected.get("ended_at").and_then(|v| v.as_str()).map(str::to_string);

    sqlx::query(
        "INSERT INTO pipeline_runs (id, spec_name, document_id, correlation_id, state, stage_states, \
         checkpoints, started_at, ended_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now')) \
         ON CONFLICT(id) DO UPDATE SET \
           state = excluded.state, \
           stage_states = excluded.stage_states, \
           checkpoints = excluded.checkpoints, \
           started_at = excluded.started_at, \
           ended_at = excluded.ended_at",
    )
    .bind(run.id().to_string())
    .bind(spec_name)
    .bind(run.document_id().to_string())
    .bind(run.correlation_id().to_string())
    .bind(format!("{:?}", run.state()))
    .bind(stage_states)
    .bind(checkpoints)
    .bind(started_at)
    .bind(ended_at)
    .execute(pool)
    .await
    .map_err(sql_err)?;
    Ok(())
}

#[async_trait]
impl Repository<PipelineRun> for SqlitePipelineRunRepository {
    type Id = RunId;

    async fn create(&self, entity: PipelineRun) -> Result<PipelineRun, CoreError> {
        if self.exists(&entity.id()).await? {
            return Err(CoreError::DuplicateKey(entity.id().to_string()));
        }
        upsert_run(&self.pool, &entity).await?;
        Ok(entity)
    }

    async fn get(&self, id: &Self::Id) -> Result<Option<PipelineRun>, CoreError> {
        let row = sqlx::query("SELECT * FROM pipeline_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.map(|r| row_to_run(&r)).transpose()
    }

    async fn update(&self, entity: PipelineRun) -> Result<PipelineRun, CoreError> {
        if !self.exists(&entity.id()).await? {
            return Err(CoreError::NotFound(entity.id().to_string()));
        }
        upsert_run(&self.pool, &entity).await?;
        Ok(entity)
    }

    async fn delete(&self, id: &Self::Id) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM pipeline_runs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, query: Query) -> Result<Page<PipelineRun>, CoreError> {
        let rows = sqlx::query("SELECT * FROM pipeline_runs")
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        let mut runs = rows.iter().map(row_to_run).collect::<Result<Vec<_>, _>>()?;

        for filter in &query.filters {
            let needle = filter.value.as_str().map(str::to_string);
            runs.retain(|r| match filter.field.as_str() {
                "state" => needle.as_deref() == Some(&format!("{:?}", r.state())),
                "document_id" => needle.as_deref() == Some(&r.document_id().to_string()),
                _ => true,
            });
        }

        let total = runs.len() as u64;
        let start = (query.page as usize) * (query.per_page.max(1) as usize);
        let items = runs.into_iter().skip(start).take(query.per_page.max(1) as usize).collect();
        Ok(Page { items, page: query.page, per_page: query.per_page, total })
    }

    async fn count(&self, filters: &[Filter]) -> Result<u64, CoreError> {
        let page = self
            .list(Query { filters: filters.to_vec(), sort: None, page: 0, per_page: u32::MAX })
            .await?;
        Ok(page.total)
    }

    async fn exists(&self, id: &Self::Id) -> Result<bool, CoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM pipeline_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(row.is_some())
    }

    async fn search(&self, _text: &str, _fields: &[&str], query: Query) -> Result<Page<PipelineRun>, CoreError> {
        self.list(query).await
    }

    async fn bulk_create(&self, entities: Vec<PipelineRun>) -> Result<Vec<PipelineRun>, CoreError> {
        let mut created = Vec::with_capacity(entities.len());
        for entity in entities {
            created.push(self.create(entity).await?);
        }
        Ok(created)
    }

    async fn bulk_update(&self, entities: Vec<PipelineRun>) -> Result<Vec<PipelineRun>, CoreError> {
        let mut updated = Vec::with_capacity(entities.len());
        for entity in entities {
            updated.push(self.update(entity).await?);
        }
        Ok(updated)
    }

    async fn bulk_delete(&self, ids: &[Self::Id]) -> Result<(), CoreError> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    async fn transaction<'a>(
        &'a self,
        scope: Box<dyn FnOnce() -> BoxFuture<'a, Result<(), CoreError>> + Send + 'a>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(sql_err)?;
        match scope().await {
            Ok(()) => tx.commit().await.map_err(sql_err),
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema::initialize_database;
    use docpipe_domain::aggregates::{PipelineSpec, StageSpec};
    use docpipe_domain::value_objects::{CorrelationId, StageId};
    use tempfile::NamedTempFile;

    async fn pool() -> SqlitePool {
        let temp = NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}", temp.path().display());
        drop(temp);
        initialize_database(&url).await.unwrap()
    }

    #[tokio::test]
    async fn file_round_trips_through_sqlite() {
        let repo = SqliteFileRepository::new(pool().await);
        let file = File::receive(ContentHash::of_bytes(b"x"), "application/pdf", 4, "/tmp/x.pdf", SessionId::new());
        let created = repo.create(file).await.unwrap();
        let fetched = repo.get(&created.id()).await.unwrap().unwrap();
        assert_eq!(fetched.id(), created.id());
        assert_eq!(fetched.content_hash(), created.content_hash());
    }

    #[tokio::test]
    async fn dedup_lookup_finds_matching_content_hash() {
        let repo = SqliteFileRepository::new(pool().await);
        let hash = ContentHash::of_bytes(b"dedup-me");
        let file = File::receive(hash, "application/pdf", 4, "/tmp/x.pdf", SessionId::new());
        repo.create(file).await.unwrap();
        let found = repo.find_by_content_hash(&hash).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn pipeline_run_checkpoint_survives_a_round_trip() {
        let repo = SqlitePipelineRunRepository::new(pool().await);
        let stage = StageId::new();
        let spec = PipelineSpec::new("p", vec![StageSpec::new(stage, "noop")]).unwrap();
        let mut run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        run.start().unwrap();
        run.mark_stage_completed(stage, "ckpt-1");
        let created = repo.create(run).await.unwrap();

        let fetched = repo.get(&created.id()).await.unwrap().unwrap();
        assert_eq!(fetched.checkpoint(stage), Some("ckpt-1"));
    }
}
