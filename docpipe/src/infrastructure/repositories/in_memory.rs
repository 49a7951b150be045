// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-process repository adapters backed by `parking_lot::RwLock<HashMap>`.
//!
//! [`InMemoryRepository`] is generic over any [`Identifiable`] entity that
//! also implements `Serialize`: queries filter/sort against the entity's own
//! JSON projection rather than a hand-written accessor per field, so adding a
//! new filterable field never touches this file. `PipelineRun` and
//! `PipelineSpec` do not derive `Serialize` (their state machines are meant
//! to be reconstructed from SQL rows, not JSON blobs), so they get the two
//! small dedicated adapters below instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use docpipe_domain::aggregates::{PipelineRun, PipelineSpec};
use docpipe_domain::repositories::repository::{Filter, FilterOp, Page, Query, Repository, SortOrder};
use docpipe_domain::value_objects::RunId;
use docpipe_domain::CoreError;

use super::Identifiable;

fn field_at<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(value, |acc, segment| acc.get(segment))
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn matches_filter(entity: &Value, filter: &Filter) -> bool {
    let Some(field) = field_at(entity, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => field == &filter.value,
        FilterOp::Neq => field != &filter.value,
        FilterOp::Lt => as_f64(field).zip(as_f64(&filter.value)).is_some_and(|(a, b)| a < b),
        FilterOp::Lte => as_f64(field).zip(as_f64(&filter.value)).is_some_and(|(a, b)| a <= b),
        FilterOp::Gt => as_f64(field).zip(as_f64(&filter.value)).is_some_and(|(a, b)| a > b),
        FilterOp::Gte => as_f64(field).zip(as_f64(&filter.value)).is_some_and(|(a, b)| a >= b),
        FilterOp::In => filter.value.as_array().is_some_and(|candidates| candidates.contains(field)),
        FilterOp::Contains => match (field.as_str(), filter.value.as_str()) {
            (Some(haystack), Some(needle)) => haystack.contains(needle),
            _ => field.as_array().is_some_and(|items| items.contains(&filter.value)),
        },
        FilterOp::Matches => match (field.as_str(), filter.value.as_str()) {
            (Some(haystack), Some(pattern)) => regex::Regex::new(pattern)
                .map(|re| re.is_match(haystack))
                .unwrap_or(false),
            _ => false,
        },
    }
}

fn compare(a: &Value, b: &Value, order: SortOrder) -> std::cmp::Ordering {
    let ordering = match (as_f64(a), as_f64(b)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    };
    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

/// Generic in-process repository keyed by an entity's own [`Identifiable::Id`].
pub struct InMemoryRepository<T: Identifiable> {
    rows: RwLock<HashMap<T::Id, T>>,
}

impl<T: Identifiable> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Identifiable> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Identifiable + Serialize + Clone + Send + Sync + 'static,
    T::Id: std::fmt::Display,
{
    type Id = T::Id;

    async fn create(&self, entity: T) -> Result<T, CoreError> {
        let id = entity.entity_id();
        let mut rows = self.rows.write();
        if rows.contains_key(&id) {
            return Err(CoreError::DuplicateKey(id.to_string()));
        }
        rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &Self::Id) -> Result<Option<T>, CoreError> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn update(&self, entity: T) -> Result<T, CoreError> {
        let id = entity.entity_id();
        let mut rows = self.rows.write();
        if !rows.contains_key(&id) {
            return Err(CoreError::NotFound(id.to_string()));
        }
        rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: &Self::Id) -> Result<(), CoreError> {
        self.rows
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    async fn list(&self, query: Query) -> Result<Page<T>, CoreError> {
        let rows = self.rows.read();
        let mut matching: Vec<(Value, T)> = rows
            .values()
            .filter_map(|entity| {
                let projected = serde_json::to_value(entity).ok()?;
                query
                    .filters
                    .iter()
                    .all(|f| matches_filter(&projected, f))
                    .then(|| (projected, entity.clone()))
            })
            .collect();

        if let Some(sort) = &query.sort {
            matching.sort_by(|(a, _), (b, _)| {
                let a = field_at(a, &sort.field).cloned().unwrap_or(Value::Null);
                let b = field_at(b, &sort.field).cloned().unwrap_or(Value::Null);
                compare(&a, &b, sort.order)
            });
        }

        let total = matching.len() as u64;
        let start = (query.page as usize) * (query.per_page.max(1) as usize);
        let items = matching
            .into_iter()
            .skip(start)
            .take(query.per_page.max(1) as usize)
            .map(|(_, entity)| entity)
            .collect();

        Ok(Page {
            items,
            page: query.page,
            per_page: query.per_page,
            total,
        })
    }

    async fn count(&self, filters: &[Filter]) -> Result<u64, CoreError> {
        let rows = self.rows.read();
        Ok(rows
            .values()
            .filter(|entity| {
                serde_json::to_value(entity)
                    .map(|projected| filters.iter().all(|f| matches_filter(&projected, f)))
                    .unwrap_or(false)
            })
            .count() as u64)
    }

    async fn exists(&self, id: &Self::Id) -> Result<bool, CoreError> {
        Ok(self.rows.read().contains_key(id))
    }

    async fn search(&self, text: &str, fields: &[&str], query: Query) -> Result<Page<T>, CoreError> {
        let needle = text.to_lowercase();
        let mut scoped = query;
        scoped.filters.clear();
        let page = self.list(scoped).await?;
        let items = page
            .items
            .into_iter()
            .filter(|entity| {
                let Ok(projected) = serde_json::to_value(entity) else {
                    return false;
                };
                fields.iter().any(|field| {
                    field_at(&projected, field)
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
                })
            })
            .collect::<Vec<_>>();
        let total = items.len() as u64;
        Ok(Page {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
        })
    }

    async fn bulk_create(&self, entities: Vec<T>) -> Result<Vec<T>, CoreError> {
        let mut created = Vec::with_capacity(entities.len());
        for entity in entities {
            created.push(self.create(entity).await?);
        }
        Ok(created)
    }

    async fn bulk_update(&self, entities: Vec<T>) -> Result<Vec<T>, CoreError> {
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

    /// No real transaction isolation: `scope` runs immediately against
    /// already-committed in-memory state. Sufficient for single-process
    /// tests; the SQLite adapters provide the real guarantee.
    async fn transaction<'a>(
        &'a self,
        scope: Box<dyn FnOnce() -> BoxFuture<'a, Result<(), CoreError>> + Send + 'a>,
    ) -> Result<(), CoreError> {
        scope().await
    }
}

/// Dedicated in-process [`PipelineRun`] store. `PipelineRun` carries no
/// `Serialize` impl (its checkpoint map is meant to round-trip through SQL
/// columns, not JSON), so filtering here is limited to the fields the
/// pipeline manager actually queries by: `state` and `document_id`.
#[derive(Default)]
pub struct InMemoryPipelineRunRepository {
    rows: RwLock<HashMap<RunId, PipelineRun>>,
}

impl InMemoryPipelineRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(run: &PipelineRun, filter: &Filter) -> bool {
        match filter.field.as_str() {
            "state" => filter
                .value
                .as_str()
                .is_some_and(|s| format!("{:?}", run.state()).eq_ignore_ascii_case(s)),
            "document_id" => filter
                .value
                .as_str()
                .is_some_and(|s| run.document_id().to_string() == s),
            _ => true,
        }
    }
}

#[async_trait]
impl Repository<PipelineRun> for InMemoryPipelineRunRepository {
    type Id = RunId;

    async fn create(&self, entity: PipelineRun) -> Result<PipelineRun, CoreError> {
        let id = entity.id();
        let mut rows = self.rows.write();
        if rows.contains_key(&id) {
            return Err(CoreError::DuplicateKey(id.to_string()));
        }
        rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &Self::Id) -> Result<Option<PipelineRun>, CoreError> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn update(&self, entity: PipelineRun) -> Result<PipelineRun, CoreError> {
        let id = entity.id();
        let mut rows = self.rows.write();
        if !rows.contains_key(&id) {
            return Err(CoreError::NotFound(id.to_string()));
        }
        rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: &Self::Id) -> Result<(), CoreError> {
        self.rows
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    async fn list(&self, query: Query) -> Result<Page<PipelineRun>, CoreError> {
        let rows = self.rows.read();
        let mut matching: Vec<PipelineRun> = rows
            .values()
            .filter(|run| query.filters.iter().all(|f| Self::matches(run, f)))
            .cloned()
            .collect();
        matching.sort_by_key(|run| run.id());
        let total = matching.len() as u64;
        let start = (query.page as usize) * (query.per_page.max(1) as usize);
        let items = matching
            .into_iter()
            .skip(start)
            .take(query.per_page.max(1) as usize)
            .collect();
        Ok(Page {
            items,
            page: query.page,
            per_page: query.per_page,
            total,
        })
    }

    async fn count(&self, filters: &[Filter]) -> Result<u64, CoreError> {
        let rows = self.rows.read();
        Ok(rows
            .values()
            .filter(|run| filters.iter().all(|f| Self::matches(run, f)))
            .count() as u64)
    }

    async fn exists(&self, id: &Self::Id) -> Result<bool, CoreError> {
        Ok(self.rows.read().contains_key(id))
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
        scope().await
    }
}

/// Dedicated in-process [`PipelineSpec`] store, keyed by spec name (specs
/// are named singletons registered once at startup, not per-run entities).
#[derive(Default)]
pub struct InMemoryPipelineSpecRepository {
    rows: RwLock<HashMap<String, PipelineSpec>>,
}

impl InMemoryPipelineSpecRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository<PipelineSpec> for InMemoryPipelineSpecRepository {
    type Id = String;

    async fn create(&self, entity: PipelineSpec) -> Result<PipelineSpec, CoreError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&entity.name) {
            return Err(CoreError::DuplicateKey(entity.name.clone()));
        }
        rows.insert(entity.name.clone(), entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &Self::Id) -> Result<Option<PipelineSpec>, CoreError> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn update(&self, entity: PipelineSpec) -> Result<PipelineSpec, CoreError> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&entity.name) {
            return Err(CoreError::NotFound(entity.name.clone()));
        }
        rows.insert(entity.name.clone(), entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: &Self::Id) -> Result<(), CoreError> {
        self.rows
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(id.clone()))
    }

    async fn list(&self, query: Query) -> Result<Page<PipelineSpec>, CoreError> {
        let rows = self.rows.read();
        let mut matching: Vec<PipelineSpec> = rows.values().cloned().collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        let total = matching.len() as u64;
        let start = (query.page as usize) * (query.per_page.max(1) as usize);
        let items = matching
            .into_iter()
            .skip(start)
            .take(query.per_page.max(1) as usize)
            .collect();
        Ok(Page {
            items,
            page: query.page,
            per_page: query.per_page,
            total,
        })
    }

    async fn count(&self, _filters: &[Filter]) -> Result<u64, CoreError> {
        Ok(self.rows.read().len() as u64)
    }

    async fn exists(&self, id: &Self::Id) -> Result<bool, CoreError> {
        Ok(self.rows.read().contains_key(id))
    }

    async fn search(&self, text: &str, _fields: &[&str], query: Query) -> Result<Page<PipelineSpec>, CoreError> {
        let needle = text.to_lowercase();
        let mut page = self.list(query).await?;
        page.items.retain(|spec| spec.name.to_lowercase().contains(&needle));
        page.total = page.items.len() as u64;
        Ok(page)
    }

    async fn bulk_create(&self, entities: Vec<PipelineSpec>) -> Result<Vec<PipelineSpec>, CoreError> {
        let mut created = Vec::with_capacity(entities.len());
        for entity in entities {
            created.push(self.create(entity).await?);
        }
        Ok(created)
    }

    async fn bulk_update(&self, entities: Vec<PipelineSpec>) -> Result<Vec<PipelineSpec>, CoreError> {
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
        scope().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_domain::entities::File;
    use docpipe_domain::value_objects::ContentHash;
    use docpipe_domain::value_objects::SessionId;
    use serde_json::json;

    fn sample_file() -> File {
        File::receive(ContentHash::of_bytes(b"hi"), "application/pdf", 10, "/tmp/a.pdf", SessionId::new())
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = InMemoryRepository::<File>::new();
        let created = repo.create(sample_file()).await.unwrap();
        let fetched = repo.get(&created.id()).await.unwrap().unwrap();
        assert_eq!(fetched.id(), created.id());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let repo = InMemoryRepository::<File>::new();
        let file = sample_file();
        repo.create(file.clone()).await.unwrap();
        assert!(matches!(repo.create(file).await, Err(CoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn list_filters_by_projected_field() {
        let repo = InMemoryRepository::<File>::new();
        repo.create(sample_file()).await.unwrap();
        let query = Query::new().filter(Filter::eq("status", json!("Received")));
        let page = repo.list(query).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn pipeline_run_repository_filters_by_state() {
        use docpipe_domain::aggregates::{PipelineSpec, StageSpec};
        use docpipe_domain::value_objects::{CorrelationId, FileId, StageId};

        let spec = PipelineSpec::new("p", vec![StageSpec::new(StageId::new(), "noop")]).unwrap();
        let run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        let repo = InMemoryPipelineRunRepository::new();
        repo.create(run).await.unwrap();

        let query = Query::new().filter(Filter::eq("state", json!("Created")));
        let page = repo.list(query).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }
}
