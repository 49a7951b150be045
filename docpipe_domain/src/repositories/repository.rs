// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Generic repository port. Generalizes the entity-specific repository
//! pattern (the teacher had one trait per aggregate) into a single contract
//! parameterized over the entity type, per the storage repository component.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::CoreError;

/// A comparison operator in a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
    Matches,
}

/// One `(field, operator, value)` predicate. Repositories AND all filters in
/// a query together; backends are free to push filters down where their
/// storage model allows.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A query's sort key plus ascending/descending direction.
#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// A page of results plus the total count of matching rows, so callers can
/// compute whether more pages remain without a second round trip.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        (u64::from(self.page) + 1) * u64::from(self.per_page) < self.total
    }
}

/// Query parameters shared by `list` and `search`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    pub page: u32,
    pub per_page: u32,
}

impl Query {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            sort: None,
            page: 0,
            per_page: 50,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn paginate(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }
}

/// Backend-agnostic CRUD/query/search/transaction contract over an entity
/// type `T` with identifier type `Id`.
///
/// Implementations must be `Send + Sync`: the worker pool and pipeline
/// manager call through `Arc<dyn Repository<T, Id = ..>>` from multiple
/// tasks concurrently.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Send + Sync,
{
    type Id: Send + Sync;

    async fn create(&self, entity: T) -> Result<T, CoreError>;
    async fn get(&self, id: &Self::Id) -> Result<Option<T>, CoreError>;
    async fn update(&self, entity: T) -> Result<T, CoreError>;
    async fn delete(&self, id: &Self::Id) -> Result<(), CoreError>;

    async fn list(&self, query: Query) -> Result<Page<T>, CoreError>;
    async fn count(&self, filters: &[Filter]) -> Result<u64, CoreError>;
    async fn exists(&self, id: &Self::Id) -> Result<bool, CoreError>;
    async fn search(&self, text: &str, fields: &[&str], query: Query) -> Result<Page<T>, CoreError>;

    async fn bulk_create(&self, entities: Vec<T>) -> Result<Vec<T>, CoreError>;
    async fn bulk_update(&self, entities: Vec<T>) -> Result<Vec<T>, CoreError>;
    async fn bulk_delete(&self, ids: &[Self::Id]) -> Result<(), CoreError>;

    /// Runs `scope` within a transaction. Backends without real ACID
    /// transactions (e.g. an eventual-consistency object store) may degrade
    /// this to a best-effort batch; such degradation must be documented by
    /// the concrete adapter.
    async fn transaction<'a>(
        &'a self,
        scope: Box<dyn FnOnce() -> BoxFuture<'a, Result<(), CoreError>> + Send + 'a>,
    ) -> Result<(), CoreError>;
}
