// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Bus port
//!
//! Typed publish/subscribe contract with a declared delivery mode per
//! subscription. The domain only specifies the contract; the bounded queue,
//! middleware chain, and concrete delivery live in the infrastructure layer.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::value_objects::CorrelationId;
use crate::CoreError;

/// How a subscription wants its events delivered relative to other events on
/// the same subscription.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeliveryMode {
    /// Handler invocations may run concurrently across different events.
    Parallel,
    /// Handler invocations for the same correlation id run strictly in
    /// publish order; different correlation ids may still interleave.
    SerializedPerCorrelationId,
}

/// One message on the bus: an opaque topic string, a JSON payload, and the
/// correlation id used to serialize delivery for
/// [`DeliveryMode::SerializedPerCorrelationId`] subscriptions.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Value,
    pub correlation_id: Option<CorrelationId>,
}

impl BusEvent {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// A registered handler. Middleware and the bus itself treat an `Err` as an
/// isolated failure: it is captured and counted, never propagated to the
/// publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &BusEvent) -> Result<(), CoreError>;
}

/// An ordered middleware step. Returning `Ok(None)` drops the event before
/// it reaches any handler; `Ok(Some(event))` passes a (possibly
/// transformed) event onward.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn apply(&self, event: BusEvent) -> Result<Option<BusEvent>, CoreError>;

    fn name(&self) -> &'static str;
}

/// Handle returned by `subscribe`; dropping or calling `unsubscribe`
/// deregisters the handler.
pub struct Subscription {
    pub id: uuid::Uuid,
    pub topic_pattern: String,
}

/// Typed publish/subscribe port. `publish` is documented non-blocking up to
/// the bounded queue's capacity: once full it fails fast with
/// `CoreError::QueueFull` rather than blocking the producer.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: BusEvent) -> Result<(), CoreError>;

    async fn subscribe(
        &self,
        topic_pattern: &str,
        mode: DeliveryMode,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, CoreError>;

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), CoreError>;

    /// Drains the queue for up to `grace` before cancelling any handlers
    /// still outstanding.
    async fn shutdown(&self, grace: std::time::Duration) -> Result<(), CoreError>;
}
