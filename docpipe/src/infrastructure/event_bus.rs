// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Bus
//!
//! An in-process publish/subscribe runtime implementing
//! [`docpipe_domain::services::event_bus::EventBus`]: a bounded-capacity
//! dispatcher (backpressure via a counting semaphore, the same RAII-permit
//! idiom the resource governor uses), an ordered middleware chain applied
//! before any handler sees an event, and per-correlation-id serialization for
//! subscriptions that ask for it.

pub mod middleware;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use docpipe_domain::services::event_bus::{
    BusEvent, DeliveryMode, EventBus, EventHandler, Middleware, Subscription,
};
use docpipe_domain::value_objects::CorrelationId;
use docpipe_domain::CoreError;

struct SubscriberEntry {
    topic_pattern: String,
    mode: DeliveryMode,
    handler: Arc<dyn EventHandler>,
}

/// Whether `pattern` matches `topic`. A pattern ending in `.*` matches any
/// topic sharing its prefix (`"file.*"` matches `"file.received"`);
/// otherwise an exact match is required.
fn topic_matches(pattern: &str, topic: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix(".*") {
        topic.starts_with(prefix) && topic.as_bytes().get(prefix.len()) == Some(&b'.')
    } else {
        pattern == topic
    }
}

/// Serializes handler invocation per correlation id for
/// [`DeliveryMode::SerializedPerCorrelationId`] subscriptions, without
/// blocking delivery to events carrying a different (or no) correlation id.
#[derive(Default)]
struct CorrelationLocks {
    locks: DashMap<CorrelationId, Arc<Mutex<()>>>,
}

impl CorrelationLocks {
    fn lock_for(&self, correlation_id: CorrelationId) -> Arc<Mutex<()>> {
        self.locks
            .entry(correlation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// In-process event bus. One instance is shared (via `Arc`) across every
/// component that publishes or subscribes; there is no external broker.
pub struct InProcessEventBus {
    subscribers: Arc<DashMap<Uuid, SubscriberEntry>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    correlation_locks: Arc<CorrelationLocks>,
    queue_permits: Arc<Semaphore>,
    in_flight: Mutex<JoinSet<()>>,
    shutting_down: AtomicBool,
}

impl InProcessEventBus {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            middleware: RwLock::new(Vec::new()),
            correlation_locks: Arc::new(CorrelationLocks::default()),
            queue_permits: Arc::new(Semaphore::new(queue_capacity)),
            in_flight: Mutex::new(JoinSet::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub async fn register_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware.write().await.push(middleware);
    }

    async fn run_middleware(&self, mut event: BusEvent) -> Result<Option<BusEvent>, CoreError> {
        let chain = self.middleware.read().await;
        for step in chain.iter() {
            match step.apply(event).await? {
                Some(next) => event = next,
                None => return Ok(None),
            }
        }
        Ok(Some(event))
    }

    fn matching_subscribers(&self, topic: &str) -> Vec<(Uuid, DeliveryMode, Arc<dyn EventHandler>)> {
        self.subscribers
            .iter()
            .filter(|entry| topic_matches(&entry.topic_pattern, topic))
            .map(|entry| (*entry.key(), entry.mode, entry.handler.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl EventBus for InProcessEventBus {
    async fn publish(&self, event: BusEvent) -> Result<(), CoreError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(CoreError::QueueFull("event bus is shutting down".into()));
        }

        let permit = Arc::new(
            self.queue_permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| CoreError::QueueFull("event bus queue is at capacity".into()))?,
        );

        let Some(event) = self.run_middleware(event).await? else {
            return Ok(());
        };

        let targets = self.matching_subscribers(&event.topic);
        if targets.is_empty() {
            return Ok(());
        }

        let correlation_locks = self.correlation_locks.clone();
        let mut tasks = self.in_flight.lock().await;
        for (_, mode, handler) in targets {
            let event = event.clone();
            let correlation_locks = correlation_locks.clone();
            let permit_clone = permit.clone();
            tasks.spawn(async move {
                let _permit = permit_clone;
                if mode == DeliveryMode::SerializedPerCorrelationId {
                    if let Some(correlation_id) = event.correlation_id {
                        let lock = correlation_locks.lock_for(correlation_id);
                        let _guard = lock.lock().await;
                        let _ = handler.handle(&event).await;
                        return;
                    }
                }
                let _ = handler.handle(&event).await;
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic_pattern: &str,
        mode: DeliveryMode,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, CoreError> {
        let id = Uuid::new_v4();
        self.subscribers.insert(
            id,
            SubscriberEntry {
                topic_pattern: topic_pattern.to_string(),
                mode,
                handler,
            },
        );
        Ok(Subscription {
            id,
            topic_pattern: topic_pattern.to_string(),
        })
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), CoreError> {
        self.subscribers.remove(&subscription.id);
        Ok(())
    }

    async fn shutdown(&self, grace: Duration) -> Result<(), CoreError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut tasks = self.in_flight.lock().await;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tasks.abort_all();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &BusEvent) -> Result<(), CoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn subscriber_receives_a_matching_published_event() {
        let bus = InProcessEventBus::new(16);
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "file.received",
            DeliveryMode::Parallel,
            Arc::new(CountingHandler(count.clone())),
        )
        .await
        .unwrap();

        bus.publish(BusEvent::new("file.received", json!({"ok": true})))
            .await
            .unwrap();
        bus.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn glob_pattern_matches_topic_prefix() {
        assert!(topic_matches("file.*", "file.received"));
        assert!(!topic_matches("file.*", "stage.completed"));
        assert!(topic_matches("stage.completed", "stage.completed"));
    }

    #[tokio::test]
    async fn publish_past_capacity_fails_fast_with_queue_full() {
        let bus = InProcessEventBus::new(0);
        let result = bus
            .publish(BusEvent::new("file.received", json!({})))
            .await;
        assert!(matches!(result, Err(CoreError::QueueFull(_))));
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let bus = InProcessEventBus::new(16);
        let count = Arc::new(AtomicUsize::new(0));
        let sub = bus
            .subscribe(
                "file.received",
                DeliveryMode::Parallel,
                Arc::new(CountingHandler(count.clone())),
            )
            .await
            .unwrap();
        bus.unsubscribe(sub).await.unwrap();
        bus.publish(BusEvent::new("file.received", json!({})))
            .await
            .unwrap();
        bus.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
