// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Tracker (§4.7)
//!
//! Aggregates per-run stage completion into a progress fraction and
//! republishes it, throttled: at most one `progress` event every
//! `min_emit_interval_ms`, plus one on every crossing of
//! `emit_delta_fraction` regardless of elapsed time. Subscribes to
//! `stage.*` on the event bus to drive the per-run counters; other
//! components (the upload manager, the worker pool) may also call
//! [`ProgressTracker::report`] directly for entities that aren't stages.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;

use docpipe_domain::events::catalogue::ProgressEntity;
use docpipe_domain::events::domain_event::{DomainEvent, EventPayload};
use docpipe_domain::services::event_bus::{BusEvent, EventBus, EventHandler};
use docpipe_domain::value_objects::{CorrelationId, RunId};
use docpipe_domain::CoreError;

use crate::infrastructure::config::ProgressConfig;

fn envelope<T: EventPayload + serde::Serialize>(correlation_id: CorrelationId, payload: T) -> BusEvent {
    let name = payload.event_name();
    let wrapped = DomainEvent::new_with_correlation(payload, correlation_id, None);
    let json = serde_json::to_value(&wrapped).unwrap_or(serde_json::Value::Null);
    BusEvent::new(name, json).with_correlation(correlation_id)
}

/// Pulls just the `run_id` field common to every `stage.*` payload, so one
/// handler covers `stage.completed`/`stage.failed`/`stage.skipped` without
/// matching on the concrete event type.
#[derive(Debug, Deserialize)]
struct StageEventProbe {
    run_id: RunId,
}

struct EmitState {
    fraction: f64,
    at: Instant,
}

pub struct ProgressTracker {
    event_bus: std::sync::Arc<dyn EventBus>,
    config: ProgressConfig,
    stage_totals: DashMap<RunId, u32>,
    stage_completed: DashMap<RunId, u32>,
    last_emitted: DashMap<String, Mutex<Option<EmitState>>>,
}

impl ProgressTracker {
    pub fn new(event_bus: std::sync::Arc<dyn EventBus>, config: ProgressConfig) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            event_bus,
            config,
            stage_totals: DashMap::new(),
            stage_completed: DashMap::new(),
            last_emitted: DashMap::new(),
        })
    }

    /// Registers how many stages a run will execute, so `stage.*` events can
    /// be converted into a completion fraction. Called by the pipeline
    /// manager when it creates the run.
    pub fn register_run(&self, run_id: RunId, total_stages: u32) {
        self.stage_totals.insert(run_id, total_stages.max(1));
        self.stage_completed.insert(run_id, 0);
    }

    /// The stage count a run was registered with, if any.
    pub fn registered_stage_total(&self, run_id: RunId) -> Option<u32> {
        self.stage_totals.get(&run_id).map(|t| *t)
    }

    /// Reports a progress fraction for an arbitrary entity, applying the
    /// rate-limit/delta throttle before publishing. Always lets `1.0`
    /// (completion) through regardless of throttle state.
    pub async fn report(&self, entity: ProgressEntity, fraction: f64, message: Option<String>) -> Result<(), CoreError> {
        let fraction = fraction.clamp(0.0, 1.0);
        let key = format!("{entity:?}");
        let now = Instant::now();

        let should_emit = {
            let slot = self.last_emitted.entry(key).or_insert_with(|| Mutex::new(None));
            let mut guard = slot.lock();
            let should_emit = match guard.as_ref() {
                None => true,
                Some(previous) => {
                    fraction >= 1.0
                        || now.duration_since(previous.at) >= Duration::from_millis(self.config.min_emit_interval_ms)
                        || (fraction - previous.fraction).abs() >= self.config.emit_delta_fraction
                }
            };
            if should_emit {
                *guard = Some(EmitState { fraction, at: now });
            }
            should_emit
        };
        if !should_emit {
            return Ok(());
        }

        self.event_bus
            .publish(envelope(CorrelationId::new(), docpipe_domain::events::catalogue::ProgressReported {
                entity,
                fraction,
                message,
            }))
            .await
    }

    async fn on_stage_event(&self, event: &BusEvent) -> Result<(), CoreError> {
        let envelope: DomainEvent<StageEventProbe> = serde_json::from_value(event.payload.clone())
            .map_err(|e| CoreError::SerializationError(e.to_string()))?;
        let run_id = envelope.payload.run_id;

        let mut completed = self.stage_completed.entry(run_id).or_insert(0);
        *completed += 1;
        let completed = *completed;
        let total = self.stage_totals.get(&run_id).map(|t| *t).unwrap_or(completed.max(1));

        let fraction = f64::from(completed) / f64::from(total);
        self.report(ProgressEntity::Run(run_id), fraction, None).await
    }
}

#[async_trait]
impl EventHandler for ProgressTracker {
    async fn handle(&self, event: &BusEvent) -> Result<(), CoreError> {
        match event.topic.as_str() {
            "stage.completed" | "stage.failed" | "stage.skipped" => self.on_stage_event(event).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_bus::InProcessEventBus;
    use docpipe_domain::events::catalogue::StageCompleted;
    use docpipe_domain::services::event_bus::DeliveryMode;
    use docpipe_domain::value_objects::StageId;

    #[tokio::test]
    async fn a_completion_crosses_the_delta_threshold_and_emits() {
        let bus = std::sync::Arc::new(InProcessEventBus::new(64));
        let tracker = ProgressTracker::new(
            bus.clone(),
            ProgressConfig {
                min_emit_interval_ms: 100_000,
                emit_delta_fraction: 0.5,
            },
        );
        let run_id = RunId::new();
        tracker.register_run(run_id, 2);

        tracker
            .report(ProgressEntity::Run(run_id), 0.0, None)
            .await
            .unwrap();
        let emitted = tracker
            .report(ProgressEntity::Run(run_id), 0.6, None)
            .await;
        assert!(emitted.is_ok());
    }

    #[tokio::test]
    async fn stage_completed_events_increment_the_run_s_fraction() {
        let bus = std::sync::Arc::new(InProcessEventBus::new(64));
        let tracker = ProgressTracker::new(bus.clone(), ProgressConfig::default());
        let run_id = RunId::new();
        tracker.register_run(run_id, 2);

        let event = docpipe_domain::services::event_bus::BusEvent::new(
            "stage.completed",
            serde_json::to_value(DomainEvent::new(StageCompleted {
                run_id,
                stage_id: StageId::new(),
                artifact_ref: "elements:1".into(),
            }))
            .unwrap(),
        );
        <ProgressTracker as EventHandler>::handle(&tracker, &event).await.unwrap();
        assert_eq!(*tracker.stage_completed.get(&run_id).unwrap(), 1);
    }

    #[tokio::test]
    async fn subscribing_routes_stage_events_through_the_bus() {
        let bus = std::sync::Arc::new(InProcessEventBus::new(64));
        let tracker = ProgressTracker::new(bus.clone(), ProgressConfig::default());
        bus.subscribe("stage.*", DeliveryMode::Parallel, tracker.clone())
            .await
            .unwrap();
        let run_id = RunId::new();
        tracker.register_run(run_id, 1);

        bus.publish(docpipe_domain::services::event_bus::BusEvent::new(
            "stage.completed",
            serde_json::to_value(DomainEvent::new(StageCompleted {
                run_id,
                stage_id: StageId::new(),
                artifact_ref: "elements:1".into(),
            }))
            .unwrap(),
        ))
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*tracker.stage_completed.get(&run_id).unwrap(), 1);
    }
}
