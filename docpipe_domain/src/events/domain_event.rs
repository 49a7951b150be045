// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic domain event envelope
//!
//! Generalizes the pipeline domain's event-sourcing wrapper into a single
//! `DomainEvent<T>` used across every event category in the system (file
//! lifecycle, stage execution, run state, progress). `T` carries the
//! event-specific data; the envelope carries identity, timestamp, schema
//! version, and the correlation/causation pair used for per-document tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::CorrelationId;

/// Wraps an event payload `T` with sourcing metadata: a unique event id,
/// occurrence timestamp, schema version, and correlation/causation ids for
/// distributed tracing across the worker pool and event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub event_id: Uuid,
    pub payload: T,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub version: u64,
    pub correlation_id: Option<CorrelationId>,
    pub causation_id: Option<Uuid>,
    pub metadata: std::collections::HashMap<String, String>,
}

impl<T> DomainEvent<T> {
    pub fn new(payload: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            payload,
            occurred_at: chrono::Utc::now(),
            version: 1,
            correlation_id: None,
            causation_id: None,
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn new_with_correlation(payload: T, correlation_id: CorrelationId, causation_id: Option<Uuid>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            payload,
            occurred_at: chrono::Utc::now(),
            version: 1,
            correlation_id: Some(correlation_id),
            causation_id,
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_causation_id(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn event_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    pub fn is_correlated_with(&self, other: CorrelationId) -> bool {
        self.correlation_id == Some(other)
    }

    pub fn was_caused_by(&self, other_event_id: Uuid) -> bool {
        self.causation_id == Some(other_event_id)
    }
}

/// Implemented by every concrete event payload so the event bus can route
/// and log events without a match over every payload type.
pub trait EventPayload: Send + Sync + Clone {
    fn event_name(&self) -> &'static str;
    fn event_category(&self) -> EventCategory;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCategory {
    File,
    Stage,
    Run,
    Progress,
    System,
    Custom(String),
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::File => write!(f, "File"),
            EventCategory::Stage => write!(f, "Stage"),
            EventCategory::Run => write!(f, "Run"),
            EventCategory::Progress => write!(f, "Progress"),
            EventCategory::System => write!(f, "System"),
            EventCategory::Custom(name) => write!(f, "Custom({name})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Probe {
        value: i32,
    }

    impl EventPayload for Probe {
        fn event_name(&self) -> &'static str {
            "Probe"
        }
        fn event_category(&self) -> EventCategory {
            EventCategory::Custom("test".into())
        }
    }

    #[test]
    fn correlation_and_causation_round_trip() {
        let correlation = CorrelationId::new();
        let causation = Uuid::new_v4();
        let event = DomainEvent::new_with_correlation(Probe { value: 1 }, correlation, Some(causation));
        assert!(event.is_correlated_with(correlation));
        assert!(event.was_caused_by(causation));
    }

    #[test]
    fn serializes_and_deserializes_through_json() {
        let event = DomainEvent::new(Probe { value: 7 }).with_metadata("source", "test");
        let json = serde_json::to_string(&event).unwrap();
        let back: DomainEvent<Probe> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, event.event_id);
        assert_eq!(back.payload.value, 7);
    }

    #[test]
    fn category_display_matches_variant() {
        assert_eq!(EventCategory::File.to_string(), "File");
        assert_eq!(EventCategory::Custom("x".into()).to_string(), "Custom(x)");
    }
}
