// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete event payloads published onto the event bus: file lifecycle
//! (§4.3), stage/run state (§4.6), progress (§4.7). Each implements
//! [`EventPayload`] so the bus can categorize and log events uniformly.

use serde::{Deserialize, Serialize};

use super::domain_event::{EventCategory, EventPayload};
use crate::aggregates::RunState;
use crate::value_objects::{ContentHash, ElementId, FileId, RunId, SessionId, StageId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReceived {
    pub file_id: FileId,
    pub session_id: SessionId,
    pub size_bytes: u64,
}

impl EventPayload for FileReceived {
    fn event_name(&self) -> &'static str {
        "file.received"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::File
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileValidated {
    pub file_id: FileId,
    pub content_hash: ContentHash,
    pub detected_mime: String,
}

impl EventPayload for FileValidated {
    fn event_name(&self) -> &'static str {
        "file.validated"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::File
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRejected {
    pub file_id: FileId,
    pub reasons: Vec<String>,
}

impl EventPayload for FileRejected {
    fn event_name(&self) -> &'static str {
        "file.rejected"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::File
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStored {
    pub file_id: FileId,
    pub content_hash: ContentHash,
    pub storage_ref: String,
    pub deduplicated: bool,
}

impl EventPayload for FileStored {
    fn event_name(&self) -> &'static str {
        "file.stored"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::File
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCompleted {
    pub run_id: RunId,
    pub stage_id: StageId,
    pub artifact_ref: String,
}

impl EventPayload for StageCompleted {
    fn event_name(&self) -> &'static str {
        "stage.completed"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::Stage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageFailed {
    pub run_id: RunId,
    pub stage_id: StageId,
    pub attempts: u32,
    pub reason: String,
}

impl EventPayload for StageFailed {
    fn event_name(&self) -> &'static str {
        "stage.failed"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::Stage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSkipped {
    pub run_id: RunId,
    pub stage_id: StageId,
    pub reason: String,
}

impl EventPayload for StageSkipped {
    fn event_name(&self) -> &'static str {
        "stage.skipped"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::Stage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStateChanged {
    pub run_id: RunId,
    pub document_id: FileId,
    pub from: String,
    pub to: RunState,
}

impl EventPayload for RunStateChanged {
    fn event_name(&self) -> &'static str {
        "state-change"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::Run
    }
}

/// One progress report; emitted per §4.7 at most every `min_emit_interval`
/// per entity, plus on every crossing of the configured delta (default 5%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReported {
    pub entity: ProgressEntity,
    pub fraction: f64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ProgressEntity {
    Task(crate::value_objects::TaskId),
    Stage(StageId),
    Run(RunId),
    Session(SessionId),
}

impl EventPayload for ProgressReported {
    fn event_name(&self) -> &'static str {
        "progress"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::Progress
    }
}

/// Emitted once per `analyze_document` call (§4.8), after relationships
/// are coalesced and persisted and the reading order is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipsDetected {
    pub document_id: FileId,
    pub relationship_count: usize,
    pub reading_order: Vec<ElementId>,
}

impl EventPayload for RelationshipsDetected {
    fn event_name(&self) -> &'static str {
        "relationships.detected"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::Custom("relationship".into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorOccurred {
    pub correlation_id: Option<crate::value_objects::CorrelationId>,
    pub category: String,
    pub message: String,
}

impl EventPayload for ErrorOccurred {
    fn event_name(&self) -> &'static str {
        "error"
    }
    fn event_category(&self) -> EventCategory {
        EventCategory::System
    }
}
