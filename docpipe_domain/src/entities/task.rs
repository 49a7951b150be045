// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `Task` entity: one execution attempt of one stage against one
//! document within a pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{CorrelationId, FileId, RunId, StageId, TaskId};
use crate::CoreError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Succeeded,
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    run_id: RunId,
    stage_id: StageId,
    document_id: FileId,
    correlation_id: CorrelationId,
    priority: TaskPriority,
    deadline: Option<DateTime<Utc>>,
    attempt: u32,
    status: TaskStatus,
    outcome: Option<TaskOutcome>,
    created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        run_id: RunId,
        stage_id: StageId,
        document_id: FileId,
        correlation_id: CorrelationId,
        priority: TaskPriority,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            run_id,
            stage_id,
            document_id,
            correlation_id,
            priority,
            deadline,
            attempt: 1,
            status: TaskStatus::Pending,
            outcome: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn stage_id(&self) -> StageId {
        self.stage_id
    }

    pub fn document_id(&self) -> FileId {
        self.document_id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.status != TaskStatus::Pending {
            return Err(CoreError::ValidationFailed(format!(
                "task {} cannot start from status {:?}",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Running;
        Ok(())
    }

    pub fn finish(&mut self, outcome: TaskOutcome) -> Result<(), CoreError> {
        if self.status != TaskStatus::Running {
            return Err(CoreError::ValidationFailed(format!(
                "task {} cannot finish from status {:?}",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Done;
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Produces a fresh retry attempt: a new pending `Task` sharing run,
    /// stage, document and correlation but with an incremented attempt
    /// counter and no recorded outcome.
    pub fn retry(&self) -> Result<Self, CoreError> {
        if self.status != TaskStatus::Done {
            return Err(CoreError::ValidationFailed(format!(
                "task {} can only be retried once its current attempt is done",
                self.id
            )));
        }
        Ok(Self {
            id: TaskId::new(),
            run_id: self.run_id,
            stage_id: self.stage_id,
            document_id: self.document_id,
            correlation_id: self.correlation_id,
            priority: self.priority,
            deadline: self.deadline,
            attempt: self.attempt + 1,
            status: TaskStatus::Pending,
            outcome: None,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task::new(
            RunId::new(),
            StageId::new(),
            FileId::new(),
            CorrelationId::new(),
            TaskPriority::Normal,
            None,
        )
    }

    #[test]
    fn retry_increments_attempt_and_resets_outcome() {
        let mut t = sample();
        t.start().unwrap();
        t.finish(TaskOutcome::Failed { reason: "boom".into() }).unwrap();
        let retried = t.retry().unwrap();
        assert_eq!(retried.attempt(), t.attempt() + 1);
        assert_eq!(retried.status(), TaskStatus::Pending);
        assert!(retried.outcome().is_none());
    }

    #[test]
    fn cannot_finish_a_task_that_never_started() {
        let mut t = sample();
        assert!(t.finish(TaskOutcome::Succeeded).is_err());
    }

    #[test]
    fn past_deadline_detection() {
        let mut t = sample();
        t.deadline = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(t.is_past_deadline(Utc::now()));
    }
}
