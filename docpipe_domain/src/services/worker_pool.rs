// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool port
//!
//! Contract for submitting, awaiting, and cancelling [`crate::entities::Task`]
//! executions across the three worker classes (cooperative, thread, process).
//! Dispatch ordering (priority, deadline, submit order, fair-share by
//! document) and the resource governor's hysteresis are infrastructure
//! concerns; the domain only fixes the submit/await/cancel shape and the
//! class enum processors declare against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::entities::{Task, TaskOutcome};
use crate::value_objects::FileId;
use crate::CoreError;

/// Which of the three worker classes executes a task. Chosen from the
/// processor's declared [`crate::services::processor::ConcurrencyClass`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum WorkerClass {
    /// IO-bound tasks multiplexed on a single thread per shard.
    Cooperative,
    /// CPU-light-but-blocking tasks run on OS threads.
    Thread,
    /// CPU-heavy or untrusted-plugin tasks, isolated in an OS process.
    Process,
}

/// `(explicit_priority, deadline, submit_order)` as described by the
/// scheduling model: higher priority wins dequeue ties; deadline breaks
/// ties within a priority; submit order is the final tiebreaker.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DispatchPriority {
    pub explicit_priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub submit_order: u64,
}

impl Ord for DispatchPriority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .explicit_priority
            .cmp(&self.explicit_priority)
            .then_with(|| match (self.deadline, other.deadline) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| self.submit_order.cmp(&other.submit_order))
    }
}

impl PartialOrd for DispatchPriority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A unit of work submitted to the pool: the task identity, the document it
/// belongs to (for fair-share round-robin), its worker class, and the
/// closure the pool invokes to run it.
pub struct WorkItem {
    pub task: Task,
    pub document_id: FileId,
    pub class: WorkerClass,
    pub priority: DispatchPriority,
}

/// Opaque handle to a submitted task; `await_result` resolves it, `cancel`
/// requests cooperative/signal/kill cancellation depending on the class.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TaskHandle(pub uuid::Uuid);

impl TaskHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub outcome: TaskOutcome,
}

#[async_trait]
pub trait WorkerPool: Send + Sync {
    async fn submit(&self, item: WorkItem) -> Result<TaskHandle, CoreError>;

    async fn await_result(
        &self,
        handle: TaskHandle,
        timeout: Option<Duration>,
    ) -> Result<TaskResult, CoreError>;

    async fn cancel(&self, handle: TaskHandle) -> Result<(), CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priority(p: i32, order: u64) -> DispatchPriority {
        DispatchPriority {
            explicit_priority: p,
            deadline: None,
            submit_order: order,
        }
    }

    #[test]
    fn higher_explicit_priority_sorts_first() {
        let high = priority(10, 5);
        let low = priority(1, 0);
        assert!(high < low);
    }

    #[test]
    fn equal_priority_breaks_tie_on_submit_order() {
        let first = priority(5, 1);
        let second = priority(5, 2);
        assert!(first < second);
    }

    #[test]
    fn earlier_deadline_wins_among_equal_priority() {
        let now = Utc::now();
        let soon = DispatchPriority {
            explicit_priority: 5,
            deadline: Some(now),
            submit_order: 0,
        };
        let later = DispatchPriority {
            explicit_priority: 5,
            deadline: Some(now + chrono::Duration::seconds(10)),
            submit_order: 1,
        };
        assert!(soon < later);
    }
}
