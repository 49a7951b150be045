// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `PipelineRun`: one execution instance of a [`PipelineSpec`]
//!
//! Owns the run's state machine (`created -> running -> {completed | failed
//! | cancelled}`), per-stage state, and the checkpoint map
//! (`stage_id -> artifact_ref`) persisted on every stage success. `resume`
//! re-enters the state machine and only re-schedules stages not already
//! `completed` -- the map is what makes that possible without re-running
//! finished work.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::pipeline_spec::{OnFailure, PipelineSpec};
use crate::value_objects::{CorrelationId, FileId, RunId, StageId};
use crate::CoreError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RunState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum StageState {
    Pending,
    Running,
    Completed,
    /// Retains the attempt count reached when retries were exhausted, so the
    /// run can tell "failed on attempt 3 of 3" apart from "failed on attempt
    /// 1 of 3, about to retry".
    Failed { attempts: u32 },
    Skipped { reason: String },
}

/// `Serialize`/`Deserialize` let a repository adapter persist and rehydrate
/// a run's full state machine (stage states, checkpoints) as a single JSON
/// blob where a column-per-field mapping would be disproportionate; an
/// adapter that wants queryable columns (state, document_id) still reads
/// those through the public getters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineRun {
    id: RunId,
    spec_name: String,
    document_id: FileId,
    correlation_id: CorrelationId,
    state: RunState,
    stage_states: HashMap<StageId, StageState>,
    checkpoints: HashMap<StageId, String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn create(spec: &PipelineSpec, document_id: FileId, correlation_id: CorrelationId) -> Self {
        let stage_states = spec
            .stages()
            .iter()
            .map(|s| (s.id, StageState::Pending))
            .collect();
        Self {
            id: RunId::new(),
            spec_name: spec.name.clone(),
            document_id,
            correlation_id,
            state: RunState::Created,
            stage_states,
            checkpoints: HashMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    pub fn document_id(&self) -> FileId {
        self.document_id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stage_state(&self, stage_id: StageId) -> Option<&StageState> {
        self.stage_states.get(&stage_id)
    }

    pub fn checkpoint(&self, stage_id: StageId) -> Option<&str> {
        self.checkpoints.get(&stage_id).map(String::as_str)
    }

    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.state != RunState::Created {
            return Err(CoreError::ValidationFailed(format!(
                "run {} cannot start from state {:?}",
                self.id, self.state
            )));
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// A stage is ready when every dependency is `Completed`, or -- under
    /// `continue`/`skip-dependents` -- `Skipped`/`Failed`. §9's open
    /// question on `continue` semantics is resolved here: a `continue`
    /// dependency that failed still counts as satisfied, but the downstream
    /// stage receives an empty element-delta and a recorded warning rather
    /// than the failed stage's (nonexistent) output; that substitution
    /// happens in the pipeline manager, not here.
    /// Stages whose dependencies are all satisfied, ordered by descending
    /// critical path so that dispatch (bounded by pool capacity) starts the
    /// longest downstream chain first rather than in spec-declaration order.
    pub fn ready_stages(&self, spec: &PipelineSpec) -> Vec<StageId> {
        let mut ready: Vec<StageId> = spec
            .stages()
            .iter()
            .filter(|stage| matches!(self.stage_states.get(&stage.id), Some(StageState::Pending)))
            .filter(|stage| {
                stage.dependencies.iter().all(|dep| {
                    let Some(dep_spec) = spec.stage(*dep) else {
                        return false;
                    };
                    match self.stage_states.get(dep) {
                        Some(StageState::Completed) => true,
                        Some(StageState::Skipped { .. }) => true,
                        Some(StageState::Failed { .. }) => {
                            matches!(dep_spec.on_failure, OnFailure::Continue)
                        }
                        _ => false,
                    }
                })
            })
            .map(|stage| stage.id)
            .collect();
        ready.sort_by_key(|id| std::cmp::Reverse(spec.critical_path_from(*id)));
        ready
    }

    pub fn mark_stage_running(&mut self, stage_id: StageId) {
        self.stage_states.insert(stage_id, StageState::Running);
    }

    /// Persists `(run_id, stage_id) -> artifact_ref` atomically with the
    /// state transition -- both fields are updated in the same map mutation
    /// so a reader never observes `Completed` without the checkpoint.
    pub fn mark_stage_completed(&mut self, stage_id: StageId, artifact_ref: impl Into<String>) {
        self.checkpoints.insert(stage_id, artifact_ref.into());
        self.stage_states.insert(stage_id, StageState::Completed);
    }

    /// Applies `on_failure` once a stage's retry budget is exhausted.
    /// `skip-dependents` marks every transitively-dependent stage `Skipped`;
    /// `fail-pipeline` transitions the whole run to `Failed` immediately;
    /// `continue` leaves dependents to resolve readiness against this
    /// stage's `Failed` state themselves.
    pub fn mark_stage_failed(&mut self, stage_id: StageId, attempts: u32, spec: &PipelineSpec) {
        self.stage_states
            .insert(stage_id, StageState::Failed { attempts });

        let Some(stage_spec) = spec.stage(stage_id) else {
            return;
        };
        match stage_spec.on_failure {
            OnFailure::FailPipeline => {
                self.state = RunState::Failed;
                self.ended_at = Some(Utc::now());
            }
            OnFailure::SkipDependents => {
                self.skip_transitive_dependents(stage_id, spec);
            }
            OnFailure::Continue => {}
        }
    }

    fn skip_transitive_dependents(&mut self, failed: StageId, spec: &PipelineSpec) {
        let mut frontier = vec![failed];
        while let Some(current) = frontier.pop() {
            for stage in spec.stages() {
                if stage.dependencies.contains(&current)
                    && matches!(self.stage_states.get(&stage.id), Some(StageState::Pending))
                {
                    self.stage_states.insert(
                        stage.id,
                        StageState::Skipped {
                            reason: format!("dependency {current} failed"),
                        },
                    );
                    frontier.push(stage.id);
                }
            }
        }
    }

    /// A run completes once every stage is `Completed`, `Skipped`, or
    /// `Failed` under a policy other than `fail-pipeline` (a `fail-pipeline`
    /// failure already transitioned the run to `Failed` in
    /// [`Self::mark_stage_failed`], so by the time this is called any
    /// remaining `Failed` stage is one the run has chosen to tolerate).
    /// Resolves §8 invariant 1 / §9's `continue` open question: a run can
    /// reach `completed` carrying a tolerated `Failed` stage rather than
    /// requiring every stage be `completed`/`skipped`, matching the
    /// `skip-dependents` end-to-end scenario in §8.
    pub fn try_complete(&mut self, spec: &PipelineSpec) {
        if self.state != RunState::Running {
            return;
        }
        let all_resolved = spec.stages().iter().all(|stage| {
            matches!(
                self.stage_states.get(&stage.id),
                Some(StageState::Completed) | Some(StageState::Skipped { .. }) | Some(StageState::Failed { .. })
            )
        });
        if all_resolved {
            self.state = RunState::Completed;
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn cancel(&mut self) -> Result<(), CoreError> {
        if matches!(self.state, RunState::Completed | RunState::Failed | RunState::Cancelled) {
            return Err(CoreError::ValidationFailed(format!(
                "run {} is already terminal ({:?})",
                self.id, self.state
            )));
        }
        self.state = RunState::Cancelled;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Re-enters the state machine: only stages not already `Completed`,
    /// whose dependencies are satisfied, are eligible for re-scheduling.
    /// Previously-completed stages are never re-run from this call alone --
    /// the caller is responsible for invalidating a stage's checkpoint
    /// first if its processor version or options fingerprint changed.
    pub fn resume(&mut self) -> Result<Vec<StageId>, CoreError> {
        if !matches!(self.state, RunState::Failed | RunState::Cancelled) {
            return Err(CoreError::ValidationFailed(format!(
                "run {} cannot resume from state {:?}",
                self.id, self.state
            )));
        }
        self.state = RunState::Running;
        self.ended_at = None;
        // Stages left `Running` by a crash are reset to `Pending` so they
        // re-enter readiness evaluation.
        let stalled: Vec<StageId> = self
            .stage_states
            .iter()
            .filter(|(_, s)| matches!(s, StageState::Running))
            .map(|(id, _)| *id)
            .collect();
        for id in &stalled {
            self.stage_states.insert(*id, StageState::Pending);
        }
        Ok(stalled)
    }

    /// Invalidates a previously completed stage's checkpoint, forcing it
    /// (and transitively its dependents) to re-run on the next `resume` --
    /// used when the processor version or options fingerprint changed since
    /// the checkpoint was written.
    pub fn invalidate_stage(&mut self, stage_id: StageId, spec: &PipelineSpec) {
        self.checkpoints.remove(&stage_id);
        self.stage_states.insert(stage_id, StageState::Pending);
        let mut frontier = vec![stage_id];
        while let Some(current) = frontier.pop() {
            for stage in spec.stages() {
                if stage.dependencies.contains(&current) {
                    if matches!(self.stage_states.get(&stage.id), Some(StageState::Completed)) {
                        self.checkpoints.remove(&stage.id);
                        self.stage_states.insert(stage.id, StageState::Pending);
                        frontier.push(stage.id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::pipeline_spec::{RetryPolicy, StageSpec};

    fn sample_spec(a: StageId, b: StageId, on_b_failure: OnFailure) -> PipelineSpec {
        let stages = vec![
            StageSpec::new(a, "validate"),
            StageSpec::new(b, "extract")
                .depends_on(a)
                .with_on_failure(on_b_failure)
                .with_retry(RetryPolicy::none()),
        ];
        PipelineSpec::new("p", stages).unwrap()
    }

    #[test]
    fn run_completes_only_when_every_stage_is_completed_or_skipped() {
        let a = StageId::new();
        let b = StageId::new();
        let spec = sample_spec(a, b, OnFailure::FailPipeline);
        let mut run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        run.start().unwrap();
        assert_eq!(run.ready_stages(&spec), vec![a]);
        run.mark_stage_completed(a, "ckpt-a");
        assert_eq!(run.ready_stages(&spec), vec![b]);
        run.mark_stage_completed(b, "ckpt-b");
        run.try_complete(&spec);
        assert_eq!(run.state(), RunState::Completed);
    }

    #[test]
    fn skip_dependents_marks_downstream_stages_skipped_and_run_completes() {
        let a = StageId::new();
        let b = StageId::new();
        let c = StageId::new();
        let mut stages = vec![
            StageSpec::new(a, "validate"),
            StageSpec::new(b, "extract")
                .depends_on(a)
                .with_on_failure(OnFailure::SkipDependents),
        ];
        stages.push(StageSpec::new(c, "metadata").depends_on(b));
        let spec = PipelineSpec::new("p", stages).unwrap();

        let mut run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        run.start().unwrap();
        run.mark_stage_completed(a, "ckpt-a");
        run.mark_stage_failed(b, 1, &spec);
        run.try_complete(&spec);
        assert!(matches!(run.stage_state(c), Some(StageState::Skipped { .. })));
        assert_eq!(run.state(), RunState::Completed);
    }

    #[test]
    fn fail_pipeline_transitions_run_to_failed_immediately() {
        let a = StageId::new();
        let b = StageId::new();
        let spec = sample_spec(a, b, OnFailure::FailPipeline);
        let mut run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        run.start().unwrap();
        run.mark_stage_completed(a, "ckpt-a");
        run.mark_stage_failed(b, 3, &spec);
        assert_eq!(run.state(), RunState::Failed);
    }

    #[test]
    fn continue_leaves_the_failed_stage_satisfying_downstream_readiness() {
        let a = StageId::new();
        let b = StageId::new();
        let c = StageId::new();
        let mut stages = vec![
            StageSpec::new(a, "validate"),
            StageSpec::new(b, "extract")
                .depends_on(a)
                .with_on_failure(OnFailure::Continue),
        ];
        stages.push(StageSpec::new(c, "metadata").depends_on(b));
        let spec = PipelineSpec::new("p", stages).unwrap();

        let mut run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        run.start().unwrap();
        run.mark_stage_completed(a, "ckpt-a");
        run.mark_stage_failed(b, 3, &spec);
        assert_eq!(run.ready_stages(&spec), vec![c]);
    }

    #[test]
    fn resume_resets_stalled_running_stages_to_pending() {
        let a = StageId::new();
        let b = StageId::new();
        let spec = sample_spec(a, b, OnFailure::FailPipeline);
        let mut run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        run.start().unwrap();
        run.mark_stage_running(a);
        run.cancel().unwrap();
        let stalled = run.resume().unwrap();
        assert_eq!(stalled, vec![a]);
        assert_eq!(run.state(), RunState::Running);
    }

    #[test]
    fn resume_is_rejected_from_a_non_terminal_state() {
        let a = StageId::new();
        let b = StageId::new();
        let spec = sample_spec(a, b, OnFailure::FailPipeline);
        let mut run = PipelineRun::create(&spec, FileId::new(), CorrelationId::new());
        run.start().unwrap();
        assert!(run.resume().is_err());
    }
}
