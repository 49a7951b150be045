// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `PipelineSpec`: the static DAG definition
//!
//! A named, ordered set of [`StageSpec`]s whose `dependencies` edges form a
//! DAG. `PipelineSpec` only describes the shape of a run -- it owns no
//! mutable state. Acyclicity is checked once, at construction, with a
//! topological sort; a cycle produces `CoreError::CycleDetected` rather than
//! deferring the check to `execute()`-time so a malformed spec can never be
//! registered in the first place.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::value_objects::{ResourceRequirements, StageId};
use crate::CoreError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BackoffCurve {
    Fixed,
    Exponential,
}

/// `max_attempts`, backoff shape, and the base/jitter parameters used to
/// compute `delay = base * 2^(attempt-1) * U(0.5, 1.5)` for exponential
/// backoff (fixed backoff ignores the exponent and always waits `base`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub curve: BackoffCurve,
    pub base: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            curve: BackoffCurve::Fixed,
            base: Duration::ZERO,
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            curve: BackoffCurve::Exponential,
            base,
        }
    }

    pub fn fixed(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            curve: BackoffCurve::Fixed,
            base,
        }
    }

    /// `delay = base * 2^(attempt-1) * jitter`, `jitter` sampled uniformly in
    /// `[0.5, 1.5)` by the caller (kept out of this pure function so tests
    /// can supply a fixed jitter and assert exact offsets).
    pub fn delay_for_attempt(&self, attempt: u32, jitter: f64) -> Duration {
        match self.curve {
            BackoffCurve::Fixed => self.base,
            BackoffCurve::Exponential => {
                let exponent = attempt.saturating_sub(1);
                let multiplier = 2f64.powi(exponent as i32) * jitter;
                Duration::from_secs_f64(self.base.as_secs_f64() * multiplier)
            }
        }
    }
}

/// What happens to dependents when a stage exhausts its retry budget.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OnFailure {
    FailPipeline,
    SkipDependents,
    Continue,
}

#[derive(Debug, Clone)]
pub struct StageSpec {
    pub id: StageId,
    pub processor_name: String,
    pub dependencies: Vec<StageId>,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub resource_hints: ResourceRequirements,
    pub on_failure: OnFailure,
}

impl StageSpec {
    pub fn new(id: StageId, processor_name: impl Into<String>) -> Self {
        Self {
            id,
            processor_name: processor_name.into(),
            dependencies: Vec::new(),
            timeout: Duration::from_secs(60),
            retry_policy: RetryPolicy::none(),
            resource_hints: ResourceRequirements::default(),
            on_failure: OnFailure::FailPipeline,
        }
    }

    pub fn depends_on(mut self, dep: StageId) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn with_retry(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub name: String,
    stages: Vec<StageSpec>,
}

impl PipelineSpec {
    /// Validates acyclicity via Kahn's algorithm before accepting the spec:
    /// a spec that cannot be registered can never produce a `CycleDetected`
    /// failure mid-run.
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec>) -> Result<Self, CoreError> {
        let spec = Self {
            name: name.into(),
            stages,
        };
        spec.topological_order()?;
        Ok(spec)
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Stages with no incoming edge from the given `completed`/`skipped` set
    /// among the remaining stage ids -- i.e. the Kahn's-algorithm frontier.
    pub fn topological_order(&self) -> Result<Vec<StageId>, CoreError> {
        let ids: HashSet<StageId> = self.stages.iter().map(|s| s.id).collect();
        let mut in_degree: HashMap<StageId, usize> = HashMap::new();
        let mut dependents: HashMap<StageId, Vec<StageId>> = HashMap::new();

        for stage in &self.stages {
            in_degree.entry(stage.id).or_insert(0);
            for dep in &stage.dependencies {
                if !ids.contains(dep) {
                    return Err(CoreError::ValidationFailed(format!(
                        "stage {} depends on unknown stage {dep}",
                        stage.id
                    )));
                }
                *in_degree.entry(stage.id).or_insert(0) += 1;
                dependents.entry(*dep).or_default().push(stage.id);
            }
        }

        let mut frontier: Vec<StageId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        frontier.sort_by_key(|id| id.to_string());

        let mut order = Vec::with_capacity(self.stages.len());
        while let Some(id) = frontier.pop() {
            order.push(id);
            if let Some(children) = dependents.get(&id) {
                for child in children {
                    let degree = in_degree.get_mut(child).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        frontier.push(*child);
                        frontier.sort_by_key(|id| id.to_string());
                    }
                }
            }
        }

        if order.len() != self.stages.len() {
            return Err(CoreError::CycleDetected(format!(
                "pipeline spec '{}' contains a cycle",
                self.name
            )));
        }
        Ok(order)
    }

    /// The critical path length (sum of declared timeouts on the longest
    /// downstream chain) rooted at `stage_id`; used for tie-breaking among
    /// equally-ready, equally-prioritized stages.
    pub fn critical_path_from(&self, stage_id: StageId) -> Duration {
        let dependents: Vec<&StageSpec> = self
            .stages
            .iter()
            .filter(|s| s.dependencies.contains(&stage_id))
            .collect();
        let own = self.stage(stage_id).map(|s| s.timeout).unwrap_or_default();
        let longest_child = dependents
            .iter()
            .map(|s| self.critical_path_from(s.id))
            .max()
            .unwrap_or_default();
        own + longest_child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: StageId) -> StageSpec {
        StageSpec::new(id, "noop")
    }

    #[test]
    fn self_loop_is_detected_as_a_cycle() {
        let a = StageId::new();
        let stages = vec![stage(a).depends_on(a)];
        let result = PipelineSpec::new("self-loop", stages);
        assert!(matches!(result, Err(CoreError::CycleDetected(_))));
    }

    #[test]
    fn two_stage_mutual_dependency_is_a_cycle() {
        let a = StageId::new();
        let b = StageId::new();
        let stages = vec![stage(a).depends_on(b), stage(b).depends_on(a)];
        let result = PipelineSpec::new("mutual", stages);
        assert!(result.is_err());
    }

    #[test]
    fn linear_chain_topologically_orders_dependencies_first() {
        let a = StageId::new();
        let b = StageId::new();
        let c = StageId::new();
        let stages = vec![stage(c).depends_on(b), stage(b).depends_on(a), stage(a)];
        let spec = PipelineSpec::new("chain", stages).unwrap();
        let order = spec.topological_order().unwrap();
        let pos = |id: StageId| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt_before_jitter() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1, 1.0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2, 1.0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3, 1.0), Duration::from_secs(4));
    }
}
