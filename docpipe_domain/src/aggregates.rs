// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Aggregates guarding pipeline state transitions: [`PipelineSpec`] is the
//! static DAG definition, [`PipelineRun`] is one execution instance's state
//! machine over it.

pub mod pipeline_run;
pub mod pipeline_spec;

pub use pipeline_run::{PipelineRun, RunState, StageState};
pub use pipeline_spec::{BackoffCurve, OnFailure, PipelineSpec, RetryPolicy, StageSpec};
