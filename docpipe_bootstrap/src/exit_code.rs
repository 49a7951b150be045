// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! The CLI's process exit codes: 0 success, 2 usage, 3 validation failure,
//! 4 pipeline failure, 5 backend unavailable. `ExitCode::from_core_error`
//! dispatches on `CoreError::category()` so the mapping stays in one place
//! as new error variants are added.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docpipe_bootstrap::exit_code::{result_to_exit_code, ExitCode};
//!
//! fn run_application() -> Result<(), docpipe_domain::CoreError> {
//!     Ok(())
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     result_to_exit_code(run_application())
//! }
//! ```

use docpipe_domain::CoreError;
use std::fmt;

/// Exit codes for the `docpipe` CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error, not otherwise categorized (1)
    Error = 1,

    /// CLI usage error: bad flags, missing arguments (2)
    UsageError = 2,

    /// Input failed validation: bad mime, oversized, corrupt (3)
    ValidationFailure = 3,

    /// Pipeline run failed: logic, resource, timeout, or external error (4)
    PipelineFailure = 4,

    /// A required backend is unavailable: storage, cache tier, queue (5)
    BackendUnavailable = 5,

    /// Interrupted by SIGINT (130)
    Interrupted = 130,

    /// Terminated by SIGTERM (143)
    Terminated = 143,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a `CoreError` to its exit code via `category()`.
    pub fn from_core_error(error: &CoreError) -> Self {
        match error.category() {
            "validation" => ExitCode::ValidationFailure,
            "transient" if matches!(error, CoreError::BackendUnavailable(_)) => ExitCode::BackendUnavailable,
            _ => ExitCode::PipelineFailure,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::Error => "General error",
            ExitCode::UsageError => "Command line usage error",
            ExitCode::ValidationFailure => "Input validation failed",
            ExitCode::PipelineFailure => "Pipeline run failed",
            ExitCode::BackendUnavailable => "Required backend unavailable",
            ExitCode::Interrupted => "Interrupted by signal (SIGINT)",
            ExitCode::Terminated => "Terminated by signal (SIGTERM)",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn is_error(self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

/// Map any error through `CoreError` category if possible, `PipelineFailure`
/// otherwise.
pub fn map_error_to_exit_code(error: &(dyn std::error::Error + 'static)) -> ExitCode {
    if let Some(core_error) = error.downcast_ref::<CoreError>() {
        ExitCode::from_core_error(core_error)
    } else {
        ExitCode::PipelineFailure
    }
}

/// Convert a top-level application result into a process exit code,
/// printing the error to stderr on failure.
pub fn result_to_exit_code<E>(result: Result<(), E>) -> std::process::ExitCode
where
    E: std::error::Error + 'static,
{
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            map_error_to_exit_code(&e).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values_match_the_cli_contract() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::ValidationFailure.as_i32(), 3);
        assert_eq!(ExitCode::PipelineFailure.as_i32(), 4);
        assert_eq!(ExitCode::BackendUnavailable.as_i32(), 5);
    }

    #[test]
    fn core_error_category_drives_the_mapping() {
        let err = CoreError::ValidationFailed("bad mime".into());
        assert_eq!(ExitCode::from_core_error(&err), ExitCode::ValidationFailure);

        let err = CoreError::BackendUnavailable("sqlite pool exhausted".into());
        assert_eq!(ExitCode::from_core_error(&err), ExitCode::BackendUnavailable);

        let err = CoreError::CycleDetected("stage a -> a".into());
        assert_eq!(ExitCode::from_core_error(&err), ExitCode::PipelineFailure);
    }

    #[test]
    fn map_error_to_exit_code_falls_back_for_unknown_errors() {
        let err = std::fmt::Error;
        assert_eq!(map_error_to_exit_code(&err), ExitCode::PipelineFailure);
    }

    #[test]
    fn result_to_exit_code_maps_failure_through_the_category() {
        let err: Result<(), CoreError> = Err(CoreError::ValidationFailed("x".into()));
        let code: ExitCode = ExitCode::from_core_error(err.as_ref().unwrap_err());
        assert_eq!(code, ExitCode::ValidationFailure);

        // Exercises the std::process::ExitCode conversion path without
        // relying on ExitCode equality, which the standard type doesn't
        // implement.
        let _: std::process::ExitCode = result_to_exit_code(err);
    }
}
