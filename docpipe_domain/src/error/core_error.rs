// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A single, hierarchical error type for the document-processing backbone.
//! Errors are grouped into the seven kinds the system recognizes (validation,
//! transient, logic, resource, timeout, external, cache) rather than by which
//! component raised them, so recovery logic (retry policy, CLI exit code
//! mapping) can dispatch on `category()`/`is_recoverable()` without needing to
//! know the originating component.

use thiserror::Error;

/// Domain-specific errors for the document-processing backbone.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    // -- Validation: rejected input, never retried --
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    // -- Transient: retried per policy, surfaced after exhaustion --
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("queue full: {0}")]
    QueueFull(String),

    #[error("io error: {0}")]
    IoError(String),

    // -- Logic: fatal to the operation, surfaced immediately --
    #[error("unknown processor: {0}")]
    UnknownProcessor(String),

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("incompatible stage: {0}")]
    IncompatibleStage(String),

    // -- Resource: backpressure, not necessarily an error path --
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    // -- Timeout --
    #[error("operation timed out: {0}")]
    TimeoutError(String),

    // -- External: isolated to the failing collaborator --
    #[error("worker died: {0}")]
    WorkerDied(String),

    #[error("processor failed: {0}")]
    ProcessorFailed(String),

    // -- Cache --
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    // -- Cross-cutting --
    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("security violation: {0}")]
    SecurityViolation(String),

    #[error("integrity check failed: {0}")]
    IntegrityError(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether the operation that raised this error may succeed if retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::TimeoutError(_)
                | CoreError::ResourceExhausted(_)
                | CoreError::IoError(_)
                | CoreError::BackendUnavailable(_)
                | CoreError::QueueFull(_)
                | CoreError::WorkerDied(_)
        )
    }

    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            CoreError::SecurityViolation(_) | CoreError::IntegrityError(_)
        )
    }

    /// One of the seven error kinds the system recognizes (see the error
    /// handling design: validation/transient/logic/resource/timeout/
    /// external/cache).
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::ValidationFailed(_)
            | CoreError::InvalidConfiguration(_)
            | CoreError::MalformedInput(_) => "validation",
            CoreError::BackendUnavailable(_) | CoreError::QueueFull(_) | CoreError::IoError(_) => {
                "transient"
            }
            CoreError::UnknownProcessor(_)
            | CoreError::CycleDetected(_)
            | CoreError::NotFound(_)
            | CoreError::DuplicateKey(_)
            | CoreError::IncompatibleStage(_) => "logic",
            CoreError::ResourceExhausted(_) => "resource",
            CoreError::TimeoutError(_) => "timeout",
            CoreError::WorkerDied(_) | CoreError::ProcessorFailed(_) => "external",
            CoreError::CacheUnavailable(_) => "cache",
            CoreError::SerializationError(_)
            | CoreError::SecurityViolation(_)
            | CoreError::IntegrityError(_)
            | CoreError::Cancelled(_)
            | CoreError::TransactionAborted(_)
            | CoreError::InternalError(_) => "internal",
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

// NOTE: TOML/YAML error conversions deliberately not implemented here --
// serialization format choice is an infrastructure concern. The domain only
// needs canonical JSON for cache fingerprints and processor options.
