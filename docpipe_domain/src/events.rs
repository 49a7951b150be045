// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain events: the generic [`DomainEvent<T>`] envelope plus the concrete
//! payload catalogue published across file lifecycle, stage execution, run
//! state, and progress.

pub mod catalogue;
pub mod domain_event;

pub use catalogue::{
    ErrorOccurred, FileReceived, FileRejected, FileStored, FileValidated, ProgressEntity,
    ProgressReported, RunStateChanged, StageCompleted, StageFailed, StageSkipped,
};
pub use domain_event::{DomainEvent, EventCategory, EventPayload};
