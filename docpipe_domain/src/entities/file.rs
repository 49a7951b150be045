// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `File` entity: one uploaded document tracked through validation and
//! processing. Status is monotonic; `rejected` is reachable only from
//! `received`, and terminal states (`completed`, `failed`, `rejected`) are
//! immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ContentHash, FileId, SessionId};
use crate::CoreError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum FileStatus {
    Received,
    Validated,
    Rejected,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed | FileStatus::Rejected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub declared_mime: String,
    pub detected_mime: String,
    pub passed: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    id: FileId,
    content_hash: ContentHash,
    declared_mime: String,
    detected_mime: Option<String>,
    size_bytes: u64,
    source_path: String,
    session_id: SessionId,
    status: FileStatus,
    validation_report: Option<ValidationReport>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl File {
    pub fn receive(
        content_hash: ContentHash,
        declared_mime: impl Into<String>,
        size_bytes: u64,
        source_path: impl Into<String>,
        session_id: SessionId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FileId::new(),
            content_hash,
            declared_mime: declared_mime.into(),
            detected_mime: None,
            size_bytes,
            source_path: source_path.into(),
            session_id,
            status: FileStatus::Received,
            validation_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn content_hash(&self) -> ContentHash {
        self.content_hash
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn validation_report(&self) -> Option<&ValidationReport> {
        self.validation_report.as_ref()
    }

    fn transition(&mut self, to: FileStatus) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::ValidationFailed(format!(
                "file {} is in terminal state {:?}, cannot transition to {:?}",
                self.id, self.status, to
            )));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a passing validation report and advances to `validated`.
    pub fn validate(&mut self, report: ValidationReport, detected_mime: impl Into<String>) -> Result<(), CoreError> {
        if !report.passed {
            return Err(CoreError::ValidationFailed(
                "validate() called with a failing report; use reject() instead".into(),
            ));
        }
        self.detected_mime = Some(detected_mime.into());
        self.validation_report = Some(report);
        self.transition(FileStatus::Validated)
    }

    /// `rejected` is reachable only from `received` -- a file already
    /// validated cannot later be rejected; a new upload is required.
    pub fn reject(&mut self, report: ValidationReport) -> Result<(), CoreError> {
        if self.status != FileStatus::Received {
            return Err(CoreError::ValidationFailed(format!(
                "file {} cannot be rejected from state {:?}",
                self.id, self.status
            )));
        }
        self.validation_report = Some(report);
        self.transition(FileStatus::Rejected)
    }

    pub fn enqueue(&mut self) -> Result<(), CoreError> {
        self.transition(FileStatus::Queued)
    }

    pub fn start_processing(&mut self) -> Result<(), CoreError> {
        self.transition(FileStatus::Processing)
    }

    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.transition(FileStatus::Completed)
    }

    pub fn fail(&mut self) -> Result<(), CoreError> {
        self.transition(FileStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> File {
        File::receive(
            ContentHash::of_bytes(b"hello"),
            "application/pdf",
            1024,
            "/tmp/in.pdf",
            SessionId::new(),
        )
    }

    #[test]
    fn status_is_monotonic_from_received_to_completed() {
        let mut f = sample_file();
        assert_eq!(f.status(), FileStatus::Received);
        f.validate(
            ValidationReport {
                declared_mime: "application/pdf".into(),
                detected_mime: "application/pdf".into(),
                passed: true,
                reasons: vec![],
            },
            "application/pdf",
        )
        .unwrap();
        f.enqueue().unwrap();
        f.start_processing().unwrap();
        f.complete().unwrap();
        assert_eq!(f.status(), FileStatus::Completed);
    }

    #[test]
    fn rejection_is_only_reachable_from_received() {
        let mut f = sample_file();
        f.validate(
            ValidationReport {
                declared_mime: "application/pdf".into(),
                detected_mime: "application/pdf".into(),
                passed: true,
                reasons: vec![],
            },
            "application/pdf",
        )
        .unwrap();
        let rejected = f.reject(ValidationReport {
            declared_mime: "application/pdf".into(),
            detected_mime: "application/pdf".into(),
            passed: false,
            reasons: vec!["too late".into()],
        });
        assert!(rejected.is_err());
    }

    #[test]
    fn terminal_states_refuse_further_transitions() {
        let mut f = sample_file();
        f.fail().unwrap();
        assert!(f.enqueue().is_err());
    }
}
