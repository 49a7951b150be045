// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `UploadSession` entity: a session-scoped grouping of uploaded files.
//! Sessions auto-close on expiry or explicit finalize and cannot be reopened.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::value_objects::{FileId, SessionId};
use crate::CoreError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum SessionStatus {
    Open,
    Finalized,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    id: SessionId,
    owner: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    files: HashSet<FileId>,
    status: SessionStatus,
}

impl UploadSession {
    pub fn open(owner: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            owner: owner.into(),
            created_at: now,
            expires_at: now + ttl,
            files: HashSet::new(),
            status: SessionStatus::Open,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn files(&self) -> impl Iterator<Item = &FileId> {
        self.files.iter()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn add_file(&mut self, file_id: FileId, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.refresh_expiry(now);
        if self.status != SessionStatus::Open {
            return Err(CoreError::ValidationFailed(format!(
                "session {} is not open (status {:?})",
                self.id, self.status
            )));
        }
        self.files.insert(file_id);
        Ok(())
    }

    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.refresh_expiry(now);
        if self.status != SessionStatus::Open {
            return Err(CoreError::ValidationFailed(format!(
                "session {} already closed",
                self.id
            )));
        }
        self.status = SessionStatus::Finalized;
        Ok(())
    }

    fn refresh_expiry(&mut self, now: DateTime<Utc>) {
        if self.status == SessionStatus::Open && self.is_expired_at(now) {
            self.status = SessionStatus::Expired;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_session_refuses_new_files() {
        let mut session = UploadSession::open("alice", Duration::seconds(-1));
        let result = session.add_file(FileId::new(), Utc::now());
        assert!(result.is_err());
        assert_eq!(session.status(), SessionStatus::Expired);
    }

    #[test]
    fn finalized_session_cannot_be_reopened() {
        let mut session = UploadSession::open("alice", Duration::hours(1));
        session.finalize(Utc::now()).unwrap();
        assert!(session.finalize(Utc::now()).is_err());
    }
}
