// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Commands
//!
//! The Command pattern as part of the CQRS split between this module
//! (state-changing operations) and the query-style reads each service
//! exposes directly. Commands are immutable, self-contained instructions
//! mapping 1:1 onto the CLI subcommands in §6: `ingest`, `run`, `cancel`,
//! `resume`, `export`. `status` is a pure query and has no corresponding
//! command.

use std::path::PathBuf;

use docpipe_domain::value_objects::{RunId, SessionId};

/// `ingest <path>...` -- accept one or more files into a (possibly new)
/// upload session.
#[derive(Debug, Clone)]
pub struct IngestCommand {
    pub paths: Vec<PathBuf>,
    pub session_id: Option<SessionId>,
    pub declared_mime: Option<String>,
}

impl IngestCommand {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            session_id: None,
            declared_mime: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// `run --spec <name> --document <id>` -- start a pipeline run for a
/// validated document against a named spec.
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub spec_name: String,
    pub document_id: docpipe_domain::value_objects::FileId,
}

/// `cancel <run>` -- request cancellation of an in-flight run. Cooperative
/// and thread tasks observe the cancellation handle at their next
/// safe-point; process tasks receive a signal.
#[derive(Debug, Clone)]
pub struct CancelCommand {
    pub run_id: RunId,
}

/// `resume <run>` -- restart a failed or cancelled run from its last
/// checkpoint.
#[derive(Debug, Clone)]
pub struct ResumeCommand {
    pub run_id: RunId,
}

/// Output format accepted by `export --format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jsonl,
    Markdown,
    ChatMl,
    Alpaca,
    ShareGpt,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jsonl" => Ok(Self::Jsonl),
            "markdown" => Ok(Self::Markdown),
            "chatml" => Ok(Self::ChatMl),
            "alpaca" => Ok(Self::Alpaca),
            "sharegpt" => Ok(Self::ShareGpt),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// `export --format {jsonl|markdown|chatml|alpaca|sharegpt} --documents <ids>`
/// -- emit a training-ready corpus for the given documents' elements and
/// relationships.
#[derive(Debug, Clone)]
pub struct ExportCommand {
    pub format: ExportFormat,
    pub document_ids: Vec<docpipe_domain::value_objects::FileId>,
    pub output_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_format_parses_the_five_supported_formats() {
        use std::str::FromStr;
        assert_eq!(ExportFormat::from_str("jsonl").unwrap(), ExportFormat::Jsonl);
        assert_eq!(ExportFormat::from_str("chatml").unwrap(), ExportFormat::ChatMl);
        assert!(ExportFormat::from_str("xml").is_err());
    }

    #[test]
    fn ingest_command_defaults_to_a_fresh_session() {
        let cmd = IngestCommand::new(vec![PathBuf::from("a.pdf")]);
        assert!(cmd.session_id.is_none());
    }
}
