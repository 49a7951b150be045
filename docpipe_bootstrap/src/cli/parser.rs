// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Parser
//!
//! Command-line interface parsing using clap.
//!
//! This module defines the CLI structure and handles argument parsing.
//! Security validation happens in the validator module after parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser, Debug, Clone)]
#[command(name = "docpipe")]
#[command(about = concat!("docpipe v", env!("CARGO_PKG_VERSION")))]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override worker pool CPU-bound thread count
    ///
    /// Controls the number of concurrent cooperative/thread-class tasks the
    /// resource governor admits. Default: num_cpus - 1.
    #[arg(long)]
    pub cpu_threads: Option<usize>,

    /// Override worker pool I/O-bound thread count
    #[arg(long)]
    pub io_threads: Option<usize>,

    /// Specify storage device type for I/O token defaults
    ///
    /// Values: nvme (queue depth 24), ssd (12), hdd (4).
    #[arg(long, value_parser = parse_storage_type)]
    pub storage_type: Option<String>,

    /// Event bus queue depth (backpressure threshold)
    #[arg(long, default_value = "256")]
    pub channel_depth: usize,
}

/// CLI subcommands, mapping 1:1 onto the external command surface:
/// `ingest`, `run`, `status`, `cancel`, `resume`, `export`.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Accept one or more files into a (possibly new) upload session
    Ingest {
        /// File paths to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Attach to an existing upload session instead of starting a new one
        #[arg(long)]
        session: Option<String>,
    },

    /// Start a pipeline run for a validated document against a named spec
    Run {
        /// Name of the registered pipeline spec to run
        #[arg(long)]
        spec: String,

        /// Document (file) id to run the spec against
        #[arg(long)]
        document: String,
    },

    /// Report the current state and progress of a run
    Status {
        /// Run id to inspect
        run: String,
    },

    /// Request cancellation of an in-flight run
    Cancel {
        /// Run id to cancel
        run: String,
    },

    /// Restart a failed or cancelled run from its last checkpoint
    Resume {
        /// Run id to resume
        run: String,
    },

    /// Emit a training-ready corpus for the given documents
    Export {
        /// Output format
        #[arg(long, value_parser = parse_export_format)]
        format: String,

        /// Document ids to export
        #[arg(long = "documents", required = true, value_delimiter = ',')]
        documents: Vec<String>,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Validate storage type from CLI argument
fn parse_storage_type(s: &str) -> Result<String, String> {
    match s.to_lowercase().as_str() {
        "nvme" | "ssd" | "hdd" => Ok(s.to_lowercase()),
        _ => Err(format!("Invalid storage type '{}'. Valid options: nvme, ssd, hdd", s)),
    }
}

/// Validate export format from CLI argument
fn parse_export_format(s: &str) -> Result<String, String> {
    match s.to_lowercase().as_str() {
        "jsonl" | "markdown" | "chatml" | "alpaca" | "sharegpt" => Ok(s.to_lowercase()),
        _ => Err(format!(
            "Invalid export format '{}'. Valid options: jsonl, markdown, chatml, alpaca, sharegpt",
            s
        )),
    }
}

/// Parse CLI arguments
///
/// # Panics
///
/// Clap will exit the process with an appropriate error message if parsing
/// fails.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_type_valid() {
        assert_eq!(parse_storage_type("nvme").unwrap(), "nvme");
        assert_eq!(parse_storage_type("SSD").unwrap(), "ssd");
    }

    #[test]
    fn test_parse_storage_type_invalid() {
        assert!(parse_storage_type("invalid").is_err());
    }

    #[test]
    fn test_parse_export_format_valid() {
        assert_eq!(parse_export_format("ChatML").unwrap(), "chatml");
    }

    #[test]
    fn test_parse_export_format_invalid() {
        assert!(parse_export_format("xml").is_err());
    }

    #[test]
    fn test_cli_parses_ingest_command() {
        let cli = Cli::parse_from(["docpipe", "ingest", "a.pdf", "b.pdf"]);
        match cli.command {
            Commands::Ingest { paths, session } => {
                assert_eq!(paths.len(), 2);
                assert!(session.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::parse_from(["docpipe", "run", "--spec", "default", "--document", "01ABC"]);
        match cli.command {
            Commands::Run { spec, document } => {
                assert_eq!(spec, "default");
                assert_eq!(document, "01ABC");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
