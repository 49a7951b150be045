// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parser::parse()                 │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validator::validate()           │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `parser` - CLI structure and clap parsing
//! - `validator` - Security validation layer

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

/// Validated CLI configuration
///
/// Holds all CLI arguments after security validation. Paths that must
/// already exist are canonicalized; numeric values are range-checked.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub cpu_threads: Option<usize>,
    pub io_threads: Option<usize>,
    pub storage_type: Option<String>,
    pub channel_depth: usize,
}

/// Validated command variants, one per external CLI subcommand.
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Ingest {
        paths: Vec<PathBuf>,
        session: Option<String>,
    },
    Run {
        spec: String,
        document: String,
    },
    Status {
        run: String,
    },
    Cancel {
        run: String,
    },
    Resume {
        run: String,
    },
    Export {
        format: String,
        documents: Vec<String>,
        output: Option<PathBuf>,
    },
}

/// Parse and validate CLI arguments.
///
/// # Errors
///
/// Returns `ParseError` if CLI parsing or security validation fails.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

/// Validate parsed CLI arguments: path canonicalization, dangerous-pattern
/// detection, numeric range checks.
fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = if let Some(ref path) = cli.config {
        SecureArgParser::validate_argument(&path.to_string_lossy())?;
        Some(path.clone())
    } else {
        None
    };

    if cli.channel_depth == 0 {
        return Err(ParseError::InvalidValue {
            arg: "channel-depth".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    if let Some(threads) = cli.cpu_threads {
        if threads == 0 || threads > 128 {
            return Err(ParseError::InvalidValue {
                arg: "cpu-threads".to_string(),
                reason: "must be between 1 and 128".to_string(),
            });
        }
    }

    if let Some(threads) = cli.io_threads {
        if threads == 0 || threads > 256 {
            return Err(ParseError::InvalidValue {
                arg: "io-threads".to_string(),
                reason: "must be between 1 and 256".to_string(),
            });
        }
    }

    let command = match cli.command {
        Commands::Ingest { paths, session } => {
            if paths.is_empty() {
                return Err(ParseError::MissingArgument("paths".to_string()));
            }

            let mut validated_paths = Vec::with_capacity(paths.len());
            for path in &paths {
                validated_paths.push(SecureArgParser::validate_path(&path.to_string_lossy())?);
            }

            if let Some(ref s) = session {
                SecureArgParser::validate_argument(s)?;
            }

            ValidatedCommand::Ingest {
                paths: validated_paths,
                session,
            }
        }
        Commands::Run { spec, document } => {
            SecureArgParser::validate_argument(&spec)?;
            SecureArgParser::validate_argument(&document)?;
            ValidatedCommand::Run { spec, document }
        }
        Commands::Status { run } => {
            SecureArgParser::validate_argument(&run)?;
            ValidatedCommand::Status { run }
        }
        Commands::Cancel { run } => {
            SecureArgParser::validate_argument(&run)?;
            ValidatedCommand::Cancel { run }
        }
        Commands::Resume { run } => {
            SecureArgParser::validate_argument(&run)?;
            ValidatedCommand::Resume { run }
        }
        Commands::Export {
            format,
            documents,
            output,
        } => {
            SecureArgParser::validate_argument(&format)?;

            if documents.is_empty() {
                return Err(ParseError::MissingArgument("documents".to_string()));
            }
            for doc in &documents {
                SecureArgParser::validate_argument(doc)?;
            }

            if let Some(ref path) = output {
                // Output file need not exist yet - validate the string only.
                SecureArgParser::validate_argument(&path.to_string_lossy())?;
            }

            ValidatedCommand::Export {
                format,
                documents,
                output,
            }
        }
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config,
        cpu_threads: cli.cpu_threads,
        io_threads: cli.io_threads,
        storage_type: cli.storage_type,
        channel_depth: cli.channel_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_an_ingest_command_with_existing_paths() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let cli = Cli {
            command: Commands::Ingest {
                paths: vec![tmp.path().to_path_buf()],
                session: None,
            },
            verbose: false,
            config: None,
            cpu_threads: None,
            io_threads: None,
            storage_type: None,
            channel_depth: 4,
        };

        let validated = validate_cli(cli).unwrap();
        match validated.command {
            ValidatedCommand::Ingest { paths, .. } => assert_eq!(paths.len(), 1),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_channel_depth() {
        let cli = Cli {
            command: Commands::Status { run: "01ABC".to_string() },
            verbose: false,
            config: None,
            cpu_threads: None,
            io_threads: None,
            storage_type: None,
            channel_depth: 0,
        };

        assert!(matches!(validate_cli(cli), Err(ParseError::InvalidValue { .. })));
    }

    #[test]
    fn rejects_ingest_with_no_paths() {
        let cli = Cli {
            command: Commands::Ingest {
                paths: vec![],
                session: None,
            },
            verbose: false,
            config: None,
            cpu_threads: None,
            io_threads: None,
            storage_type: None,
            channel_depth: 4,
        };

        assert!(matches!(validate_cli(cli), Err(ParseError::MissingArgument(_))));
    }
}
