// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # docpipe
//!
//! A document-processing orchestration backbone: ingest arbitrary files,
//! run them through a pipeline of pluggable processors, track extracted
//! elements and the relationships between them, and export the result as
//! training-corpus data.
//!
//! ## Architecture
//!
//! The crate follows the same Clean Architecture split as its sibling
//! crates:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Commands, Application Services: upload/pipeline/export)   │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer (docpipe-domain)             │
//! │  (Entities, Value Objects, Domain Services, Events)          │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Repositories, Event Bus, Cache, Worker Pool, Config)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `docpipe_bootstrap` owns CLI parsing and process-level concerns
//! (signals, exit codes); `src/main.rs` in this crate is the composition
//! root that wires the two together.

pub mod application;
pub mod infrastructure;

// The CLI surface (argument parsing, validated commands, exit codes) lives
// in the `docpipe_bootstrap` crate; `src/main.rs` here is the composition
// root that wires it to this crate's application services. There is no
// REST API in this crate's scope, so there is no separate presentation
// module to house interface adapters.

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory
