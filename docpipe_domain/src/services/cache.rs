// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cache Layer port
//!
//! `get_or_build` is the entire contract: single-flight semantics (one
//! builder invocation per fingerprint, regardless of how many concurrent
//! callers ask for it) and tiered L1/L2/L3 lookup are infrastructure
//! details. Invalidation is implicit -- a changed input or processor
//! version produces a different [`crate::value_objects::Fingerprint`], never
//! an explicit delete.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::value_objects::Fingerprint;
use crate::CoreError;

/// An artifact the cache stores: opaque bytes plus the fingerprint that
/// produced them, so a cache hit can be told apart from a cold build by
/// callers that care (e.g. metrics).
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub fingerprint: Fingerprint,
    pub bytes: Arc<Vec<u8>>,
}

/// A builder closure invoked on a cache miss. Returns owned bytes; the cache
/// wraps them in a [`CachedArtifact`] and propagates to every waiting
/// caller.
pub type Builder<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<Vec<u8>, CoreError>> + Send + 'a>;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the cached artifact for `fingerprint` if present at any tier;
    /// otherwise invokes `builder` exactly once even under concurrent
    /// callers for the same fingerprint (single-flight), and propagates the
    /// built artifact to every tier on the way back up.
    async fn get_or_build<'a>(
        &'a self,
        fingerprint: Fingerprint,
        builder: Builder<'a>,
    ) -> Result<CachedArtifact, CoreError>;

    /// Looks up `fingerprint` without triggering a build; `None` on a full
    /// miss across every tier.
    async fn peek(&self, fingerprint: Fingerprint) -> Result<Option<CachedArtifact>, CoreError>;
}
