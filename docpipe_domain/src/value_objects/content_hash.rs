// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SHA-256 content hash. Used both as the identity of a stored blob (content
//! addressing, dedup) and as an ingredient of [`crate::value_objects::Fingerprint`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Incrementally hashes a byte stream without buffering it in memory,
    /// for use against upload streams.
    pub fn of_stream<I: IntoIterator<Item = Vec<u8>>>(chunks: I) -> Self {
        let mut hasher = Sha256::new();
        for chunk in chunks {
            hasher.update(&chunk);
        }
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)
            .map_err(|e| CoreError::ValidationFailed(format!("invalid content hash hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(CoreError::ValidationFailed(format!(
                "content hash must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First two hex characters, used as the blob store's directory shard:
    /// `<root>/blobs/<aa>/<hash>`.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_hash_identically() {
        let a = ContentHash::of_bytes(b"hello world");
        let b = ContentHash::of_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(ContentHash::of_bytes(b"a"), ContentHash::of_bytes(b"b"));
    }

    #[test]
    fn hex_round_trips() {
        let h = ContentHash::of_bytes(b"round trip me");
        let parsed = ContentHash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn shard_prefix_is_two_hex_chars() {
        let h = ContentHash::of_bytes(b"shard");
        assert_eq!(h.shard_prefix().len(), 2);
    }
}
