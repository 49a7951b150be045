// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Cache key fingerprint: identifies a `(processor, version, input, options)`
//! tuple. The wire format is fixed by the external interfaces contract so
//! independent implementations of the cache layer agree on cache hits:
//!
//! ```text
//! sha256(processor_name || 0x1f || processor_version || 0x1f
//!        || input_hash || 0x1f || canonical_json(options))
//! ```
//!
//! hex-encoded. `0x1f` (ASCII unit separator) delimits fields so that no
//! field value can accidentally straddle a boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::value_objects::ContentHash;
use crate::CoreError;

const FIELD_SEPARATOR: u8 = 0x1f;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn compute(
        processor_name: &str,
        processor_version: &str,
        input_hash: ContentHash,
        options: &Value,
    ) -> Result<Self, CoreError> {
        let canonical_options = canonical_json(options)?;

        let mut hasher = Sha256::new();
        hasher.update(processor_name.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(processor_version.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(input_hash.to_hex().as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(canonical_options.as_bytes());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)
            .map_err(|e| CoreError::ValidationFailed(format!("invalid fingerprint hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(CoreError::ValidationFailed(
                "fingerprint must be 32 bytes".into(),
            ));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Produces a stable byte representation of a JSON value: object keys sorted,
/// no insignificant whitespace. `serde_json::Value`'s `Ord` impl on `Map`
/// already iterates in sorted key order once built from a `BTreeMap`-backed
/// map, so round-tripping through a canonicalized map is sufficient here.
fn canonical_json(value: &Value) -> Result<String, CoreError> {
    let canonical = canonicalize(value);
    serde_json::to_string(&canonical).map_err(CoreError::from)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_inputs_produce_identical_fingerprints() {
        let hash = ContentHash::of_bytes(b"input");
        let a = Fingerprint::compute("pdf-extract", "1.0.0", hash, &json!({"dpi": 300})).unwrap();
        let b = Fingerprint::compute("pdf-extract", "1.0.0", hash, &json!({"dpi": 300})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn key_order_in_options_does_not_affect_the_fingerprint() {
        let hash = ContentHash::of_bytes(b"input");
        let a = Fingerprint::compute("p", "1", hash, &json!({"a": 1, "b": 2})).unwrap();
        let b = Fingerprint::compute("p", "1", hash, &json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_processor_versions_produce_different_fingerprints() {
        let hash = ContentHash::of_bytes(b"input");
        let a = Fingerprint::compute("p", "1.0.0", hash, &json!({})).unwrap();
        let b = Fingerprint::compute("p", "1.0.1", hash, &json!({})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trips() {
        let hash = ContentHash::of_bytes(b"input");
        let f = Fingerprint::compute("p", "1", hash, &json!(null)).unwrap();
        assert_eq!(Fingerprint::from_hex(&f.to_hex()).unwrap(), f);
    }
}
