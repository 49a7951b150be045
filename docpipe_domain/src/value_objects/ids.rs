// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Entity identifiers
//!
//! A generic, type-safe ID value object built on ULID (time-ordered,
//! lexicographically sortable) with a phantom category marker, plus a small
//! macro that stamps out one newtype per entity. This replaces what would
//! otherwise be ten near-identical `FooId(GenericId<FooMarker>)` modules with
//! their own copy-pasted `Display`/`FromStr`/serde impls.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use ulid::Ulid;

use crate::CoreError;

/// Per-category validation hook for [`GenericId`].
pub trait IdCategory {
    fn category_name() -> &'static str;

    fn validate_id(ulid: &Ulid) -> Result<(), CoreError> {
        if *ulid == Ulid::nil() {
            return Err(CoreError::ValidationFailed(format!(
                "{} id cannot be nil",
                Self::category_name()
            )));
        }
        Ok(())
    }
}

/// Foundation that every concrete entity id newtype wraps.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.to_string().serialize(serializer)
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ulid = Ulid::from_string(&s).map_err(|e| serde::de::Error::custom(e.to_string()))?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }
}

impl<T: IdCategory> GenericId<T> {
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn from_ulid(ulid: Ulid) -> Result<Self, CoreError> {
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Builds an id with a specific timestamp; used to create boundary ids
    /// for time-range queries and reproducible test fixtures.
    pub fn from_timestamp_ms(timestamp_ms: u64) -> Result<Self, CoreError> {
        let random = rand::random::<u128>() & ((1u128 << 80) - 1);
        let ulid = Ulid::from_parts(timestamp_ms, random);
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn from_string(s: &str) -> Result<Self, CoreError> {
        let ulid = Ulid::from_str(s)
            .map_err(|e| CoreError::ValidationFailed(format!("invalid id format: {e}")))?;
        Self::from_ulid(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    pub fn datetime(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.timestamp_ms() as i64)
            .unwrap_or_else(chrono::Utc::now)
    }

    pub fn is_nil(&self) -> bool {
        self.value.0 == 0
    }

    #[cfg(test)]
    pub fn nil() -> Self {
        Self {
            value: Ulid(0),
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> Copy for GenericId<T> {}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl<T: IdCategory> From<GenericId<T>> for Ulid {
    fn from(id: GenericId<T>) -> Self {
        id.value
    }
}

/// Stamps out a concrete, type-safe entity id newtype wrapping
/// [`GenericId`], so `FileId` and `RunId` can never be confused at the
/// call site even though both are ULIDs underneath.
macro_rules! define_id {
    ($name:ident, $category:literal) => {
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $name(GenericId<$name>);

        impl IdCategory for $name {
            fn category_name() -> &'static str {
                $category
            }
        }

        impl $name {
            pub fn new() -> Self {
                Self(GenericId::new())
            }

            pub fn from_string(s: &str) -> Result<Self, CoreError> {
                Ok(Self(GenericId::from_string(s)?))
            }

            pub fn as_ulid(&self) -> Ulid {
                self.0.as_ulid()
            }

            pub fn timestamp_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }

            pub fn datetime(&self) -> chrono::DateTime<chrono::Utc> {
                self.0.datetime()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_string(s)
            }
        }
    };
}

define_id!(FileId, "file");
define_id!(SessionId, "upload_session");
define_id!(ElementId, "element");
define_id!(RelationshipId, "relationship");
define_id!(RunId, "pipeline_run");
define_id!(TaskId, "task");
define_id!(StageId, "stage");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_of_different_entities_are_time_ordered_and_unique() {
        let a = FileId::new();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = FileId::new();
        assert_ne!(a, b);
        assert!(b.as_ulid() > a.as_ulid());
    }

    #[test]
    fn ids_round_trip_through_string_and_json() {
        let id = RunId::new();
        let parsed = RunId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);

        let json = serde_json::to_string(&id).unwrap();
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn nil_id_string_is_rejected() {
        assert!(FileId::from_string("00000000000000000000000000").is_err());
    }
}
