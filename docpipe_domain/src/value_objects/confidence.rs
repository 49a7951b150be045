// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A relationship's confidence, clamped to `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Result<Self, CoreError> {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(CoreError::ValidationFailed(format!(
                "confidence must be within [0, 1], got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn clamped(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub const MAX: Confidence = Confidence(1.0);
    pub const MIN: Confidence = Confidence(0.0);

    pub fn max(self, other: Confidence) -> Confidence {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

impl PartialEq for Confidence {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Confidence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Confidence::new(1.5).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(0.5).is_ok());
    }

    #[test]
    fn max_picks_the_higher_confidence() {
        let a = Confidence::new(0.3).unwrap();
        let b = Confidence::new(0.7).unwrap();
        assert_eq!(a.max(b).value(), 0.7);
    }
}
