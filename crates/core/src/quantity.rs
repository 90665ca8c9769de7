//! Numeric production quantities (meters, allocation splits).
//!
//! Operators type quantities with thousands separators ("1.000", "12 500").
//! Internally everything is a plain integer; grouping only exists at the
//! parse and display boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("invalid quantity: {0:?}")]
    Invalid(String),
}

impl From<QuantityError> for DispatchError {
    fn from(e: QuantityError) -> Self {
        DispatchError::PreconditionFailed(e.to_string())
    }
}

/// A whole-number quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Parse operator input: plain digits, or digits grouped in threes
    /// by a single separator kind (`.`, space or `_`). A decimal point or
    /// comma is rejected.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = || QuantityError::Invalid(trimmed.to_string());

        let separators: Vec<char> = trimmed
            .chars()
            .filter(|c| matches!(c, '.' | ' ' | '_'))
            .collect();
        let digits = match separators.first() {
            None => trimmed.to_string(),
            Some(&sep) => {
                if separators.iter().any(|&c| c != sep) {
                    return Err(invalid());
                }
                let mut groups = trimmed.split(sep);
                let head = groups.next().unwrap_or_default();
                if head.is_empty() || head.len() > 3 {
                    return Err(invalid());
                }
                let mut digits = head.to_string();
                for group in groups {
                    if group.len() != 3 {
                        return Err(invalid());
                    }
                    digits.push_str(group);
                }
                digits
            }
        };

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.parse::<u64>().map(Self).map_err(|_| invalid())
    }
}

impl fmt::Display for Quantity {
    /// Formats with `.` thousands grouping, e.g. `1.000` or `12.500`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0.to_string();
        let mut grouped = String::with_capacity(raw.len() + raw.len() / 3);
        for (i, c) in raw.chars().enumerate() {
            if i > 0 && (raw.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        f.write_str(&grouped)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for Quantity {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        Quantity(iter.map(|q| q.0).fold(0u64, u64::saturating_add))
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Quantity(n)),
            Raw::Text(s) => Quantity::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}
