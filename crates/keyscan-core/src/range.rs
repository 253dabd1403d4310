//! Keyspace ranges and the validation threshold

use std::fmt;
use std::str::FromStr;

use keyscan_crypto::scalar_hex;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::ConfigError;

/// Inclusive scalar range `[start, end]` with `start < end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    start: BigUint,
    end: BigUint,
}

impl KeyRange {
    pub fn new(start: BigUint, end: BigUint) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::EmptyRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &BigUint {
        &self.start
    }

    pub fn end(&self) -> &BigUint {
        &self.end
    }

    /// `end - start`
    pub fn width(&self) -> BigUint {
        &self.end - &self.start
    }

    /// Number of keys in the range, both ends included
    pub fn key_count(&self) -> BigUint {
        self.width() + 1u32
    }

    pub fn contains(&self, key: &BigUint) -> bool {
        *key >= self.start && *key <= self.end
    }

    /// Split into at most `parts` disjoint contiguous sub-ranges that
    /// cover the whole range in order. Every sub-range holds at least two
    /// keys, so fewer parts come back when the range is too small.
    pub fn partition(&self, parts: usize) -> Vec<KeyRange> {
        let count = self.key_count();
        let max_parts = (&count / 2u32).to_usize().unwrap_or(usize::MAX).max(1);
        let parts = parts.clamp(1, max_parts);
        let chunk = &count / parts;

        (0..parts)
            .map(|i| {
                let start = &self.start + &chunk * i;
                let end = if i + 1 == parts {
                    self.end.clone()
                } else {
                    &start + &chunk - 1u32
                };
                KeyRange { start, end }
            })
            .collect()
    }

    /// Absolute position `percent` of the way from `start` to `end`,
    /// rounded down.
    pub fn threshold_at(&self, percent: &Percent) -> BigUint {
        let offset = self.width() * &percent.numer / (&percent.denom * 100u32);
        &self.start + offset
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", scalar_hex(&self.start), scalar_hex(&self.end))
    }
}

/// Exact decimal percentage in `[0, 100]`, stored as `numer / denom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Percent {
    numer: BigUint,
    denom: BigUint,
}

impl Percent {
    pub fn is_zero(&self) -> bool {
        self.numer.is_zero()
    }
}

impl FromStr for Percent {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidThreshold(s.to_string());
        let trimmed = s.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let digits = format!("{whole}{frac}");
        let numer = if digits.is_empty() {
            BigUint::zero()
        } else {
            digits.parse::<BigUint>().map_err(|_| invalid())?
        };
        let denom = BigUint::from(10u32).pow(frac.len() as u32);

        if numer > &denom * 100u32 {
            return Err(invalid());
        }
        Ok(Self { numer, denom })
    }
}
