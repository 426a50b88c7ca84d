//! Feature schema: the ordered list of engineered feature names.
//!
//! A fitted tree addresses features by column index, so a model is only
//! meaningful for the exact ordered schema it was fit on. Persisted models
//! carry the names they were fit with and are rejected when those differ
//! from [`FeatureSchema::current`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of engineered features.
pub const N_FEATURES: usize = 19;

/// Feature names in column order.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "trip_duration_days",
    "miles_traveled",
    "total_receipts_amount",
    "miles_per_day",
    "receipts_per_day",
    "four_day_bonus",
    "receipt_multiplier",
    "adjusted_receipts",
    "multiplied_receipts",
    "miles_tier1",
    "miles_tier2",
    "miles_tier3",
    "efficiency_bonus_range",
    "cat_balanced",
    "cat_long_haul",
    "cat_low_efficiency",
    "cat_quick_high_miles",
    "cat_sweet_spot",
    "days_x_miles",
];

/// Column indices, named.
pub mod columns {
    pub const TRIP_DURATION_DAYS: usize = 0;
    pub const MILES_TRAVELED: usize = 1;
    pub const TOTAL_RECEIPTS_AMOUNT: usize = 2;
    pub const MILES_PER_DAY: usize = 3;
    pub const RECEIPTS_PER_DAY: usize = 4;
    pub const FOUR_DAY_BONUS: usize = 5;
    pub const RECEIPT_MULTIPLIER: usize = 6;
    pub const ADJUSTED_RECEIPTS: usize = 7;
    pub const MULTIPLIED_RECEIPTS: usize = 8;
    pub const MILES_TIER1: usize = 9;
    pub const MILES_TIER2: usize = 10;
    pub const MILES_TIER3: usize = 11;
    pub const EFFICIENCY_BONUS_RANGE: usize = 12;
    /// First trip-category indicator; the five indicators are contiguous.
    pub const CATEGORY_START: usize = 13;
    pub const DAYS_X_MILES: usize = 18;
}

/// Compact identity of a feature schema (CRC32 over the ordered names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaFingerprint(pub u32);

impl fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// An ordered set of feature names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// The schema produced by this crate's transformer.
    pub fn current() -> Self {
        Self {
            names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Schema from stored names (e.g. read back from an artifact).
    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn fingerprint(&self) -> SchemaFingerprint {
        let mut hasher = crc32fast::Hasher::new();
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        SchemaFingerprint(hasher.finalize())
    }

    /// First position where `self` and `other` disagree, if any.
    pub fn first_difference(&self, other: &FeatureSchema) -> Option<usize> {
        let shared = self.len().min(other.len());
        (0..shared)
            .find(|&i| self.names[i] != other.names[i])
            .or_else(|| (self.len() != other.len()).then_some(shared))
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_constants_match_names() {
        assert_eq!(FEATURE_NAMES[columns::MILES_PER_DAY], "miles_per_day");
        assert_eq!(FEATURE_NAMES[columns::MULTIPLIED_RECEIPTS], "multiplied_receipts");
        assert_eq!(FEATURE_NAMES[columns::CATEGORY_START], "cat_balanced");
        assert_eq!(FEATURE_NAMES[columns::DAYS_X_MILES], "days_x_miles");
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let current = FeatureSchema::current();
        let mut swapped: Vec<String> = current.names().to_vec();
        swapped.swap(0, 1);
        let swapped = FeatureSchema::from_names(swapped);

        assert_eq!(current.fingerprint(), FeatureSchema::current().fingerprint());
        assert_ne!(current.fingerprint(), swapped.fingerprint());
        assert_eq!(current.first_difference(&swapped), Some(0));
    }

    #[test]
    fn first_difference_on_truncation() {
        let current = FeatureSchema::current();
        let truncated = FeatureSchema::from_names(current.names()[..5].to_vec());
        assert_eq!(current.first_difference(&truncated), Some(5));
        assert_eq!(current.first_difference(&current.clone()), None);
    }

    #[test]
    fn fingerprint_displays_as_hex() {
        assert_eq!(SchemaFingerprint(0xab).to_string(), "000000ab");
    }
}
