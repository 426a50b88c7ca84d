//! Case to feature vector transformation.
//!
//! One kernel ([`FeatureTransformer::transform`]) computes every column.
//! The batch path calls the same kernel per row, so batch and single-case
//! outputs are bit-identical.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::schema::{FeatureSchema, N_FEATURES, columns};
use crate::data::Case;

// =============================================================================
// FeatureParams
// =============================================================================

/// Constants of the receipt-cap feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureParams {
    /// Receipts strictly above this amount are scaled by `receipt_cap_factor`.
    pub receipt_cap: f64,
    /// Scale applied to capped receipts.
    pub receipt_cap_factor: f64,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            receipt_cap: 2000.0,
            receipt_cap_factor: 0.25,
        }
    }
}

// =============================================================================
// TripCategory
// =============================================================================

/// Coarse trip shape, one-hot encoded into five contiguous columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripCategory {
    Balanced,
    LongHaul,
    LowEfficiency,
    QuickHighMiles,
    SweetSpot,
}

impl TripCategory {
    /// All categories in column order.
    pub const ALL: [TripCategory; 5] = [
        TripCategory::Balanced,
        TripCategory::LongHaul,
        TripCategory::LowEfficiency,
        TripCategory::QuickHighMiles,
        TripCategory::SweetSpot,
    ];

    /// Classify a trip; the first matching rule wins.
    pub fn classify(days: u32, miles_per_day: f64) -> Self {
        if days <= 2 && miles_per_day > 150.0 {
            TripCategory::QuickHighMiles
        } else if days >= 8 {
            TripCategory::LongHaul
        } else if miles_per_day < 50.0 {
            TripCategory::LowEfficiency
        } else if (180.0..=220.0).contains(&miles_per_day) {
            TripCategory::SweetSpot
        } else {
            TripCategory::Balanced
        }
    }

    /// Offset of this category's indicator within the one-hot block.
    pub fn offset(self) -> usize {
        match self {
            TripCategory::Balanced => 0,
            TripCategory::LongHaul => 1,
            TripCategory::LowEfficiency => 2,
            TripCategory::QuickHighMiles => 3,
            TripCategory::SweetSpot => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripCategory::Balanced => "balanced",
            TripCategory::LongHaul => "long_haul",
            TripCategory::LowEfficiency => "low_efficiency",
            TripCategory::QuickHighMiles => "quick_high_miles",
            TripCategory::SweetSpot => "sweet_spot",
        }
    }
}

// =============================================================================
// FeatureVector
// =============================================================================

/// Engineered features of one case, in [`FeatureSchema::current`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; N_FEATURES]);

impl FeatureVector {
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[inline]
    pub fn as_array(&self) -> &[f64; N_FEATURES] {
        &self.0
    }

    /// Value of the named feature.
    pub fn get(&self, name: &str) -> Option<f64> {
        super::schema::FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    /// The category whose indicator is set.
    pub fn category(&self) -> Option<TripCategory> {
        TripCategory::ALL
            .into_iter()
            .find(|c| self.0[columns::CATEGORY_START + c.offset()] == 1.0)
    }
}

impl std::ops::Index<usize> for FeatureVector {
    type Output = f64;

    #[inline]
    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

// =============================================================================
// FeatureTransformer
// =============================================================================

/// Deterministic encoder from [`Case`] to [`FeatureVector`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureTransformer {
    params: FeatureParams,
}

impl FeatureTransformer {
    pub fn new(params: FeatureParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    /// Schema of the vectors this transformer produces.
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::current()
    }

    /// Transform a single case.
    pub fn transform(&self, case: &Case) -> FeatureVector {
        let days = case.days() as f64;
        let miles = case.miles();
        let receipts = case.receipts();

        let miles_per_day = finite_or_zero(miles / days);
        let receipts_per_day = finite_or_zero(receipts / days);
        let multiplier = receipt_multiplier(case.days());
        let adjusted = if receipts > self.params.receipt_cap {
            receipts * self.params.receipt_cap_factor
        } else {
            receipts
        };

        let mut out = [0.0f64; N_FEATURES];
        out[columns::TRIP_DURATION_DAYS] = days;
        out[columns::MILES_TRAVELED] = miles;
        out[columns::TOTAL_RECEIPTS_AMOUNT] = receipts;
        out[columns::MILES_PER_DAY] = miles_per_day;
        out[columns::RECEIPTS_PER_DAY] = receipts_per_day;
        out[columns::FOUR_DAY_BONUS] = if case.days() == 4 { 150.0 } else { 0.0 };
        out[columns::RECEIPT_MULTIPLIER] = multiplier;
        out[columns::ADJUSTED_RECEIPTS] = adjusted;
        out[columns::MULTIPLIED_RECEIPTS] = adjusted * multiplier;
        out[columns::MILES_TIER1] = miles.clamp(0.0, 100.0);
        out[columns::MILES_TIER2] = (miles - 100.0).clamp(0.0, 400.0);
        out[columns::MILES_TIER3] = (miles - 500.0).max(0.0);
        out[columns::EFFICIENCY_BONUS_RANGE] = if (180.0..=220.0).contains(&miles_per_day) {
            1.0
        } else {
            0.0
        };
        let category = TripCategory::classify(case.days(), miles_per_day);
        out[columns::CATEGORY_START + category.offset()] = 1.0;
        out[columns::DAYS_X_MILES] = days * miles;

        FeatureVector(out)
    }

    /// Transform many cases into a `[n_cases, N_FEATURES]` row-major matrix.
    pub fn transform_batch(&self, cases: &[Case]) -> Array2<f64> {
        let mut out = Array2::zeros((cases.len(), N_FEATURES));
        for (mut row, case) in out.outer_iter_mut().zip(cases) {
            let features = self.transform(case);
            row.assign(&ArrayView1::from(features.as_slice()));
        }
        out
    }
}

/// Per-duration weight on submitted receipts.
pub fn receipt_multiplier(days: u32) -> f64 {
    match days {
        1 => -0.5,
        5 => 1.04,
        d if d >= 8 => 0.02,
        _ => 1.0,
    }
}

#[inline]
fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;

    fn case(days: u32, miles: f64, receipts: f64) -> Case {
        Case::new(days, miles, receipts).unwrap()
    }

    #[rstest]
    #[case(1, -0.5)]
    #[case(2, 1.0)]
    #[case(4, 1.0)]
    #[case(5, 1.04)]
    #[case(7, 1.0)]
    #[case(8, 0.02)]
    #[case(14, 0.02)]
    fn multiplier_by_duration(#[case] days: u32, #[case] expected: f64) {
        assert_eq!(receipt_multiplier(days), expected);
    }

    #[rstest]
    #[case(1, 151.0, TripCategory::QuickHighMiles)]
    #[case(2, 150.0, TripCategory::Balanced)]
    #[case(2, 40.0, TripCategory::LowEfficiency)]
    #[case(9, 300.0, TripCategory::LongHaul)]
    #[case(9, 10.0, TripCategory::LongHaul)]
    #[case(4, 180.0, TripCategory::SweetSpot)]
    #[case(4, 220.0, TripCategory::SweetSpot)]
    #[case(4, 220.5, TripCategory::Balanced)]
    #[case(3, 49.99, TripCategory::LowEfficiency)]
    #[case(3, 50.0, TripCategory::Balanced)]
    fn category_priority(#[case] days: u32, #[case] mpd: f64, #[case] expected: TripCategory) {
        assert_eq!(TripCategory::classify(days, mpd), expected);
    }

    #[test]
    fn four_day_bonus_only_on_four_days() {
        let t = FeatureTransformer::default();
        assert_eq!(t.transform(&case(4, 100.0, 50.0))[columns::FOUR_DAY_BONUS], 150.0);
        assert_eq!(t.transform(&case(3, 100.0, 50.0))[columns::FOUR_DAY_BONUS], 0.0);
    }

    #[test]
    fn receipt_cap_is_strict() {
        let t = FeatureTransformer::default();
        assert_eq!(t.transform(&case(3, 0.0, 2000.0))[columns::ADJUSTED_RECEIPTS], 2000.0);
        assert_eq!(t.transform(&case(3, 0.0, 2000.01))[columns::ADJUSTED_RECEIPTS], 2000.01 * 0.25);
    }

    #[test]
    fn custom_cap_params() {
        let t = FeatureTransformer::new(FeatureParams {
            receipt_cap: 1000.0,
            receipt_cap_factor: 0.5,
        });
        let fv = t.transform(&case(2, 0.0, 1500.0));
        assert_eq!(fv[columns::ADJUSTED_RECEIPTS], 750.0);
        assert_eq!(fv[columns::MULTIPLIED_RECEIPTS], 750.0);
    }

    #[test]
    fn ratios_and_interaction() {
        let fv = FeatureTransformer::default().transform(&case(3, 600.0, 300.0));
        assert_abs_diff_eq!(fv[columns::MILES_PER_DAY], 200.0);
        assert_abs_diff_eq!(fv[columns::RECEIPTS_PER_DAY], 100.0);
        assert_eq!(fv[columns::EFFICIENCY_BONUS_RANGE], 1.0);
        assert_eq!(fv[columns::DAYS_X_MILES], 1800.0);
        assert_eq!(fv.category(), Some(TripCategory::SweetSpot));
        assert_eq!(fv.get("miles_tier3"), Some(100.0));
        assert_eq!(fv.get("no_such_feature"), None);
    }

    #[test]
    fn batch_rows_match_single() {
        let t = FeatureTransformer::default();
        let cases = vec![case(1, 800.0, 100.0), case(5, 0.0, 0.0), case(8, 1000.0, 2500.0)];
        let batch = t.transform_batch(&cases);
        assert_eq!(batch.dim(), (3, N_FEATURES));
        for (row, c) in batch.outer_iter().zip(&cases) {
            assert_eq!(row.to_vec(), t.transform(c).as_slice().to_vec());
        }
    }

    #[test]
    fn empty_batch() {
        let batch = FeatureTransformer::default().transform_batch(&[]);
        assert_eq!(batch.dim(), (0, N_FEATURES));
    }
}
