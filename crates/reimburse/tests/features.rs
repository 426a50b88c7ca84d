//! Feature transformer laws and literal vectors.

use proptest::prelude::*;

use reimburse::data::Case;
use reimburse::features::{FEATURE_NAMES, FeatureTransformer, N_FEATURES, TripCategory, columns};

fn arb_case() -> impl Strategy<Value = Case> {
    (1u32..=30, 0.0f64..5000.0, 0.0f64..5000.0)
        .prop_map(|(days, miles, receipts)| Case::new(days, miles, receipts).expect("valid case"))
}

proptest! {
    #[test]
    fn batch_rows_equal_single_vectors(cases in prop::collection::vec(arb_case(), 0..40)) {
        let transformer = FeatureTransformer::default();
        let batch = transformer.transform_batch(&cases);
        prop_assert_eq!(batch.nrows(), cases.len());
        prop_assert_eq!(batch.ncols(), N_FEATURES);
        for (row, case) in batch.outer_iter().zip(&cases) {
            let single = transformer.transform(case);
            for (a, b) in row.iter().zip(single.as_slice()) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }

    #[test]
    fn every_feature_is_finite(case in arb_case()) {
        let fv = FeatureTransformer::default().transform(&case);
        prop_assert!(fv.as_slice().iter().all(|x| x.is_finite()));
        prop_assert!(fv[columns::MILES_PER_DAY] >= 0.0);
        prop_assert!(fv[columns::RECEIPTS_PER_DAY] >= 0.0);
    }

    #[test]
    fn exactly_one_category(case in arb_case()) {
        let fv = FeatureTransformer::default().transform(&case);
        let block = &fv.as_slice()[columns::CATEGORY_START..columns::CATEGORY_START + TripCategory::ALL.len()];
        prop_assert_eq!(block.iter().filter(|&&x| x == 1.0).count(), 1);
        prop_assert_eq!(block.iter().filter(|&&x| x == 0.0).count(), TripCategory::ALL.len() - 1);
        prop_assert!(fv.category().is_some());
    }

    #[test]
    fn large_receipts_are_capped_for_any_duration(days in 1u32..=30) {
        let fv = FeatureTransformer::default()
            .transform(&Case::new(days, 100.0, 2500.0).expect("valid case"));
        prop_assert_eq!(fv.get("adjusted_receipts"), Some(625.0));
    }
}

#[test]
fn five_day_empty_trip() {
    let fv = FeatureTransformer::default().transform(&Case::new(5, 0.0, 0.0).expect("valid case"));
    let expected: [f64; N_FEATURES] = [
        5.0,  // trip_duration_days
        0.0,  // miles_traveled
        0.0,  // total_receipts_amount
        0.0,  // miles_per_day
        0.0,  // receipts_per_day
        0.0,  // four_day_bonus
        1.04, // receipt_multiplier
        0.0,  // adjusted_receipts
        0.0,  // multiplied_receipts
        0.0,  // miles_tier1
        0.0,  // miles_tier2
        0.0,  // miles_tier3
        0.0,  // efficiency_bonus_range
        0.0,  // cat_balanced
        0.0,  // cat_long_haul
        1.0,  // cat_low_efficiency
        0.0,  // cat_quick_high_miles
        0.0,  // cat_sweet_spot
        0.0,  // days_x_miles
    ];
    assert_eq!(fv.as_array(), &expected);
    assert_eq!(fv.category(), Some(TripCategory::LowEfficiency));
}

#[test]
fn one_day_high_mileage_trip() {
    let fv =
        FeatureTransformer::default().transform(&Case::new(1, 800.0, 100.0).expect("valid case"));
    let expected: [f64; N_FEATURES] = [
        1.0,   // trip_duration_days
        800.0, // miles_traveled
        100.0, // total_receipts_amount
        800.0, // miles_per_day
        100.0, // receipts_per_day
        0.0,   // four_day_bonus
        -0.5,  // receipt_multiplier
        100.0, // adjusted_receipts
        -50.0, // multiplied_receipts
        100.0, // miles_tier1
        400.0, // miles_tier2
        300.0, // miles_tier3
        0.0,   // efficiency_bonus_range
        0.0,   // cat_balanced
        0.0,   // cat_long_haul
        0.0,   // cat_low_efficiency
        1.0,   // cat_quick_high_miles
        0.0,   // cat_sweet_spot
        800.0, // days_x_miles
    ];
    assert_eq!(fv.as_array(), &expected);
    assert_eq!(fv.category(), Some(TripCategory::QuickHighMiles));
}

#[test]
fn names_cover_every_column() {
    assert_eq!(FEATURE_NAMES.len(), N_FEATURES);
    let fv =
        FeatureTransformer::default().transform(&Case::new(4, 820.0, 610.25).expect("valid case"));
    for (i, name) in FEATURE_NAMES.iter().enumerate() {
        assert_eq!(fv.get(name), Some(fv[i]), "{name}");
    }
}
