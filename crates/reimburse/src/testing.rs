//! Deterministic synthetic corpora for tests and benchmarks.
//!
//! Labels come from a piecewise formula with the same kinds of kinks the
//! feature set is built around (per-day rate, mileage tiers, a receipt
//! penalty on very short and very long trips, a cap on large receipts)
//! plus a little seeded noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{Case, Corpus, LabeledCase};

/// Label for `case` before noise.
pub fn reference_amount(case: &Case) -> f64 {
    let days = case.days() as f64;
    let miles = case.miles();
    let receipts = case.receipts();

    let per_day = 95.0 * days + if case.days() == 5 { 60.0 } else { 0.0 };
    let mileage = 0.58 * miles.min(100.0) + 0.42 * (miles - 100.0).max(0.0);
    let receipt_rate = match case.days() {
        1 => 0.45,
        d if d >= 8 => 0.55,
        _ => 0.75,
    };
    let capped = if receipts > 1800.0 {
        1800.0 + 0.2 * (receipts - 1800.0)
    } else {
        receipts
    };
    per_day + mileage + receipt_rate * capped
}

/// `n` labeled cases drawn from `seed`.
///
/// Days are uniform in 1..=14, miles in [0, 1200), receipts in [0, 2500),
/// all rounded to cents.
pub fn synthetic_corpus(n: usize, seed: u64) -> Corpus {
    let mut rng = StdRng::seed_from_u64(seed);
    std::iter::repeat_with(|| {
        let days: u32 = rng.gen_range(1..=14);
        let miles = cents(rng.gen_range(0.0..1200.0));
        let receipts = cents(rng.gen_range(0.0..2500.0));
        let noise: f64 = rng.gen_range(-2.0..2.0);
        (days, miles, receipts, noise)
    })
    .filter_map(|(days, miles, receipts, noise)| {
        let case = Case::new(days, miles, receipts).ok()?;
        let expected = cents(reference_amount(&case) + noise);
        Some(LabeledCase { case, expected })
    })
    .take(n)
    .collect()
}

fn cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
