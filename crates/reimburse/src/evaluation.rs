//! Accuracy of a predictor over a labeled corpus.

use std::fmt;

use ndarray::{Array1, ArrayView1};

use crate::data::Corpus;
use crate::error::Result;
use crate::serving::{EstimateSource, Predictor};
use crate::training::{Mae, MetricFn, Rmse};
use crate::utils::Parallelism;

/// Absolute error below which an estimate counts as exact.
pub const EXACT_TOLERANCE: f64 = 0.01;
/// Absolute error below which an estimate counts as close.
pub const CLOSE_TOLERANCE: f64 = 1.0;

/// Summary of estimation error over a corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub n_cases: usize,
    /// Cases with absolute error below [`EXACT_TOLERANCE`].
    pub exact_matches: usize,
    /// Cases with absolute error below [`CLOSE_TOLERANCE`].
    pub close_matches: usize,
    pub mean_abs_error: f64,
    pub rmse: f64,
    pub max_error: f64,
    /// Corpus index of the case with the largest error.
    pub max_error_index: Option<usize>,
    /// Sum of absolute errors. Lower is better.
    pub score: f64,
    /// Cases estimated with the fallback formula for lack of a model.
    pub fallback_cases: usize,
}

impl EvalReport {
    pub fn from_predictions(predictions: ArrayView1<f64>, targets: ArrayView1<f64>) -> Self {
        debug_assert_eq!(predictions.len(), targets.len());
        let errors: Array1<f64> = predictions
            .iter()
            .zip(targets.iter())
            .map(|(&p, &t)| (p - t).abs())
            .collect();

        let mut max_error = 0.0;
        let mut max_error_index = None;
        for (i, &e) in errors.iter().enumerate() {
            if max_error_index.is_none() || e > max_error {
                max_error = e;
                max_error_index = Some(i);
            }
        }

        Self {
            n_cases: errors.len(),
            exact_matches: errors.iter().filter(|&&e| e < EXACT_TOLERANCE).count(),
            close_matches: errors.iter().filter(|&&e| e < CLOSE_TOLERANCE).count(),
            mean_abs_error: Mae.compute(predictions, targets),
            rmse: Rmse.compute(predictions, targets),
            max_error,
            max_error_index,
            score: errors.sum(),
            fallback_cases: 0,
        }
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |n: usize| {
            if self.n_cases == 0 {
                0.0
            } else {
                100.0 * n as f64 / self.n_cases as f64
            }
        };
        writeln!(f, "cases:          {}", self.n_cases)?;
        writeln!(
            f,
            "exact (<0.01):  {} ({:.1}%)",
            self.exact_matches,
            pct(self.exact_matches)
        )?;
        writeln!(
            f,
            "close (<1.00):  {} ({:.1}%)",
            self.close_matches,
            pct(self.close_matches)
        )?;
        writeln!(f, "mae:            {:.2}", self.mean_abs_error)?;
        writeln!(f, "rmse:           {:.2}", self.rmse)?;
        match self.max_error_index {
            Some(i) => writeln!(f, "max error:      {:.2} (case {i})", self.max_error)?,
            None => writeln!(f, "max error:      -")?,
        }
        if self.fallback_cases > 0 {
            writeln!(f, "fallback:       {}", self.fallback_cases)?;
        }
        write!(f, "score:          {:.2}", self.score)
    }
}

/// Estimate every case of `corpus` and compare with its label.
///
/// Cases without a model are scored on the fallback formula and counted in
/// [`EvalReport::fallback_cases`].
pub fn evaluate(
    predictor: &Predictor,
    corpus: &Corpus,
    parallelism: Parallelism,
) -> Result<EvalReport> {
    let estimates = predictor.estimate_batch_or_fallback(&corpus.inputs(), parallelism)?;
    let predictions: Array1<f64> = estimates.iter().map(|e| e.amount).collect();

    let mut report = EvalReport::from_predictions(predictions.view(), corpus.targets().view());
    report.fallback_cases = estimates
        .iter()
        .filter(|e| e.source == EstimateSource::Fallback)
        .count();
    tracing::info!(
        n_cases = report.n_cases,
        mae = report.mean_abs_error,
        score = report.score,
        fallback_cases = report.fallback_cases,
        "evaluated corpus"
    );
    Ok(report)
}
