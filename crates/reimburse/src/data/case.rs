//! Trip cases and labels.

use thiserror::Error;

/// Errors raised when constructing a [`Case`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaseError {
    /// Trip duration outside `1..=u32::MAX`.
    #[error("trip duration must be a positive whole number of days, got {0}")]
    InvalidDays(i64),

    /// A monetary or distance amount was negative, NaN or infinite.
    #[error("{field} must be finite and non-negative, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    /// A label was NaN or infinite.
    #[error("expected output must be finite, got {0}")]
    InvalidLabel(f64),
}

/// One trip: duration, distance and submitted receipts.
///
/// Immutable once constructed; the constructor guarantees `days >= 1` and
/// finite non-negative `miles` / `receipts`, so every derived ratio is finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Case {
    days: u32,
    miles: f64,
    receipts: f64,
}

impl Case {
    /// Create a validated case.
    pub fn new(days: u32, miles: f64, receipts: f64) -> Result<Self, CaseError> {
        if days == 0 {
            return Err(CaseError::InvalidDays(0));
        }
        check_amount("miles_traveled", miles)?;
        check_amount("total_receipts_amount", receipts)?;
        Ok(Self {
            days,
            miles,
            receipts,
        })
    }

    /// Create a case from a signed day count, as found in loosely typed input.
    pub fn from_raw(days: i64, miles: f64, receipts: f64) -> Result<Self, CaseError> {
        let days = u32::try_from(days).map_err(|_| CaseError::InvalidDays(days))?;
        Self::new(days, miles, receipts).map_err(|err| match err {
            CaseError::InvalidDays(_) => CaseError::InvalidDays(days as i64),
            other => other,
        })
    }

    /// Trip duration in days (always >= 1).
    #[inline]
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Miles traveled.
    #[inline]
    pub fn miles(&self) -> f64 {
        self.miles
    }

    /// Total submitted receipts.
    #[inline]
    pub fn receipts(&self) -> f64 {
        self.receipts
    }
}

fn check_amount(field: &'static str, value: f64) -> Result<(), CaseError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CaseError::InvalidAmount { field, value })
    }
}

/// A case with its known reimbursement, used for training and evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledCase {
    pub case: Case,
    pub expected: f64,
}

impl LabeledCase {
    /// Create a labeled case, rejecting non-finite labels.
    pub fn new(case: Case, expected: f64) -> Result<Self, CaseError> {
        if !expected.is_finite() {
            return Err(CaseError::InvalidLabel(expected));
        }
        Ok(Self { case, expected })
    }
}
