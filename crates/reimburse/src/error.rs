//! Crate-level error taxonomy.
//!
//! Each layer has its own error type; [`Error`] wraps them for the public
//! entry points.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::data::{CaseError, CorpusError};
use crate::features::SchemaFingerprint;
use crate::persist::{ReadError, WriteError};
use crate::routing::Subset;
use crate::training::TrainingError;

/// A persisted model was fit on a different feature schema.
///
/// Always fatal: the model's column indices would address the wrong features.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{artifact} was fit on feature schema {found}, current schema is {expected}{}",
    difference_note(.first_difference)
)]
pub struct SchemaMismatchError {
    pub artifact: String,
    pub expected: SchemaFingerprint,
    pub found: SchemaFingerprint,
    pub first_difference: Option<usize>,
}

fn difference_note(first_difference: &Option<usize>) -> String {
    first_difference
        .map(|i| format!(" (first difference at column {i})"))
        .unwrap_or_default()
}

/// No model to estimate with: a case was routed to a subset without a
/// trained ensemble, or the store holds no models at all.
///
/// Callers may fall back to [`crate::serving::fallback_estimate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no model available{}: {reason}", subset_note(.subset))]
pub struct UnavailableModelError {
    /// `None` when no subset was asked for.
    pub subset: Option<Subset>,
    pub reason: String,
}

impl UnavailableModelError {
    pub fn for_subset(subset: Subset, reason: impl Into<String>) -> Self {
        Self {
            subset: Some(subset),
            reason: reason.into(),
        }
    }

    /// The store as a whole has nothing loaded.
    pub fn store(reason: impl Into<String>) -> Self {
        Self {
            subset: None,
            reason: reason.into(),
        }
    }
}

fn subset_note(subset: &Option<Subset>) -> String {
    subset
        .map(|s| format!(" for subset {s}"))
        .unwrap_or_default()
}

/// Errors returned by the public entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidCase(#[from] CaseError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatchError),

    #[error(transparent)]
    UnavailableModel(#[from] UnavailableModelError),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReadError,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },
}

impl Error {
    /// Whether the estimate could be served by the documented fallback.
    pub fn is_unavailable_model(&self) -> bool {
        matches!(self, Error::UnavailableModel(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_message() {
        let err = SchemaMismatchError {
            artifact: "main_0.model.json".into(),
            expected: SchemaFingerprint(1),
            found: SchemaFingerprint(2),
            first_difference: Some(4),
        };
        assert_eq!(
            err.to_string(),
            "main_0.model.json was fit on feature schema 00000002, current schema is 00000001 \
             (first difference at column 4)"
        );
    }

    #[test]
    fn unavailable_is_detectable() {
        let err: Error = UnavailableModelError::for_subset(Subset::Outlier, "too few cases").into();
        assert!(err.is_unavailable_model());
        assert_eq!(
            err.to_string(),
            "no model available for subset outlier: too few cases"
        );
    }

    #[test]
    fn store_level_unavailable_names_no_subset() {
        let err = UnavailableModelError::store("models are not loaded yet");
        assert_eq!(err.subset, None);
        assert_eq!(err.to_string(), "no model available: models are not loaded yet");
    }
}
