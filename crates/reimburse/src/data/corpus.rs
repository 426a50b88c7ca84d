//! Labeled corpus reading.
//!
//! The corpus is a JSON array of records:
//!
//! ```json
//! [
//!   {
//!     "input": {
//!       "trip_duration_days": 3,
//!       "miles_traveled": 93,
//!       "total_receipts_amount": 1.42
//!     },
//!     "expected_output": 364.51
//!   }
//! ]
//! ```
//!
//! Record order is preserved; subsets built from a corpus keep it.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::case::{Case, CaseError, LabeledCase};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while reading or writing a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to open corpus {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed corpus JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record {index}: {source}")]
    Record {
        index: usize,
        #[source]
        source: CaseError,
    },
}

// =============================================================================
// Wire records
// =============================================================================

/// Input block of a corpus record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseInputRecord {
    pub trip_duration_days: i64,
    pub miles_traveled: f64,
    pub total_receipts_amount: f64,
}

/// One labeled corpus record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub input: CaseInputRecord,
    pub expected_output: f64,
}

impl TryFrom<CaseRecord> for LabeledCase {
    type Error = CaseError;

    fn try_from(record: CaseRecord) -> Result<Self, Self::Error> {
        let case = Case::from_raw(
            record.input.trip_duration_days,
            record.input.miles_traveled,
            record.input.total_receipts_amount,
        )?;
        LabeledCase::new(case, record.expected_output)
    }
}

impl From<&LabeledCase> for CaseRecord {
    fn from(labeled: &LabeledCase) -> Self {
        Self {
            input: CaseInputRecord {
                trip_duration_days: labeled.case.days() as i64,
                miles_traveled: labeled.case.miles(),
                total_receipts_amount: labeled.case.receipts(),
            },
            expected_output: labeled.expected,
        }
    }
}

// =============================================================================
// Corpus
// =============================================================================

/// An ordered collection of labeled cases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    cases: Vec<LabeledCase>,
}

impl Corpus {
    /// Wrap already validated cases.
    pub fn from_cases(cases: Vec<LabeledCase>) -> Self {
        Self { cases }
    }

    /// Read a corpus from any JSON source.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CorpusError> {
        let records: Vec<CaseRecord> = serde_json::from_reader(reader)?;
        Self::from_records(records)
    }

    /// Read a corpus from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, CorpusError> {
        let records: Vec<CaseRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Read a corpus from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    fn from_records(records: Vec<CaseRecord>) -> Result<Self, CorpusError> {
        let cases = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                LabeledCase::try_from(record).map_err(|source| CorpusError::Record { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cases })
    }

    /// Write the corpus in its JSON record format.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), CorpusError> {
        let records: Vec<CaseRecord> = self.cases.iter().map(CaseRecord::from).collect();
        serde_json::to_writer_pretty(writer, &records)?;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    #[inline]
    pub fn cases(&self) -> &[LabeledCase] {
        &self.cases
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledCase> {
        self.cases.iter()
    }

    /// Inputs without labels, in corpus order.
    pub fn inputs(&self) -> Vec<Case> {
        self.cases.iter().map(|c| c.case).collect()
    }

    /// Labels in corpus order.
    pub fn targets(&self) -> Array1<f64> {
        self.cases.iter().map(|c| c.expected).collect()
    }

    /// The first `n` cases (or all, if fewer).
    pub fn head(&self, n: usize) -> Self {
        Self {
            cases: self.cases.iter().take(n).copied().collect(),
        }
    }
}

impl FromIterator<LabeledCase> for Corpus {
    fn from_iter<I: IntoIterator<Item = LabeledCase>>(iter: I) -> Self {
        Self {
            cases: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// CorpusSource
// =============================================================================

/// Where the model store gets its training corpus when artifacts are missing.
pub trait CorpusSource: Send + Sync {
    /// Produce the corpus. Called at most once per population attempt.
    fn load(&self) -> Result<Corpus, CorpusError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

impl CorpusSource for Corpus {
    fn load(&self) -> Result<Corpus, CorpusError> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory corpus ({} cases)", self.len())
    }
}

/// A corpus stored as a JSON file on disk, read on demand.
#[derive(Debug, Clone)]
pub struct JsonCorpusFile {
    path: PathBuf,
}

impl JsonCorpusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CorpusSource for JsonCorpusFile {
    fn load(&self) -> Result<Corpus, CorpusError> {
        Corpus::from_path(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
