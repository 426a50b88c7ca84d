//! Input cases and the labeled corpus.

mod case;
mod corpus;

pub use case::{Case, CaseError, LabeledCase};
pub use corpus::{CaseInputRecord, CaseRecord, Corpus, CorpusError, CorpusSource, JsonCorpusFile};
