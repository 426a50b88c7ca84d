//! Splitting the labeled corpus into per-subset training sets.

use std::collections::BTreeMap;

use crate::data::LabeledCase;
use crate::routing::{RoutingTable, Subset};

/// A specialist left untrained because too few cases matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedSubset {
    pub subset: Subset,
    pub n_samples: usize,
    pub min_samples: usize,
}

impl SkippedSubset {
    pub fn reason(&self) -> String {
        format!(
            "{} matching cases, at least {} required",
            self.n_samples, self.min_samples
        )
    }
}

/// Per-subset cases in corpus order.
///
/// Every primary subset named by the routing table has an entry (possibly
/// empty); specialists appear only when they reach the minimum size.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    subsets: BTreeMap<Subset, Vec<LabeledCase>>,
    skipped: Vec<SkippedSubset>,
}

impl Partition {
    pub fn get(&self, subset: Subset) -> Option<&[LabeledCase]> {
        self.subsets.get(&subset).map(Vec::as_slice)
    }

    pub fn subsets(&self) -> impl Iterator<Item = (Subset, &[LabeledCase])> {
        self.subsets.iter().map(|(s, cases)| (*s, cases.as_slice()))
    }

    pub fn skipped(&self) -> &[SkippedSubset] {
        &self.skipped
    }
}

/// Assigns labeled cases to subsets with the serving routing table.
#[derive(Debug, Clone)]
pub struct DatasetPartitioner<'a> {
    table: &'a RoutingTable,
    min_specialist_samples: usize,
}

impl<'a> DatasetPartitioner<'a> {
    pub fn new(table: &'a RoutingTable, min_specialist_samples: usize) -> Self {
        Self {
            table,
            min_specialist_samples,
        }
    }

    pub fn partition(&self, cases: &[LabeledCase]) -> Partition {
        let mut subsets: BTreeMap<Subset, Vec<LabeledCase>> = self
            .table
            .primary_subsets()
            .into_iter()
            .map(|s| (s, Vec::new()))
            .collect();
        let mut specialists: BTreeMap<Subset, Vec<LabeledCase>> = self
            .table
            .specialist_subsets()
            .into_iter()
            .map(|s| (s, Vec::new()))
            .collect();

        for labeled in cases {
            let primary = self.table.primary_subset(&labeled.case);
            subsets.entry(primary).or_default().push(*labeled);
            if let Some(specialist) = self.table.specialist_subset(&labeled.case) {
                specialists.entry(specialist).or_default().push(*labeled);
            }
        }

        let mut skipped = Vec::new();
        for (subset, members) in specialists {
            if members.len() >= self.min_specialist_samples {
                subsets.insert(subset, members);
            } else {
                skipped.push(SkippedSubset {
                    subset,
                    n_samples: members.len(),
                    min_samples: self.min_specialist_samples,
                });
            }
        }

        Partition { subsets, skipped }
    }
}
