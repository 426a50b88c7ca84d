//! Subsets and the declarative routing table.
//!
//! The same [`RoutingTable`] decides which subset a labeled case trains in
//! and which ensembles an unlabeled case is estimated with, so training and
//! serving cannot disagree about subset membership.

use std::fmt;

use crate::config::ConfigError;
use crate::data::Case;

// =============================================================================
// Subset
// =============================================================================

/// A named partition of the input space with its own ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subset {
    /// Ordinary receipts.
    Main,
    /// Receipts above the outlier threshold.
    Outlier,
    /// Short trips.
    Short,
    /// Long trips.
    Long,
}

impl Subset {
    pub const ALL: [Subset; 4] = [Subset::Main, Subset::Outlier, Subset::Short, Subset::Long];

    pub fn as_str(self) -> &'static str {
        match self {
            Subset::Main => "main",
            Subset::Outlier => "outlier",
            Subset::Short => "short",
            Subset::Long => "long",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Primary subsets partition the whole input space.
    pub fn is_primary(self) -> bool {
        matches!(self, Subset::Main | Subset::Outlier)
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Condition on a case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    /// `receipts > threshold`
    ReceiptsAbove(f64),
    /// `days <= n`
    DaysAtMost(u32),
    /// `days >= n`
    DaysAtLeast(u32),
    Always,
}

impl Predicate {
    #[inline]
    pub fn matches(&self, case: &Case) -> bool {
        match *self {
            Predicate::ReceiptsAbove(threshold) => case.receipts() > threshold,
            Predicate::DaysAtMost(n) => case.days() <= n,
            Predicate::DaysAtLeast(n) => case.days() >= n,
            Predicate::Always => true,
        }
    }
}

/// `when` holds, route to `subset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub when: Predicate,
    pub subset: Subset,
}

impl Rule {
    pub fn new(when: Predicate, subset: Subset) -> Self {
        Self { when, subset }
    }
}

// =============================================================================
// RoutingParams
// =============================================================================

/// Constants of the standard routing table.
///
/// Recorded with every trained registry; serving routes with the values the
/// ensembles were trained under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingParams {
    /// Receipts strictly above this go to the outlier subset.
    pub outlier_threshold: f64,
    pub short_trip_max_days: u32,
    pub long_trip_min_days: u32,
}

impl Default for RoutingParams {
    fn default() -> Self {
        Self {
            outlier_threshold: 1400.0,
            short_trip_max_days: 2,
            long_trip_min_days: 8,
        }
    }
}

impl RoutingParams {
    pub fn table(&self) -> RoutingTable {
        RoutingTable::standard(
            self.outlier_threshold,
            self.short_trip_max_days,
            self.long_trip_min_days,
        )
    }
}

// =============================================================================
// RoutingTable
// =============================================================================

/// Ordered primary and specialist rules; first match wins in each list.
///
/// Primary rules must be total (the last one is [`Predicate::Always`]) and
/// may only name primary subsets. Specialist rules name non-primary subsets;
/// a case matches at most one of them.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    primary: Vec<Rule>,
    specialists: Vec<Rule>,
}

impl RoutingTable {
    pub fn new(primary: Vec<Rule>, specialists: Vec<Rule>) -> Result<Self, ConfigError> {
        match primary.last() {
            Some(rule) if rule.when == Predicate::Always => {}
            _ => {
                return Err(ConfigError::InvalidRoutingTable(
                    "primary rules must end with an unconditional rule".into(),
                ));
            }
        }
        if let Some(rule) = primary.iter().find(|r| !r.subset.is_primary()) {
            return Err(ConfigError::InvalidRoutingTable(format!(
                "{} cannot be a primary subset",
                rule.subset
            )));
        }
        if let Some(rule) = specialists.iter().find(|r| r.subset.is_primary()) {
            return Err(ConfigError::InvalidRoutingTable(format!(
                "{} cannot be a specialist subset",
                rule.subset
            )));
        }
        Ok(Self {
            primary,
            specialists,
        })
    }

    /// Outlier split on receipts, short/long specialists on duration.
    pub fn standard(outlier_threshold: f64, short_max_days: u32, long_min_days: u32) -> Self {
        Self {
            primary: vec![
                Rule::new(Predicate::ReceiptsAbove(outlier_threshold), Subset::Outlier),
                Rule::new(Predicate::Always, Subset::Main),
            ],
            specialists: vec![
                Rule::new(Predicate::DaysAtMost(short_max_days), Subset::Short),
                Rule::new(Predicate::DaysAtLeast(long_min_days), Subset::Long),
            ],
        }
    }

    /// The primary subset of a case.
    pub fn primary_subset(&self, case: &Case) -> Subset {
        self.primary
            .iter()
            .find(|r| r.when.matches(case))
            .map_or(Subset::Main, |r| r.subset)
    }

    /// The specialist subset of a case, if any rule applies.
    pub fn specialist_subset(&self, case: &Case) -> Option<Subset> {
        self.specialists
            .iter()
            .find(|r| r.when.matches(case))
            .map(|r| r.subset)
    }

    /// Primary subsets named by the table, in rule order, deduplicated.
    pub fn primary_subsets(&self) -> Vec<Subset> {
        unique_subsets(&self.primary)
    }

    /// Specialist subsets named by the table, in rule order, deduplicated.
    pub fn specialist_subsets(&self) -> Vec<Subset> {
        unique_subsets(&self.specialists)
    }
}

fn unique_subsets(rules: &[Rule]) -> Vec<Subset> {
    let mut out = Vec::with_capacity(rules.len());
    for rule in rules {
        if !out.contains(&rule.subset) {
            out.push(rule.subset);
        }
    }
    out
}
