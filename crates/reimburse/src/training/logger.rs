//! Verbosity-gated training logs.
//!
//! Events go through `tracing`; [`Verbosity`] decides which of them are
//! emitted at all, independent of any subscriber filter.

use std::time::Instant;

use crate::routing::Subset;

/// How much training output to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// No output.
    #[default]
    Silent,
    /// Skipped and failed subsets only.
    Warning,
    /// Per-subset progress.
    Info,
    /// Per-tree detail.
    Debug,
}

/// Structured logger for one training run.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    started: Instant,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            started: Instant::now(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    pub fn start_training(&mut self, n_cases: usize, n_seeds: usize) {
        self.started = Instant::now();
        if self.enabled(Verbosity::Info) {
            tracing::info!(n_cases, n_seeds, "training subset ensembles");
        }
    }

    pub fn log_partition(&self, subset: Subset, n_samples: usize) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(subset = %subset, n_samples, "partitioned");
        }
    }

    pub fn log_skipped(&self, subset: Subset, n_samples: usize, min_samples: usize) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(
                subset = %subset,
                n_samples,
                min_samples,
                "specialist skipped, too few cases"
            );
        }
    }

    pub fn log_member(&self, subset: Subset, member: usize, seed: u64, n_nodes: usize, depth: usize) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(subset = %subset, member, seed, n_nodes, depth, "tree grown");
        }
    }

    pub fn log_ensemble(&self, subset: Subset, n_members: usize, train_mse: f64) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(subset = %subset, n_members, train_mse, "ensemble trained");
        }
    }

    pub fn log_failure(&self, subset: Subset, error: &dyn std::error::Error) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(subset = %subset, error = %error, "subset training failed");
        }
    }

    pub fn finish_training(&self, n_trained: usize, n_unavailable: usize) {
        if self.enabled(Verbosity::Info) {
            let elapsed_ms = self.started.elapsed().as_millis() as u64;
            tracing::info!(n_trained, n_unavailable, elapsed_ms, "training finished");
        }
    }
}
