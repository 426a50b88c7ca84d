//! Process-wide model cache with single-flight population.
//!
//! The first caller that finds the store empty takes the population lock,
//! loads persisted artifacts (or trains and persists them) and publishes
//! the registry. Concurrent callers block on the same lock and see the
//! published registry once it is released. Reads after publication are a
//! single atomic load.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::PipelineConfig;
use crate::data::CorpusSource;
use crate::error::{Result, UnavailableModelError};
use crate::model::{Ensemble, ModelRegistry};
use crate::persist::ArtifactStore;
use crate::routing::Subset;
use crate::training::train_registry;

/// How often the store has been populated, and from where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Training runs started by the store.
    pub trainings: usize,
    /// Registries read back from artifacts.
    pub loads: usize,
    pub populated: bool,
}

/// Lazily populated cache of every subset's ensemble.
pub struct ModelStore {
    config: PipelineConfig,
    artifacts: Option<ArtifactStore>,
    source: Option<Arc<dyn CorpusSource>>,
    cell: OnceLock<Arc<ModelRegistry>>,
    populate_lock: Mutex<()>,
    trainings: AtomicUsize,
    loads: AtomicUsize,
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("artifacts", &self.artifacts.as_ref().map(|a| a.dir()))
            .field("source", &self.source.as_ref().map(|s| s.describe()))
            .field("populated", &self.cell.get().is_some())
            .finish_non_exhaustive()
    }
}

impl ModelStore {
    /// Load from `artifacts`, training on `source` when they are missing.
    pub fn new(
        config: PipelineConfig,
        artifacts: ArtifactStore,
        source: impl CorpusSource + 'static,
    ) -> Self {
        let source: Arc<dyn CorpusSource> = Arc::new(source);
        Self::with_parts(config, Some(artifacts), Some(source))
    }

    /// Train on `source` at first access; nothing is persisted.
    pub fn in_memory(config: PipelineConfig, source: impl CorpusSource + 'static) -> Self {
        let source: Arc<dyn CorpusSource> = Arc::new(source);
        Self::with_parts(config, None, Some(source))
    }

    /// A store that already holds `registry`.
    pub fn preloaded(config: PipelineConfig, registry: ModelRegistry) -> Self {
        let store = Self::with_parts(config, None, None);
        let _ = store.cell.set(Arc::new(registry));
        store
    }

    fn with_parts(
        config: PipelineConfig,
        artifacts: Option<ArtifactStore>,
        source: Option<Arc<dyn CorpusSource>>,
    ) -> Self {
        Self {
            config,
            artifacts,
            source,
            cell: OnceLock::new(),
            populate_lock: Mutex::new(()),
            trainings: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn artifacts(&self) -> Option<&ArtifactStore> {
        self.artifacts.as_ref()
    }

    /// The registry, populating it first if needed.
    ///
    /// A failed population is not remembered; the next call tries again.
    pub fn registry(&self) -> Result<Arc<ModelRegistry>> {
        if let Some(registry) = self.cell.get() {
            return Ok(Arc::clone(registry));
        }

        let _guard = self.populate_lock.lock();
        if let Some(registry) = self.cell.get() {
            return Ok(Arc::clone(registry));
        }

        let registry = Arc::new(self.populate()?);
        Ok(Arc::clone(self.cell.get_or_init(|| registry)))
    }

    /// The ensemble for `subset`.
    pub fn get(&self, subset: Subset) -> Result<Arc<Ensemble>> {
        let registry = self.registry()?;
        Ok(Arc::clone(registry.require(subset)?))
    }

    /// The registry if already populated. Never blocks.
    pub fn peek(&self) -> std::result::Result<Arc<ModelRegistry>, UnavailableModelError> {
        self.cell
            .get()
            .map(Arc::clone)
            .ok_or_else(|| UnavailableModelError::store("models are not loaded yet"))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            trainings: self.trainings.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            populated: self.cell.get().is_some(),
        }
    }

    // =========================================================================
    // Population
    // =========================================================================

    fn populate(&self) -> Result<ModelRegistry> {
        self.config.validate()?;
        let schema = self.config.transformer().schema();

        if let Some(artifacts) = &self.artifacts
            && let Some(registry) = artifacts.load(&schema)?
        {
            self.loads.fetch_add(1, Ordering::Relaxed);
            self.warn_on_drift(&registry);
            tracing::info!(dir = %artifacts.dir().display(), "loaded persisted models");
            return Ok(registry);
        }

        let Some(source) = &self.source else {
            return Err(
                UnavailableModelError::store("no persisted models and no training corpus").into(),
            );
        };

        self.trainings.fetch_add(1, Ordering::Relaxed);
        tracing::info!(source = %source.describe(), "training models");
        let corpus = source.load()?;
        let registry = train_registry(&corpus, &self.config)?;

        if let Some(artifacts) = &self.artifacts {
            artifacts.save(&registry)?;
        }
        Ok(registry)
    }

    /// Serving follows the registry's constants; a differing config only warns.
    fn warn_on_drift(&self, registry: &ModelRegistry) {
        let configured = self.config.routing_params();
        if registry.routing_params() != &configured {
            tracing::warn!(
                persisted = ?registry.routing_params(),
                configured = ?configured,
                "persisted models were trained with different routing constants, serving with the persisted ones"
            );
        }
        if registry.feature_params() != &self.config.features {
            tracing::warn!(
                persisted = ?registry.feature_params(),
                configured = ?self.config.features,
                "persisted models were trained with different feature constants, serving with the persisted ones"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Corpus;
    use crate::error::Error;
    use crate::testing::synthetic_corpus;

    fn config() -> PipelineConfig {
        PipelineConfig::builder()
            .ensemble_seeds(vec![1, 2])
            .n_threads(1)
            .build()
            .unwrap()
    }

    #[test]
    fn peek_before_population() {
        let store = ModelStore::in_memory(config(), synthetic_corpus(60, 7));
        let err = store.peek().unwrap_err();
        assert_eq!(err.subset, None);
        assert!(!store.stats().populated);
    }

    #[test]
    fn nothing_to_load_or_train_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path(), config().artifact_format);
        let store = ModelStore::with_parts(config(), Some(artifacts), None);

        match store.registry() {
            Err(Error::UnavailableModel(err)) => assert_eq!(err.subset, None),
            other => panic!("expected unavailable model, got {other:?}"),
        }
        assert_eq!(store.stats().trainings, 0);
    }

    #[test]
    fn trains_once_then_caches() {
        let store = ModelStore::in_memory(config(), synthetic_corpus(120, 7));
        let first = store.registry().unwrap();
        let second = store.registry().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.stats().trainings, 1);
        assert!(store.peek().is_ok());
        assert!(store.get(Subset::Main).is_ok());
    }

    #[test]
    fn failed_population_is_retried() {
        let store = ModelStore::in_memory(config(), Corpus::default());
        assert!(store.registry().is_err());
        assert!(store.registry().is_err());
        assert_eq!(store.stats().trainings, 2);
        assert!(!store.stats().populated);
    }

    #[test]
    fn preloaded_never_trains() {
        let registry = train_registry(&synthetic_corpus(80, 3), &config()).unwrap();
        let store = ModelStore::preloaded(config(), registry);
        assert!(store.peek().is_ok());
        store.registry().unwrap();
        assert_eq!(store.stats(), StoreStats {
            trainings: 0,
            loads: 0,
            populated: true,
        });
    }
}
