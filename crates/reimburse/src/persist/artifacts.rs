//! Artifact directory: one file per ensemble member plus a manifest.
//!
//! ```text
//! <dir>/
//!   manifest.json
//!   main_0.model.json
//!   main_1.model.json
//!   outlier_0.model.json
//!   ...
//! ```
//!
//! The manifest is written last and removed first, so a directory with a
//! manifest always has every member it lists (unless files were removed by
//! hand, which [`ArtifactStore::load`] treats as "nothing persisted"). Member
//! files a save did not write are deleted before the manifest goes in.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::error::{ReadError, WriteError};
use super::native;
use super::schema::{MANIFEST_FORMAT_VERSION, ManifestSchema, SubsetEntrySchema, TrainedModelSchema};
use crate::config::ArtifactFormat;
use crate::error::{Error, Result, SchemaMismatchError};
use crate::features::FeatureSchema;
use crate::model::{Ensemble, ModelRegistry, TrainedModel};
use crate::routing::{RoutingParams, Subset};

/// File name of the directory index.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A directory holding persisted ensembles.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    format: ArtifactFormat,
}

impl ArtifactStore {
    /// `format` applies to writes; reads follow the manifest.
    pub fn new(dir: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Path of one member file in `format`.
    pub fn member_path(&self, subset: Subset, member: usize, format: ArtifactFormat) -> PathBuf {
        self.dir
            .join(format!("{}_{member}.{}", subset.as_str(), format.extension()))
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Persist every ensemble in `registry`, replacing what was there.
    ///
    /// Afterwards the directory's member files and manifest depend only on
    /// the registry contents.
    pub fn save(&self, registry: &ModelRegistry) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| self.write_error(&self.dir, e.into()))?;

        let manifest_path = self.manifest_path();
        match fs::remove_file(&manifest_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.write_error(&manifest_path, e.into())),
        }

        let mut written = BTreeSet::new();
        for ensemble in registry.ensembles() {
            for model in ensemble.members() {
                let path = self.member_path(model.subset(), model.member(), self.format);
                let bytes = self
                    .encode_member(model)
                    .map_err(|e| self.write_error(&path, e))?;
                write_atomic(&path, &bytes).map_err(|e| self.write_error(&path, e))?;
                if let Some(name) = path.file_name() {
                    written.insert(name.to_os_string());
                }
            }
        }
        self.remove_stale_members(&written)?;

        let manifest = self.manifest_for(registry);
        let mut bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| self.write_error(&manifest_path, e.into()))?;
        bytes.push(b'\n');
        write_atomic(&manifest_path, &bytes).map_err(|e| self.write_error(&manifest_path, e))?;

        tracing::debug!(
            dir = %self.dir.display(),
            subsets = registry.trained_subsets().len(),
            "saved model artifacts"
        );
        Ok(())
    }

    /// Delete member files (any format, including leftover temporaries) not in `keep`.
    fn remove_stale_members(&self, keep: &BTreeSet<OsString>) -> Result<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| self.write_error(&self.dir, e.into()))?;
        for entry in entries {
            let entry = entry.map_err(|e| self.write_error(&self.dir, e.into()))?;
            let name = entry.file_name();
            if !is_member_file(&name) || keep.contains(&name) {
                continue;
            }
            let path = entry.path();
            fs::remove_file(&path).map_err(|e| self.write_error(&path, e.into()))?;
            tracing::debug!(path = %path.display(), "removed stale member file");
        }
        Ok(())
    }

    fn encode_member(&self, model: &TrainedModel) -> std::result::Result<Vec<u8>, WriteError> {
        match self.format {
            ArtifactFormat::Json => {
                let mut buf = Vec::new();
                model.write_json(&mut buf)?;
                Ok(buf)
            }
            ArtifactFormat::Binary => model.to_binary(),
        }
    }

    fn manifest_for(&self, registry: &ModelRegistry) -> ManifestSchema {
        let subsets = registry
            .ensembles()
            .map(|ensemble| {
                let entry = SubsetEntrySchema {
                    seeds: ensemble.members().iter().map(|m| m.seed()).collect(),
                    n_samples: ensemble
                        .members()
                        .first()
                        .map_or(0, |m| m.n_samples() as u64),
                    train_mse: ensemble.train_mse(),
                };
                (ensemble.subset().as_str().to_string(), entry)
            })
            .collect();
        let unavailable = registry
            .unavailable()
            .iter()
            .map(|(subset, reason)| (subset.as_str().to_string(), reason.clone()))
            .collect();

        ManifestSchema {
            format_version: MANIFEST_FORMAT_VERSION,
            schema_fingerprint: registry.schema().fingerprint(),
            feature_names: registry.schema().names().to_vec(),
            artifact_format: self.format.into(),
            routing: registry.routing_params().into(),
            features: registry.feature_params().into(),
            subsets,
            unavailable,
        }
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Read the manifest, if there is one.
    pub fn read_manifest(&self) -> Result<Option<ManifestSchema>> {
        let path = self.manifest_path();
        let Some(bytes) = read_optional(&path).map_err(|e| self.read_error(&path, e))? else {
            return Ok(None);
        };
        let manifest: ManifestSchema =
            serde_json::from_slice(&bytes).map_err(|e| self.read_error(&path, e.into()))?;
        if manifest.format_version > MANIFEST_FORMAT_VERSION {
            return Err(self.read_error(
                &path,
                ReadError::UnsupportedVersion {
                    found: manifest.format_version,
                    supported: MANIFEST_FORMAT_VERSION,
                },
            ));
        }
        Ok(Some(manifest))
    }

    /// Load a complete registry fit on `expected` features.
    ///
    /// Returns `Ok(None)` when nothing usable is persisted: no manifest, a
    /// listed member file is missing, or a primary subset is neither
    /// trained nor recorded unavailable. A schema difference is an error.
    pub fn load(&self, expected: &FeatureSchema) -> Result<Option<ModelRegistry>> {
        let Some(manifest) = self.read_manifest()? else {
            tracing::debug!(dir = %self.dir.display(), "no manifest");
            return Ok(None);
        };

        let found = FeatureSchema::from_names(manifest.feature_names.clone());
        check_schema(MANIFEST_FILE, expected, &found)?;

        let manifest_path = self.manifest_path();
        let format = ArtifactFormat::from(manifest.artifact_format);
        let routing = RoutingParams::try_from(manifest.routing)
            .map_err(|e| self.read_error(&manifest_path, e))?;
        let mut registry = ModelRegistry::new(expected.clone(), manifest.features.into(), routing);

        for (name, entry) in &manifest.subsets {
            let subset = parse_subset(name).map_err(|e| self.read_error(&manifest_path, e))?;
            if entry.seeds.is_empty() {
                return Err(self.read_error(
                    &manifest_path,
                    ReadError::Validation(format!("subset {name} lists no members")),
                ));
            }

            let mut members = Vec::with_capacity(entry.seeds.len());
            for (member, &seed) in entry.seeds.iter().enumerate() {
                let path = self.member_path(subset, member, format);
                let Some(model) = self.load_member(&path, format, expected)? else {
                    tracing::debug!(path = %path.display(), "listed member missing");
                    return Ok(None);
                };
                if model.subset() != subset || model.member() != member || model.seed() != seed {
                    return Err(self.read_error(
                        &path,
                        ReadError::Validation(format!(
                            "file holds {}[{}] seed {}, manifest lists {subset}[{member}] seed {seed}",
                            model.subset(),
                            model.member(),
                            model.seed()
                        )),
                    ));
                }
                members.push(model);
            }
            registry.insert(Ensemble::new(subset, members, entry.train_mse));
        }

        for (name, reason) in &manifest.unavailable {
            let subset = parse_subset(name).map_err(|e| self.read_error(&manifest_path, e))?;
            if !registry.contains(subset) {
                registry.mark_unavailable(subset, reason.clone());
            }
        }

        let incomplete = Subset::ALL.iter().any(|&s| {
            s.is_primary() && !registry.contains(s) && !registry.unavailable().contains_key(&s)
        });
        if incomplete {
            tracing::debug!(dir = %self.dir.display(), "manifest does not cover every primary subset");
            return Ok(None);
        }

        tracing::debug!(
            dir = %self.dir.display(),
            subsets = registry.trained_subsets().len(),
            "loaded model artifacts"
        );
        Ok(Some(registry))
    }

    fn load_member(
        &self,
        path: &Path,
        format: ArtifactFormat,
        expected: &FeatureSchema,
    ) -> Result<Option<TrainedModel>> {
        let Some(bytes) = read_optional(path).map_err(|e| self.read_error(path, e))? else {
            return Ok(None);
        };
        let schema: TrainedModelSchema = match format {
            ArtifactFormat::Json => serde_json::from_slice(&bytes).map_err(ReadError::from),
            ArtifactFormat::Binary => native::decode(&bytes).map_err(ReadError::from),
        }
        .map_err(|e| self.read_error(path, e))?;

        let found = FeatureSchema::from_names(schema.feature_names.clone());
        let artifact = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        check_schema(&artifact, expected, &found)?;

        let model = TrainedModel::try_from(schema).map_err(|e| self.read_error(path, e))?;
        Ok(Some(model))
    }

    fn read_error(&self, path: &Path, source: ReadError) -> Error {
        Error::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_error(&self, path: &Path, source: WriteError) -> Error {
        Error::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check_schema(
    artifact: &str,
    expected: &FeatureSchema,
    found: &FeatureSchema,
) -> std::result::Result<(), SchemaMismatchError> {
    if expected == found {
        return Ok(());
    }
    Err(SchemaMismatchError {
        artifact: artifact.to_string(),
        expected: expected.fingerprint(),
        found: found.fingerprint(),
        first_difference: expected.first_difference(found),
    })
}

fn parse_subset(name: &str) -> std::result::Result<Subset, ReadError> {
    Subset::parse(name).ok_or_else(|| ReadError::Validation(format!("unknown subset {name:?}")))
}

/// `<subset>_<member>.model.<ext>`, or the temporary a write left behind.
fn is_member_file(name: &OsString) -> bool {
    name.to_str().is_some_and(|n| n.contains(".model."))
}

fn read_optional(path: &Path) -> std::result::Result<Option<Vec<u8>>, ReadError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::result::Result<(), WriteError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureParams;
    use crate::repr::Tree;
    use crate::training::TreeParams;

    fn member(subset: Subset, member: usize, seed: u64, value: f64) -> TrainedModel {
        TrainedModel::new(
            subset,
            member,
            seed,
            FeatureSchema::current(),
            TreeParams::default(),
            30,
            Tree::constant(value),
        )
    }

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new(
            FeatureSchema::current(),
            FeatureParams::default(),
            RoutingParams::default(),
        );
        registry.insert(Ensemble::new(
            Subset::Main,
            vec![member(Subset::Main, 0, 42, 500.0), member(Subset::Main, 1, 123, 520.0)],
            12.5,
        ));
        registry.insert(Ensemble::new(
            Subset::Outlier,
            vec![member(Subset::Outlier, 0, 42, 1700.0)],
            3.25,
        ));
        registry.mark_unavailable(Subset::Short, "4 cases, need 20");
        registry
    }

    #[test]
    fn empty_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), ArtifactFormat::Json);
        assert!(store.load(&FeatureSchema::current()).unwrap().is_none());
    }

    #[test]
    fn saved_registry_loads_back() {
        for format in [ArtifactFormat::Json, ArtifactFormat::Binary] {
            let dir = tempfile::tempdir().unwrap();
            let store = ArtifactStore::new(dir.path(), format);
            store.save(&registry()).unwrap();

            let loaded = store.load(&FeatureSchema::current()).unwrap().unwrap();
            assert_eq!(loaded, registry());
            assert!(store.member_path(Subset::Main, 1, format).exists());
        }
    }

    #[test]
    fn missing_member_means_nothing_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), ArtifactFormat::Json);
        store.save(&registry()).unwrap();
        fs::remove_file(store.member_path(Subset::Outlier, 0, ArtifactFormat::Json)).unwrap();

        assert!(store.load(&FeatureSchema::current()).unwrap().is_none());
    }

    #[test]
    fn manifest_lists_trained_and_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), ArtifactFormat::Json);
        store.save(&registry()).unwrap();

        let manifest = store.read_manifest().unwrap().unwrap();
        assert_eq!(manifest.subsets["main"].seeds, vec![42, 123]);
        assert_eq!(manifest.subsets["outlier"].train_mse, 3.25);
        assert_eq!(manifest.unavailable["short"], "4 cases, need 20");
        assert!(!manifest.subsets.contains_key("long"));
    }

    #[test]
    fn save_removes_members_it_did_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let json = ArtifactStore::new(dir.path(), ArtifactFormat::Json);
        json.save(&registry()).unwrap();
        fs::write(json.member_path(Subset::Main, 7, ArtifactFormat::Json), b"{}").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let binary = ArtifactStore::new(dir.path(), ArtifactFormat::Binary);
        let mut smaller = registry();
        smaller.insert(Ensemble::new(
            Subset::Main,
            vec![member(Subset::Main, 0, 42, 500.0)],
            12.5,
        ));
        binary.save(&smaller).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![
            "main_0.model.bin",
            "manifest.json",
            "notes.txt",
            "outlier_0.model.bin",
        ]);
        assert_eq!(binary.load(&FeatureSchema::current()).unwrap().unwrap(), smaller);
    }

    #[test]
    fn manifest_records_routing_constants() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), ArtifactFormat::Json);
        let routing = RoutingParams {
            outlier_threshold: 900.0,
            short_trip_max_days: 3,
            long_trip_min_days: 10,
        };
        let mut registry =
            ModelRegistry::new(FeatureSchema::current(), FeatureParams::default(), routing);
        registry.insert(Ensemble::new(
            Subset::Main,
            vec![member(Subset::Main, 0, 42, 500.0)],
            1.0,
        ));
        registry.mark_unavailable(Subset::Outlier, "0 cases, need 2");
        store.save(&registry).unwrap();

        let loaded = store.load(&FeatureSchema::current()).unwrap().unwrap();
        assert_eq!(loaded.routing_params(), &routing);
    }

    #[test]
    fn different_schema_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), ArtifactFormat::Json);
        store.save(&registry()).unwrap();

        let mut names = FeatureSchema::current().names().to_vec();
        names.swap(3, 4);
        let err = store.load(&FeatureSchema::from_names(names)).unwrap_err();
        match err {
            Error::SchemaMismatch(e) => {
                assert_eq!(e.artifact, MANIFEST_FILE);
                assert_eq!(e.first_difference, Some(3));
            }
            other => panic!("expected schema mismatch, got {other}"),
        }
    }
}
