//! Model persistence
//!
//! A model is stored as one JSON document:
//!
//! ```json
//! { "format": "spamguard-model", "version": 1, "dimension": 412,
//!   "checksum": "<sha256 of the model body>", "model": { ... } }
//! ```
//!
//! The featurizer and classifier live in the same body, so they can never be
//! saved or loaded out of step. Saving writes a sibling temp file and renames
//! it over the target, so readers see either the old artifact or the new one.

use crate::model::TrainedModel;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spamguard_core::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Format tag written into every artifact
pub const ARTIFACT_FORMAT: &str = "spamguard-model";

/// Current artifact version
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    dimension: usize,
    checksum: String,
    model: serde_json::Value,
}

/// Saves and loads [`TrainedModel`] artifacts
pub struct ModelStore;

impl ModelStore {
    /// Persist a model atomically
    pub fn save(model: &TrainedModel, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_value(model)?;
        let envelope = Envelope {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            dimension: model.dimension(),
            checksum: checksum(&body)?,
            model: body,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        write_atomically(path, &bytes)?;
        info!(
            "Saved model {} ({} features) to '{}'",
            model.id(),
            model.dimension(),
            path.display()
        );
        Ok(())
    }

    /// Load and verify a model
    pub fn load(path: impl AsRef<Path>) -> Result<TrainedModel> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let model = Self::from_slice(&bytes)?;
        info!(
            "Loaded model {} ({} features) from '{}'",
            model.id(),
            model.dimension(),
            path.display()
        );
        Ok(model)
    }

    /// Decode and verify an artifact held in memory
    pub fn from_slice(bytes: &[u8]) -> Result<TrainedModel> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupt(format!("not a model artifact: {}", e)))?;

        if envelope.format != ARTIFACT_FORMAT {
            return Err(Error::corrupt(format!(
                "unexpected artifact format '{}'",
                envelope.format
            )));
        }
        if envelope.version != ARTIFACT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported artifact version {} (expected {})",
                envelope.version, ARTIFACT_VERSION
            )));
        }

        let actual = checksum(&envelope.model)?;
        if actual != envelope.checksum {
            return Err(Error::corrupt("checksum mismatch"));
        }

        let model: TrainedModel = serde_json::from_value(envelope.model)
            .map_err(|e| Error::corrupt(format!("invalid model body: {}", e)))?;

        if model.dimension() != envelope.dimension {
            return Err(Error::corrupt(format!(
                "artifact declares {} features but the model has {}",
                envelope.dimension,
                model.dimension()
            )));
        }
        model.validate()?;

        debug!("Verified artifact for model {}", model.id());
        Ok(model)
    }
}

fn checksum(body: &serde_json::Value) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(body)?);
    Ok(format!("{:x}", hasher.finalize()))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    path.with_file_name(format!(
        ".{}.tmp-{}-{}",
        name,
        std::process::id(),
        Uuid::new_v4().simple()
    ))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_write(parent, e))?;
    }

    let temp = temp_path(path);
    let written = std::fs::File::create(&temp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(Error::io_write(path, e));
    }

    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        Error::io_write(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::trainer::Trainer;
    use spamguard_core::LabeledExample;

    fn model() -> TrainedModel {
        let dataset = Dataset::from_examples(vec![
            LabeledExample::spam("cheap pills online"),
            LabeledExample::ham("are we still on for lunch"),
            LabeledExample::spam("you have won a prize"),
            LabeledExample::ham("draft attached for review"),
        ]);
        Trainer::default().fit(&dataset).unwrap()
    }

    fn rewrite(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        edit(&mut doc);
        std::fs::write(path, serde_json::to_vec(&doc).unwrap()).unwrap();
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let original = model();

        ModelStore::save(&original, &path).unwrap();
        let loaded = ModelStore::load(&path).unwrap();

        assert_eq!(loaded, original);
        for probe in ["win a prize", "lunch at noon", "", "🙂 zzz"] {
            assert_eq!(loaded.probability(probe), original.probability(probe));
        }
    }

    #[test]
    fn test_save_overwrites_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        ModelStore::save(&model(), &path).unwrap();
        let second = model();
        ModelStore::save(&second, &path).unwrap();

        assert_eq!(ModelStore::load(&path).unwrap().id(), second.id());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_temp_names_are_unique_per_save() {
        let path = Path::new("/models/model.json");
        assert_ne!(temp_path(path), temp_path(path));
    }

    #[test]
    fn test_concurrent_saves_to_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let models: Vec<TrainedModel> = (0..4).map(|_| model()).collect();

        std::thread::scope(|scope| {
            for model in &models {
                let path = &path;
                scope.spawn(move || {
                    for _ in 0..10 {
                        ModelStore::save(model, path).unwrap();
                    }
                });
            }
        });

        let loaded = ModelStore::load(&path).unwrap();
        assert!(models.iter().any(|m| m.id() == loaded.id()));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = ModelStore::save(&model(), blocker.join("model.json")).unwrap_err();
        assert!(matches!(err, Error::IoWrite { .. }), "{:?}", err);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelStore::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_declared_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        ModelStore::save(&model(), &path).unwrap();

        rewrite(&path, |doc| {
            let dimension = doc["dimension"].as_u64().unwrap();
            doc["dimension"] = serde_json::json!(dimension + 1);
        });

        let err = ModelStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::ModelCorrupt(_)), "{:?}", err);
    }

    #[test]
    fn test_truncated_weights_with_valid_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        ModelStore::save(&model(), &path).unwrap();

        rewrite(&path, |doc| {
            doc["model"]["classifier"]["weights"]
                .as_array_mut()
                .unwrap()
                .pop();
            doc["checksum"] = serde_json::json!(checksum(&doc["model"]).unwrap());
        });

        let err = ModelStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::ModelCorrupt(_)), "{:?}", err);
    }

    #[test]
    fn test_tampered_body_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        ModelStore::save(&model(), &path).unwrap();

        rewrite(&path, |doc| {
            doc["model"]["classifier"]["bias"] = serde_json::json!(42.0);
        });

        let err = ModelStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("checksum"), "{}", err);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(
            ModelStore::from_slice(b"\x00\x01 not json"),
            Err(Error::ModelCorrupt(_))
        ));
    }
}
