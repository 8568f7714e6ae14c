//! Versioned on-disk store of (model, metadata) artifacts.
//!
//! Layout under the store root:
//! - `<version>.model.json`: the kind-tagged [`StoredModel`].
//! - `<version>.meta.json`: the [`ModelMetadata`] it was published with.
//!
//! Both files are published through [`crate::atomic_file::write_new`],
//! metadata first. The model file is the unit of visibility: a version is
//! listed only once its model file exists, and by then its metadata is
//! already complete. Existing versions are never rewritten.

mod metadata;
mod version;

pub use metadata::{LoadedArtifact, ModelMetadata};
pub use version::{check_version, generate_version};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::atomic_file;
use crate::ml::StoredModel;

const MODEL_SUFFIX: &str = ".model.json";
const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no model artifact {requested} in {}", root.display())]
    NotFound { requested: String, root: PathBuf },
    #[error("artifact {version} has unusable metadata: {reason}")]
    SchemaMismatch { version: String, reason: String },
    #[error("artifact {version} already exists")]
    AlreadyExists { version: String },
    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// File-backed artifact store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self, version: &str) -> PathBuf {
        self.root.join(format!("{version}{MODEL_SUFFIX}"))
    }

    pub fn metadata_path(&self, version: &str) -> PathBuf {
        self.root.join(format!("{version}{META_SUFFIX}"))
    }

    /// Publish a new artifact under `metadata.version`.
    ///
    /// Creates the root if needed. Fails with [`RegistryError::AlreadyExists`]
    /// when either file for the version is already present.
    pub fn save(
        &self,
        model: &StoredModel,
        metadata: &ModelMetadata,
    ) -> Result<PathBuf, RegistryError> {
        let version = metadata.version.as_str();
        check_version(version).map_err(|reason| RegistryError::InvalidVersion {
            version: version.to_string(),
            reason,
        })?;
        metadata
            .validate_against(model)
            .map_err(|reason| RegistryError::SchemaMismatch {
                version: version.to_string(),
                reason,
            })?;
        std::fs::create_dir_all(&self.root).map_err(|source| RegistryError::Io {
            path: self.root.clone(),
            source,
        })?;

        let model_path = self.model_path(version);
        let meta_path = self.metadata_path(version);
        if model_path.exists() || meta_path.exists() {
            return Err(RegistryError::AlreadyExists {
                version: version.to_string(),
            });
        }

        let meta_json = to_json(metadata, &meta_path)?;
        let model_json = to_json(model, &model_path)?;
        let publish_error = |path: &Path, source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                RegistryError::AlreadyExists {
                    version: version.to_string(),
                }
            } else {
                RegistryError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        };
        // Both files are no-clobber, so a concurrent save of the same
        // version loses here instead of replacing the winner's files.
        atomic_file::write_new(&meta_path, &meta_json)
            .map_err(|source| publish_error(&meta_path, source))?;
        if let Err(source) = atomic_file::write_new(&model_path, &model_json) {
            // Orphaned metadata is invisible to listing but would block a retry.
            let _ = std::fs::remove_file(&meta_path);
            return Err(publish_error(&model_path, source));
        }
        info!(
            "Published model {version} ({} features) to {}",
            metadata.feature_order.len(),
            self.root.display()
        );
        Ok(model_path)
    }

    /// Load an exact version, or the greatest version when `None`.
    pub fn load(&self, version: Option<&str>) -> Result<LoadedArtifact, RegistryError> {
        let version = match version {
            Some(version) => {
                check_version(version).map_err(|reason| RegistryError::InvalidVersion {
                    version: version.to_string(),
                    reason,
                })?;
                version.to_string()
            }
            None => self.latest_version()?.ok_or_else(|| RegistryError::NotFound {
                requested: "latest".to_string(),
                root: self.root.clone(),
            })?,
        };

        let model_path = self.model_path(&version);
        let model_text = match std::fs::read_to_string(&model_path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound {
                    requested: version,
                    root: self.root.clone(),
                });
            }
            Err(source) => {
                return Err(RegistryError::Io {
                    path: model_path,
                    source,
                });
            }
        };
        let metadata = self.load_metadata(&version)?;
        let model: StoredModel =
            serde_json::from_str(&model_text).map_err(|source| RegistryError::Json {
                path: model_path.clone(),
                source,
            })?;
        metadata
            .validate_against(&model)
            .map_err(|reason| RegistryError::SchemaMismatch {
                version: version.clone(),
                reason,
            })?;
        info!(
            "Loaded model {version} ({:?}, {} features)",
            model.kind(),
            metadata.feature_order.len()
        );
        Ok(LoadedArtifact { model, metadata })
    }

    /// Read and validate the metadata of one version.
    ///
    /// An absent or malformed metadata file is a schema mismatch, never a
    /// silent default.
    pub fn load_metadata(&self, version: &str) -> Result<ModelMetadata, RegistryError> {
        let meta_path = self.metadata_path(version);
        let mismatch = |reason: String| RegistryError::SchemaMismatch {
            version: version.to_string(),
            reason,
        };
        let text = match std::fs::read_to_string(&meta_path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if !self.model_path(version).exists() {
                    return Err(RegistryError::NotFound {
                        requested: version.to_string(),
                        root: self.root.clone(),
                    });
                }
                return Err(mismatch(format!("missing {}", meta_path.display())));
            }
            Err(source) => {
                return Err(RegistryError::Io {
                    path: meta_path,
                    source,
                });
            }
        };
        let metadata: ModelMetadata = serde_json::from_str(&text)
            .map_err(|err| mismatch(format!("malformed {}: {err}", meta_path.display())))?;
        if metadata.version != version {
            return Err(mismatch(format!(
                "metadata records version {}",
                metadata.version
            )));
        }
        metadata.validate().map_err(mismatch)?;
        Ok(metadata)
    }

    /// Published versions in ascending order. A missing root is an empty store.
    pub fn list_versions(&self) -> Result<Vec<String>, RegistryError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| RegistryError::Io {
                path: self.root.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if atomic_file::is_temp_name(name) {
                debug!("Skipping in-flight file {name}");
                continue;
            }
            if let Some(version) = name.strip_suffix(MODEL_SUFFIX) {
                if check_version(version).is_ok() {
                    versions.push(version.to_string());
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    pub fn latest_version(&self) -> Result<Option<String>, RegistryError> {
        Ok(self.list_versions()?.pop())
    }
}

fn to_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<Vec<u8>, RegistryError> {
    serde_json::to_vec_pretty(value).map_err(|source| RegistryError::Json {
        path: path.to_path_buf(),
        source,
    })
}
