//! Loading the two model artifacts: the regression model and its RMSE.
//!
//! Both are produced and versioned outside this system and are read-only
//! here. [`FileArtifactStore`] reads them from fixed paths and, by default,
//! keeps them for the lifetime of the process.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chargewise_core::ArtifactPaths;
use thiserror::Error;
use tracing::{debug, info};

use crate::linear::{LinearModel, RegressionModel};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed artifact {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl ArtifactError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Source of the model and its error estimate.
pub trait ArtifactStore: Send + Sync {
    fn load_model(&self) -> Result<Arc<dyn RegressionModel>, ArtifactError>;

    fn load_error_estimate(&self) -> Result<f64, ArtifactError>;
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
    fn load_model(&self) -> Result<Arc<dyn RegressionModel>, ArtifactError> {
        (**self).load_model()
    }

    fn load_error_estimate(&self) -> Result<f64, ArtifactError> {
        (**self).load_error_estimate()
    }
}

/// Artifact store backed by JSON files.
///
/// With caching on, the first successful load of each artifact is kept and
/// shared. Loads run under a lock, so concurrent first callers wait for a
/// single deserialization instead of racing. Failed loads are not cached; a
/// model dropped into place later is picked up by the next call.
pub struct FileArtifactStore {
    paths: ArtifactPaths,
    cache: bool,
    model: Mutex<Option<Arc<dyn RegressionModel>>>,
    error_estimate: Mutex<Option<f64>>,
    model_loads: AtomicUsize,
}

impl FileArtifactStore {
    /// Store that caches artifacts process-wide after the first load.
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths,
            cache: true,
            model: Mutex::new(None),
            error_estimate: Mutex::new(None),
            model_loads: AtomicUsize::new(0),
        }
    }

    /// Store that re-reads the artifacts on every call.
    pub fn uncached(paths: ArtifactPaths) -> Self {
        Self {
            cache: false,
            ..Self::new(paths)
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// How many times the model file has been deserialized.
    pub fn model_loads(&self) -> usize {
        self.model_loads.load(Ordering::Relaxed)
    }

    fn read_model(&self) -> Result<Arc<dyn RegressionModel>, ArtifactError> {
        let path = &self.paths.model;
        let text = read_artifact(path)?;
        let model = LinearModel::from_json(&text).map_err(|e| ArtifactError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.model_loads.fetch_add(1, Ordering::Relaxed);
        info!(
            path = %path.display(),
            columns = ?model.required_columns(),
            "loaded charge model"
        );
        Ok(Arc::new(model))
    }

    fn read_error_estimate(&self) -> Result<f64, ArtifactError> {
        let path = &self.paths.error_estimate;
        let text = read_artifact(path)?;
        let rmse = parse_error_estimate(&text).map_err(|reason| ArtifactError::Malformed {
            path: path.clone(),
            reason,
        })?;
        info!(path = %path.display(), rmse, "loaded error estimate");
        Ok(rmse)
    }
}

impl ArtifactStore for FileArtifactStore {
    fn load_model(&self) -> Result<Arc<dyn RegressionModel>, ArtifactError> {
        if !self.cache {
            return self.read_model();
        }
        let mut slot = lock(&self.model);
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = self.read_model()?;
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    fn load_error_estimate(&self) -> Result<f64, ArtifactError> {
        if !self.cache {
            return self.read_error_estimate();
        }
        let mut slot = lock(&self.error_estimate);
        if let Some(rmse) = *slot {
            return Ok(rmse);
        }
        let rmse = self.read_error_estimate()?;
        *slot = Some(rmse);
        Ok(rmse)
    }
}

/// Slots are only ever assigned a fully built value, so a poisoned lock
/// still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_artifact(path: &Path) -> Result<String, ArtifactError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            debug!(path = %path.display(), "artifact missing");
            ArtifactError::NotFound(path.to_path_buf())
        } else {
            ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// The RMSE artifact is a bare JSON number; it must be finite and non-negative.
fn parse_error_estimate(text: &str) -> Result<f64, String> {
    let rmse: f64 = serde_json::from_str(text.trim()).map_err(|e| e.to_string())?;
    if !rmse.is_finite() || rmse < 0.0 {
        return Err(format!("RMSE must be a finite non-negative number, got {rmse}"));
    }
    Ok(rmse)
}
