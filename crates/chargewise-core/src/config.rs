//! Artifact locations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the serialized regression model inside a model directory.
pub const MODEL_FILE: &str = "insurance_model.json";

/// File name of the scalar RMSE inside a model directory.
pub const ERROR_ESTIMATE_FILE: &str = "rmse.json";

/// Where the two model artifacts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub error_estimate: PathBuf,
}

impl ArtifactPaths {
    pub fn new(model: impl Into<PathBuf>, error_estimate: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            error_estimate: error_estimate.into(),
        }
    }

    /// Standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(MODEL_FILE), dir.join(ERROR_ESTIMATE_FILE))
    }
}
