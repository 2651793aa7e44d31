//! Model inference: artifact loading, the linear charge model, and the prediction engine.

mod artifact;
mod engine;
mod linear;

pub use artifact::{ArtifactError, ArtifactStore, FileArtifactStore};
pub use engine::{PredictError, PredictionEngine};
pub use linear::{Interaction, LinearModel, ModelError, RegressionModel};
