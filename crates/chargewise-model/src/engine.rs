//! The prediction engine: validated input to point estimate and band.
//!
//! Rounding happens at exactly two places. BMI is rounded before the model
//! sees it (the artifact was trained on rounded BMI), and the estimate and
//! its bounds are rounded after. Moving either changes results.

use chargewise_core::input::MIN_BMI;
use chargewise_core::model::feature_table;
use chargewise_core::{MeasurementError, PredictionInput, PredictionResult, derive, round2};
use thiserror::Error;
use tracing::{debug, warn};

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::linear::ModelError;

#[derive(Debug, Error)]
pub enum PredictError {
    /// Out-of-range or degenerate measurements. User-correctable.
    #[error(transparent)]
    InvalidMeasurement(#[from] MeasurementError),

    /// The model artifact is missing, unreadable, or cannot evaluate the
    /// feature table. Operator-correctable; no partial result exists.
    #[error("prediction model unavailable: {0}")]
    ModelUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<ArtifactError> for PredictError {
    fn from(e: ArtifactError) -> Self {
        Self::ModelUnavailable(Box::new(e))
    }
}

impl From<ModelError> for PredictError {
    fn from(e: ModelError) -> Self {
        Self::ModelUnavailable(Box::new(e))
    }
}

impl From<arrow::error::ArrowError> for PredictError {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::ModelUnavailable(Box::new(e))
    }
}

/// Produces charge estimates from an injected [`ArtifactStore`].
///
/// Read-only with respect to the artifacts; safe to share across threads
/// once the store is.
pub struct PredictionEngine<S> {
    store: S,
}

impl<S: ArtifactStore> PredictionEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Estimate the annual charge for `input`.
    ///
    /// A missing or unusable error estimate only drops the band; the point
    /// estimate is still returned.
    pub fn predict(&self, input: &PredictionInput) -> Result<PredictionResult, PredictError> {
        input.validate()?;
        let features = derive(input)?;
        if features.bmi < MIN_BMI {
            return Err(MeasurementError::DegenerateBmi(features.bmi).into());
        }

        let model = self.store.load_model()?;
        let table = feature_table(std::slice::from_ref(&features))?;
        let raw = model
            .predict(&table)?
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyOutput)?;
        if !raw.is_finite() {
            return Err(ModelError::NonFinite(raw).into());
        }
        let point = round2(raw);

        let result = match self.store.load_error_estimate() {
            Ok(rmse) => PredictionResult::with_error_estimate(point, rmse),
            Err(ArtifactError::NotFound(path)) => {
                debug!(path = %path.display(), "no error estimate, omitting bounds");
                PredictionResult::point_only(point)
            }
            Err(e) => {
                warn!(error = %e, "error estimate unusable, omitting bounds");
                PredictionResult::point_only(point)
            }
        };

        debug!(
            bmi = features.bmi,
            point = result.point_estimate,
            lower = ?result.lower_bound,
            upper = ?result.upper_bound,
            "prediction complete"
        );
        Ok(result)
    }
}
