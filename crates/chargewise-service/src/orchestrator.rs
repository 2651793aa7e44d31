//! Request orchestration: predict, then try to record.
//!
//! The estimate is the primary response. Recording is best-effort: a
//! storage failure is logged and reported as [`SaveStatus::Failed`]
//! alongside the already-computed result, never as a request error.

use chargewise_core::{
    PredictionRecord, PredictionRecorder, PredictionResult, RecordReceipt, Resolution, UserId,
    Viewer,
};
use chargewise_model::{ArtifactStore, PredictError, PredictionEngine};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::form::{FieldErrors, PredictionRequest, ValidatedRequest};

/// Non-field message shown when the model cannot be used.
pub const UNAVAILABLE_MESSAGE: &str = "prediction service temporarily unavailable";

#[derive(Debug, Error)]
pub enum RequestError {
    /// User-correctable, reported against individual fields.
    #[error("invalid request: {0}")]
    Field(FieldErrors),

    /// Operator-correctable; the submitted values remain valid.
    #[error("{}", UNAVAILABLE_MESSAGE)]
    ServiceUnavailable,
}

/// Who is asking, and for whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub viewer: Viewer,
    /// Account of the resolved subject, linked to the stored contact.
    pub subject_user: Option<UserId>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            viewer: Viewer::Anonymous,
            subject_user: None,
        }
    }

    pub fn from_resolution(viewer: Viewer, resolution: &Resolution) -> Self {
        Self {
            viewer,
            subject_user: resolution.subject.as_ref().map(|s| s.profile().id),
        }
    }
}

/// Whether the request/response pair was stored.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    /// No recorder configured.
    NotRequested,
    Saved(RecordReceipt),
    /// The estimate stands, but nothing was stored.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: PredictionResult,
    pub saved: SaveStatus,
}

/// Boundary-facing coordinator around a [`PredictionEngine`] and an
/// optional [`PredictionRecorder`].
pub struct RequestOrchestrator<S, R> {
    engine: PredictionEngine<S>,
    recorder: Option<R>,
}

impl<S: ArtifactStore, R: PredictionRecorder> RequestOrchestrator<S, R> {
    pub fn new(engine: PredictionEngine<S>, recorder: Option<R>) -> Self {
        Self { engine, recorder }
    }

    pub fn engine(&self) -> &PredictionEngine<S> {
        &self.engine
    }

    /// Validate a raw payload, then [`handle`](Self::handle) it.
    pub fn submit(
        &self,
        request: &PredictionRequest,
        ctx: &RequestContext,
    ) -> Result<Outcome, RequestError> {
        let validated = request.validate().map_err(RequestError::Field)?;
        self.handle(&validated, ctx)
    }

    /// Predict for an already-validated request and record the pair.
    pub fn handle(
        &self,
        request: &ValidatedRequest,
        ctx: &RequestContext,
    ) -> Result<Outcome, RequestError> {
        let result = match self.engine.predict(&request.input) {
            Ok(result) => result,
            Err(PredictError::InvalidMeasurement(e)) => {
                debug!(field = e.field(), error = %e, "rejected measurement");
                return Err(RequestError::Field(FieldErrors::single(
                    e.field(),
                    e.to_string(),
                )));
            }
            Err(PredictError::ModelUnavailable(e)) => {
                error!(error = %e, "prediction model unavailable");
                return Err(RequestError::ServiceUnavailable);
            }
        };

        let saved = match &self.recorder {
            None => SaveStatus::NotRequested,
            Some(recorder) => {
                let record = PredictionRecord {
                    contact: &request.contact,
                    subject_user: ctx.subject_user,
                    created_by: ctx.viewer.user_id(),
                    input: &request.input,
                    result: &result,
                };
                match recorder.record(&record) {
                    Ok(receipt) => {
                        info!(
                            client_id = receipt.client_id,
                            prediction_id = receipt.prediction_id,
                            "prediction saved"
                        );
                        SaveStatus::Saved(receipt)
                    }
                    Err(e) => {
                        warn!(error = %e, "prediction not saved");
                        SaveStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
        };

        Ok(Outcome { result, saved })
    }
}
