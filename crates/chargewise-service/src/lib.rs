//! Boundary-facing request handling: payload validation, prediction, and
//! best-effort recording of the request/response pair.

pub mod form;
pub mod orchestrator;

pub use form::{FieldErrors, PredictionRequest, ValidatedRequest};
pub use orchestrator::{
    Outcome, RequestContext, RequestError, RequestOrchestrator, SaveStatus, UNAVAILABLE_MESSAGE,
};
