//! Persisting request/response pairs.
//!
//! A recorder keeps one contact record per natural key (first name, last
//! name, email) and a new prediction record for every estimate made.

use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use crate::input::PredictionInput;
use crate::result::PredictionResult;

/// Natural key of a recorded subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl ContactDetails {
    /// Trims surrounding whitespace and lowercases the email so the same
    /// person typed twice maps to one record.
    pub fn new(
        first_name: impl AsRef<str>,
        last_name: impl AsRef<str>,
        email: impl AsRef<str>,
    ) -> Self {
        Self {
            first_name: first_name.as_ref().trim().to_string(),
            last_name: last_name.as_ref().trim().to_string(),
            email: email.as_ref().trim().to_ascii_lowercase(),
        }
    }
}

/// One estimate to be stored.
#[derive(Debug, Clone, Copy)]
pub struct PredictionRecord<'a> {
    pub contact: &'a ContactDetails,
    /// Account the contact belongs to, when known.
    pub subject_user: Option<UserId>,
    /// Authenticated account that requested the estimate.
    pub created_by: Option<UserId>,
    pub input: &'a PredictionInput,
    pub result: &'a PredictionResult,
}

/// Identifiers of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub client_id: i64,
    pub prediction_id: i64,
    /// False when an existing contact record was reused.
    pub client_created: bool,
}

/// Storage for prediction records.
///
/// Implementations must write the contact upsert and the prediction insert
/// atomically: on error nothing from the call may remain.
pub trait PredictionRecorder {
    type Error: std::error::Error + Send + Sync + 'static;

    fn record(&self, record: &PredictionRecord<'_>) -> Result<RecordReceipt, Self::Error>;
}

impl<R: PredictionRecorder + ?Sized> PredictionRecorder for &R {
    type Error = R::Error;

    fn record(&self, record: &PredictionRecord<'_>) -> Result<RecordReceipt, Self::Error> {
        (**self).record(record)
    }
}
