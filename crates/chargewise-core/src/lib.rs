pub mod config;
pub mod features;
pub mod identity;
pub mod input;
pub mod record;
pub mod result;
pub mod schema;

pub use config::ArtifactPaths;
pub use features::{FeatureVector, derive, round2};
pub use identity::{
    IdentityError, IdentityResolver, Prefill, Profile, Resolution, Role, Subject, UserDirectory,
    UserId, Viewer,
};
pub use input::{MeasurementError, ParseChoiceError, PredictionInput, Region, Sex, Smoker};
pub use record::{ContactDetails, PredictionRecord, PredictionRecorder, RecordReceipt};
pub use result::PredictionResult;
pub use schema::model;
