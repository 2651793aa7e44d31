//! Feature derivation: raw measurements to the model's feature vector.
//!
//! The trained model never sees weight or height. It sees BMI rounded to two
//! decimal places, exactly as in its training data, so the rounding here is
//! part of the model contract rather than a display concern.

use serde::Serialize;

use crate::input::{MeasurementError, PredictionInput, Region, Sex, Smoker};

/// Round to two decimal places, half away from zero.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Body-mass index, `weight / height²`, rounded to two decimal places.
///
/// Callers must have rejected non-positive heights already.
pub fn bmi(weight_kg: f64, height_m: f64) -> f64 {
    round2(weight_kg / (height_m * height_m))
}

/// One row of the model's input table.
///
/// Field order mirrors the column order the model was trained with; see
/// [`crate::schema::model::FEATURE_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub age: u32,
    pub children: u32,
    pub smoker: Smoker,
    pub bmi: f64,
    pub sex: Sex,
    pub region: Region,
}

/// Turn a raw input into the model's feature vector.
///
/// Re-checks the measurement ranges instead of trusting upstream validation,
/// which also rules out a zero height before the division.
pub fn derive(input: &PredictionInput) -> Result<FeatureVector, MeasurementError> {
    input.validate()?;

    Ok(FeatureVector {
        age: input.age,
        children: input.children,
        smoker: input.smoker,
        bmi: bmi(input.weight_kg, input.height_m),
        sex: input.sex,
        region: input.region,
    })
}
