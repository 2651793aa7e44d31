//! Raw prediction inputs and their physical validity checks.
//!
//! A [`PredictionInput`] carries the measurements a person types in: weight in
//! kilograms and height in metres. They never reach the model directly; see
//! [`crate::features::derive`] for the conversion to BMI.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accepted body weight, in kilograms.
pub const WEIGHT_RANGE_KG: RangeInclusive<f64> = 30.0..=250.0;

/// Accepted height, in metres.
pub const HEIGHT_RANGE_M: RangeInclusive<f64> = 1.0..=2.5;

/// BMI below this is physiologically implausible and would only produce a
/// meaningless extrapolation from the model.
pub const MIN_BMI: f64 = 13.0;

/// A string did not name one of the allowed choices for a categorical field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} choice: {value:?}")]
pub struct ParseChoiceError {
    pub field: &'static str,
    pub value: String,
}

/// Out-of-range or degenerate physical measurements.
///
/// User-correctable: the boundary reports these against the offending field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("weight {0} kg is outside the accepted range of 30 to 250 kg")]
    WeightOutOfRange(f64),

    #[error("height {0} m is outside the accepted range of 1.0 to 2.5 m")]
    HeightOutOfRange(f64),

    #[error("BMI {0} is below the plausible minimum of 13")]
    DegenerateBmi(f64),
}

impl MeasurementError {
    /// Name of the input field the error should be reported against.
    pub fn field(&self) -> &'static str {
        match self {
            Self::WeightOutOfRange(_) => "weight",
            // A degenerate BMI is almost always a mistyped height.
            Self::HeightOutOfRange(_) | Self::DegenerateBmi(_) => "height",
        }
    }
}

/// Declare a closed set of lowercase string choices with `as_str` / `FromStr`.
macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All choices, in display order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The encoding the model was trained with.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseChoiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseChoiceError {
                        field: $field,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

choice_enum!(
    /// Sex as recorded in the training data.
    Sex, "sex", { Female => "female", Male => "male" }
);

choice_enum!(
    /// Smoking status.
    Smoker, "smoker", { Yes => "yes", No => "no" }
);

choice_enum!(
    /// US region of residence used by the training data.
    Region, "region", {
        Northeast => "northeast",
        Northwest => "northwest",
        Southeast => "southeast",
        Southwest => "southwest",
    }
);

impl From<bool> for Smoker {
    fn from(smokes: bool) -> Self {
        if smokes { Self::Yes } else { Self::No }
    }
}

/// Per-request attributes for a single charge estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub age: u32,
    pub sex: Sex,
    pub smoker: Smoker,
    pub weight_kg: f64,
    pub height_m: f64,
    pub children: u32,
    pub region: Region,
}

impl PredictionInput {
    /// Check weight and height against the accepted physical ranges.
    ///
    /// NaN never falls inside a range, so it is rejected here too.
    pub fn validate(&self) -> Result<(), MeasurementError> {
        if !WEIGHT_RANGE_KG.contains(&self.weight_kg) {
            return Err(MeasurementError::WeightOutOfRange(self.weight_kg));
        }
        if !HEIGHT_RANGE_M.contains(&self.height_m) {
            return Err(MeasurementError::HeightOutOfRange(self.height_m));
        }
        Ok(())
    }
}
