//! The prediction request payload and its form-level validation rules.
//!
//! These are the rules a user sees against individual fields. They are
//! stricter than the engine's own physical checks (age and children bounds,
//! measurement precision) and all of them are reported at once.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use chargewise_core::input::{HEIGHT_RANGE_M, WEIGHT_RANGE_KG};
use chargewise_core::{ContactDetails, PredictionInput, Region, Sex, Smoker};
use serde::{Deserialize, Serialize};

const NAME_CHARS: RangeInclusive<usize> = 2..=50;
const AGE_YEARS: RangeInclusive<i64> = 18..=125;
const CHILDREN: RangeInclusive<i64> = 0..=15;

/// Raw payload as submitted by the boundary. Choice fields arrive as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i64,
    pub gender: String,
    pub smoker: String,
    /// Kilograms.
    pub weight: f64,
    /// Metres.
    pub height: f64,
    pub children: i64,
    pub region: String,
}

/// A payload that passed [`PredictionRequest::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub contact: ContactDetails,
    pub input: PredictionInput,
}

/// Field name to message, one per offending field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single error against `field`.
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record an error; the first message for a field wins.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl PredictionRequest {
    /// Check every field, collecting all errors.
    pub fn validate(&self) -> Result<ValidatedRequest, FieldErrors> {
        let mut errors = FieldErrors::new();

        check_name(&mut errors, "first_name", &self.first_name);
        check_name(&mut errors, "last_name", &self.last_name);
        if !is_valid_email(self.email.trim()) {
            errors.add("email", "Enter a valid email address.");
        }

        let age = bounded(&mut errors, "age", self.age, &AGE_YEARS);
        let children = bounded(&mut errors, "children", self.children, &CHILDREN);

        let sex = choice::<Sex>(&mut errors, "gender", &self.gender);
        let smoker = choice::<Smoker>(&mut errors, "smoker", &self.smoker);
        let region = choice::<Region>(&mut errors, "region", &self.region);

        check_measurement(&mut errors, "weight", self.weight, &WEIGHT_RANGE_KG, 10.0);
        check_measurement(&mut errors, "height", self.height, &HEIGHT_RANGE_M, 100.0);

        match (age, children, sex, smoker, region) {
            (Some(age), Some(children), Some(sex), Some(smoker), Some(region))
                if errors.is_empty() =>
            {
                Ok(ValidatedRequest {
                    contact: ContactDetails::new(&self.first_name, &self.last_name, &self.email),
                    input: PredictionInput {
                        age,
                        sex,
                        smoker,
                        weight_kg: self.weight,
                        height_m: self.height,
                        children,
                        region,
                    },
                })
            }
            _ => Err(errors),
        }
    }
}

fn check_name(errors: &mut FieldErrors, field: &'static str, value: &str) {
    let len = value.trim().chars().count();
    if !NAME_CHARS.contains(&len) {
        errors.add(
            field,
            format!(
                "Must be between {} and {} characters.",
                NAME_CHARS.start(),
                NAME_CHARS.end()
            ),
        );
    }
}

fn bounded(
    errors: &mut FieldErrors,
    field: &'static str,
    value: i64,
    range: &RangeInclusive<i64>,
) -> Option<u32> {
    if range.contains(&value) {
        u32::try_from(value).ok()
    } else {
        errors.add(
            field,
            format!("Must be between {} and {}.", range.start(), range.end()),
        );
        None
    }
}

fn choice<T>(errors: &mut FieldErrors, field: &'static str, value: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.add(
                field,
                format!("Select a valid choice. {value:?} is not one of the available choices."),
            );
            None
        }
    }
}

/// Range plus precision: `per_unit` steps per unit, e.g. 10 for 0.1 kg.
fn check_measurement(
    errors: &mut FieldErrors,
    field: &'static str,
    value: f64,
    range: &RangeInclusive<f64>,
    per_unit: f64,
) {
    if !range.contains(&value) {
        errors.add(
            field,
            format!("Must be between {} and {}.", range.start(), range.end()),
        );
        return;
    }
    let scaled = value * per_unit;
    if (scaled - scaled.round()).abs() > 1e-6 {
        errors.add(field, format!("Must be a multiple of {}.", 1.0 / per_unit));
    }
}

/// Structural check: one `@`, a dot-separated local part, and a domain of
/// at least two labels of letters and digits in any script, with inner hyphens.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if email.chars().any(char::is_whitespace) || domain.contains('@') {
        return false;
    }
    let local_ok = !local.is_empty()
        && local.len() <= 64
        && local.split('.').all(|part| !part.is_empty());
    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        });
    local_ok && domain_ok
}
