//! Point estimate plus optional confidence band.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::features::round2;

/// Lowest lower bound ever presented; anything below reads as unrealistic.
pub const LOWER_BOUND_FLOOR: f64 = 1000.0;

/// A charge estimate.
///
/// When present, bounds satisfy `LOWER_BOUND_FLOOR <= lower <= point <= upper`,
/// strictly around the point whenever the error estimate is positive.
/// Absent bounds mean the error estimate was unavailable, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub point_estimate: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

impl PredictionResult {
    /// An estimate without a band.
    pub fn point_only(point_estimate: f64) -> Self {
        Self {
            point_estimate,
            lower_bound: None,
            upper_bound: None,
        }
    }

    /// Build the symmetric band `point ± rmse` around an already-rounded point.
    ///
    /// The lower edge is floored at [`LOWER_BOUND_FLOOR`]. A point at or below
    /// the floor admits no band that respects both the floor and
    /// `lower < point`, so the band is dropped instead.
    pub fn with_error_estimate(point_estimate: f64, rmse: f64) -> Self {
        if point_estimate <= LOWER_BOUND_FLOOR {
            warn!(
                point_estimate,
                floor = LOWER_BOUND_FLOOR,
                "estimate at or below interval floor, omitting bounds"
            );
            return Self::point_only(point_estimate);
        }

        let lower = LOWER_BOUND_FLOOR.max(round2(point_estimate - rmse));
        let upper = round2(point_estimate + rmse);
        Self {
            point_estimate,
            lower_bound: Some(lower),
            upper_bound: Some(upper),
        }
    }

    /// Whether a confidence band is attached.
    pub fn has_interval(&self) -> bool {
        self.lower_bound.is_some() && self.upper_bound.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_symmetric_and_rounded() {
        let r = PredictionResult::with_error_estimate(8000.0, 4577.431);
        assert_eq!(r.point_estimate, 8000.0);
        assert_eq!(r.lower_bound, Some(3422.57));
        assert_eq!(r.upper_bound, Some(12577.43));
        assert!(r.has_interval());
    }

    #[test]
    fn lower_bound_is_floored() {
        let r = PredictionResult::with_error_estimate(3000.0, 6000.0);
        assert_eq!(r.lower_bound, Some(LOWER_BOUND_FLOOR));
        assert_eq!(r.upper_bound, Some(9000.0));
    }

    #[test]
    fn estimate_below_floor_has_no_band() {
        let r = PredictionResult::with_error_estimate(850.25, 500.0);
        assert_eq!(r, PredictionResult::point_only(850.25));
        assert!(!r.has_interval());
    }

    #[test]
    fn estimate_at_floor_has_no_band() {
        let r = PredictionResult::with_error_estimate(LOWER_BOUND_FLOOR, 500.0);
        assert_eq!(r, PredictionResult::point_only(LOWER_BOUND_FLOOR));

        let r = PredictionResult::with_error_estimate(1000.01, 500.0);
        assert_eq!(r.lower_bound, Some(LOWER_BOUND_FLOOR));
        assert_eq!(r.upper_bound, Some(1500.01));
        assert!(r.lower_bound.unwrap() < r.point_estimate);
    }

    #[test]
    fn zero_rmse_collapses_band() {
        let r = PredictionResult::with_error_estimate(5000.5, 0.0);
        assert_eq!(r.lower_bound, Some(5000.5));
        assert_eq!(r.upper_bound, Some(5000.5));
    }

    #[test]
    fn point_only_has_no_bounds() {
        let r = PredictionResult::point_only(1234.56);
        assert_eq!(r.lower_bound, None);
        assert_eq!(r.upper_bound, None);
    }
}
