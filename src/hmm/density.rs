use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::error::{HmmError, Result};

/// Parametric density of one mixture component.
///
/// Truncated kinds are named after the side that is cut away:
/// `NormalTruncatedLeft` keeps `[bound, +inf)`, `NormalTruncatedRight`
/// keeps `(-inf, bound]`. Both are renormalised over their support.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Density {
    Normal { mean: f64, variance: f64 },
    NormalTruncatedLeft { mean: f64, variance: f64, bound: f64 },
    NormalTruncatedRight { mean: f64, variance: f64, bound: f64 },
    Uniform { min: f64, max: f64 },
}

fn normal(mean: f64, variance: f64) -> Result<Normal> {
    Normal::new(mean, variance.sqrt())
        .map_err(|e| HmmError::InvalidModel(format!("normal with mean {} and variance {}: {}", mean, variance, e)))
}

/// Density of `normal` restricted to the part of the line it keeps, with the
/// kept mass as normaliser. Zero outside.
fn truncated(normal: &Normal, x: f64, kept: bool, mass: f64) -> f64 {
    if kept {
        normal.pdf(x) / mass
    } else {
        0.0
    }
}

impl Density {
    /// Density at `x`. A degenerate parameter set (rejected by `validate`)
    /// has density 0 everywhere.
    pub fn pdf(&self, x: f64) -> f64 {
        match *self {
            Density::Normal { mean, variance } => normal(mean, variance).map_or(0.0, |n| n.pdf(x)),
            Density::NormalTruncatedLeft { mean, variance, bound } => {
                normal(mean, variance).map_or(0.0, |n| truncated(&n, x, x >= bound, n.sf(bound)))
            }
            Density::NormalTruncatedRight { mean, variance, bound } => {
                normal(mean, variance).map_or(0.0, |n| truncated(&n, x, x <= bound, n.cdf(bound)))
            }
            Density::Uniform { min, max } => {
                if x < min || x > max {
                    0.0
                } else {
                    1.0 / (max - min)
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let finite = |values: &[f64]| values.iter().all(|v| v.is_finite());
        let ok = match *self {
            Density::Normal { mean, variance } => finite(&[mean, variance]) && normal(mean, variance).is_ok(),
            Density::NormalTruncatedLeft { mean, variance, bound } => {
                finite(&[mean, variance, bound]) && normal(mean, variance)?.sf(bound) > 0.0
            }
            Density::NormalTruncatedRight { mean, variance, bound } => {
                finite(&[mean, variance, bound]) && normal(mean, variance)?.cdf(bound) > 0.0
            }
            Density::Uniform { min, max } => finite(&[min, max]) && min < max,
        };
        if ok {
            Ok(())
        } else {
            Err(HmmError::InvalidModel(format!("degenerate density {:?}", self)))
        }
    }
}
