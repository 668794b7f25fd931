use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fraction of a step by which a stepped grid may undershoot its end point and still
/// include it.
const STEP_TOLERANCE: f64 = 1e-9;

/// Minimum grid step, in units in the last place of the largest bound. Rounding is
/// monotone, so any step above this keeps rule-generated coordinates strictly ascending.
const MIN_STEP_ULPS: f64 = 8.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Sweep domain must contain at least one point")]
    Empty,

    #[error("Inverted bounds: start {start} is greater than end {end}")]
    InvertedBounds { start: f64, end: f64 },

    #[error("Grid step must be positive and finite (got {0})")]
    InvalidStep(f64),

    #[error("Grid step {step} is too fine to resolve coordinates near {magnitude}")]
    StepBelowResolution { step: f64, magnitude: f64 },

    #[error("Coordinate at index {index} is not finite")]
    NonFinite { index: usize },

    #[error(
        "Coordinates must be strictly ascending: index {index} ({value}) does not exceed its predecessor ({previous})"
    )]
    NotAscending {
        index: usize,
        previous: f64,
        value: f64,
    },
}

/// Declarative description of a sweep domain, as it appears in a sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainSpec {
    /// `count` evenly spaced points from `start` to `end` inclusive.
    Linear { start: f64, end: f64, count: usize },
    /// Points `start, start + step, ...` up to and including `end` (within tolerance).
    Stepped { start: f64, end: f64, step: f64 },
    /// An explicit, strictly ascending list of coordinates.
    Explicit(Vec<f64>),
}

/// One element of the sweep: its canonical index and the coordinate it maps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub index: usize,
    pub coordinate: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum CoordinateRule {
    Linear { start: f64, step: f64 },
    Explicit(Vec<f64>),
}

/// The full ordered sweep: `N` points, each mapped to a coordinate by a deterministic rule.
///
/// Coordinates are validated to be finite and strictly ascending at construction, so the
/// canonical index order and the coordinate order always agree. The merge step relies on
/// this to reconstruct global order by sorting on coordinates alone.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDomain {
    len: usize,
    rule: CoordinateRule,
}

impl PointDomain {
    pub fn linear(start: f64, end: f64, count: usize) -> Result<Self, DomainError> {
        if count == 0 {
            return Err(DomainError::Empty);
        }
        check_bounds(start, end, count)?;

        let step = if count == 1 {
            0.0
        } else {
            let step = (end - start) / (count - 1) as f64;
            check_resolution(start, end, step)?;
            step
        };

        Ok(Self {
            len: count,
            rule: CoordinateRule::Linear { start, step },
        })
    }

    pub fn stepped(start: f64, end: f64, step: f64) -> Result<Self, DomainError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(DomainError::InvalidStep(step));
        }
        check_bounds(start, end, 1)?;
        check_resolution(start, end, step)?;

        let span = (end - start) / step;
        let count = (span + STEP_TOLERANCE).floor() as usize + 1;

        Ok(Self {
            len: count,
            rule: CoordinateRule::Linear { start, step },
        })
    }

    pub fn explicit(coordinates: Vec<f64>) -> Result<Self, DomainError> {
        if coordinates.is_empty() {
            return Err(DomainError::Empty);
        }
        if let Some(index) = coordinates.iter().position(|c| !c.is_finite()) {
            return Err(DomainError::NonFinite { index });
        }

        verify_ascending(&coordinates)?;

        Ok(Self {
            len: coordinates.len(),
            rule: CoordinateRule::Explicit(coordinates),
        })
    }

    pub fn from_spec(spec: &DomainSpec) -> Result<Self, DomainError> {
        match spec {
            DomainSpec::Linear { start, end, count } => Self::linear(*start, *end, *count),
            DomainSpec::Stepped { start, end, step } => Self::stepped(*start, *end, *step),
            DomainSpec::Explicit(coordinates) => Self::explicit(coordinates.clone()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn coordinate(&self, index: usize) -> Option<f64> {
        if index >= self.len {
            return None;
        }
        Some(match &self.rule {
            CoordinateRule::Linear { start, step } => start + index as f64 * step,
            CoordinateRule::Explicit(coordinates) => coordinates[index],
        })
    }

    pub fn point(&self, index: usize) -> Option<SweepPoint> {
        self.coordinate(index)
            .map(|coordinate| SweepPoint { index, coordinate })
    }

    pub fn points(&self) -> impl Iterator<Item = SweepPoint> + '_ {
        (0..self.len).filter_map(|index| self.point(index))
    }

    /// First and last coordinate of the domain.
    pub fn bounds(&self) -> (f64, f64) {
        let first = self.coordinate(0).unwrap_or(f64::NAN);
        let last = self.coordinate(self.len.saturating_sub(1)).unwrap_or(f64::NAN);
        (first, last)
    }
}

fn verify_ascending(coordinates: &[f64]) -> Result<(), DomainError> {
    for (index, (&previous, &value)) in coordinates.iter().tuple_windows().enumerate() {
        if value <= previous {
            return Err(DomainError::NotAscending {
                index: index + 1,
                previous,
                value,
            });
        }
    }
    Ok(())
}

fn check_resolution(start: f64, end: f64, step: f64) -> Result<(), DomainError> {
    if !step.is_finite() {
        return Err(DomainError::InvalidStep(step));
    }
    let magnitude = start.abs().max(end.abs());
    if step <= MIN_STEP_ULPS * ulp(magnitude) {
        return Err(DomainError::StepBelowResolution { step, magnitude });
    }
    Ok(())
}

/// Distance from `x` to the next representable value away from zero.
fn ulp(x: f64) -> f64 {
    let x = x.abs();
    f64::from_bits(x.to_bits() + 1) - x
}

fn check_bounds(start: f64, end: f64, count: usize) -> Result<(), DomainError> {
    if !start.is_finite() {
        return Err(DomainError::NonFinite { index: 0 });
    }
    if !end.is_finite() {
        return Err(DomainError::NonFinite { index: count - 1 });
    }
    if end < start {
        return Err(DomainError::InvertedBounds { start, end });
    }
    Ok(())
}
