//! Quantized ranges and min/max limits for controller tunables.

use crate::error::{AflError, AflResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed interval `[min, max]` with a step size, as reported by every
/// `*_range()` query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    /// Smallest accepted value.
    pub min: T,
    /// Largest accepted value.
    pub max: T,
    /// Step between representable values.
    pub inc: T,
}

impl<T: PartialOrd + Copy + fmt::Display> Range<T> {
    /// Create a range.
    pub const fn new(min: T, max: T, inc: T) -> Self {
        Self { min, max, inc }
    }

    /// Whether `value` lies inside the closed interval. NaN never does.
    pub fn contains(&self, value: &T) -> bool {
        *value >= self.min && *value <= self.max
    }

    /// Check `value` for the tunable called `name`.
    pub fn validate(&self, name: &str, value: T) -> AflResult<T> {
        if self.contains(&value) {
            Ok(value)
        } else {
            Err(AflError::InvalidParameter(format!(
                "{name} {value} outside [{}, {}]",
                self.min, self.max
            )))
        }
    }

    /// Clamp `value` into the interval.
    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] step {}", self.min, self.max, self.inc)
    }
}

/// Signed min/max pair bounding an actuator's search range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Limit {
    /// Lower bound (inclusive).
    pub min: i32,
    /// Upper bound (inclusive).
    pub max: i32,
}

impl Limit {
    /// Create a limit, rejecting `min > max`.
    pub fn new(min: i32, max: i32) -> AflResult<Self> {
        let limit = Self { min, max };
        limit.validate()?;
        Ok(limit)
    }

    /// Check the ordering of the bounds.
    pub fn validate(&self) -> AflResult<()> {
        if self.min > self.max {
            return Err(AflError::InvalidParameter(format!(
                "limit min {} greater than max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Intersection with another limit, `None` when they do not overlap.
    pub fn intersect(&self, other: &Limit) -> Option<Limit> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(Limit { min, max })
    }

    /// Number of integer positions covered.
    pub fn span(&self) -> i64 {
        i64::from(self.max) - i64::from(self.min)
    }

    /// Clamp a position into the limit.
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}
