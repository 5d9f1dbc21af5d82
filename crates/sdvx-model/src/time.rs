// Exact musical time: measure-relative positions and time signatures

use std::fmt;

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// Exact fraction of a whole note.
pub type Rational = Ratio<i64>;

/// Ticks in one 4/4 bar (one whole note).
pub const TICKS_PER_BAR: i64 = 192;

/// A point in a chart: measure number plus a position inside that measure.
///
/// Positions are fractions of a whole note, so a 4/4 measure spans `[0, 1)` and a
/// 7/8 measure spans `[0, 7/8)`. Ordering compares the measure first, then the
/// position. Normalising a position that overflows its measure needs the time
/// signature table and lives on `ChartInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimePoint {
    measure: u32,
    position: Rational,
}

impl TimePoint {
    /// Point at `count / subdivision` of a whole note into `measure`.
    pub fn new(measure: u32, count: i64, subdivision: i64) -> Result<Self, ChartError> {
        if subdivision <= 0 {
            return Err(ChartError::InvalidTimePoint(format!(
                "subdivision must be positive (got {subdivision})"
            )));
        }
        if count < 0 {
            return Err(ChartError::InvalidTimePoint(format!(
                "count cannot be negative (got {count})"
            )));
        }
        Ok(Self {
            measure,
            position: Rational::new(count, subdivision),
        })
    }

    pub fn with_position(measure: u32, position: Rational) -> Result<Self, ChartError> {
        if position < Rational::from_integer(0) {
            return Err(ChartError::InvalidTimePoint(format!(
                "position cannot be negative (got {position})"
            )));
        }
        Ok(Self { measure, position })
    }

    /// Caller guarantees `position >= 0`.
    pub(crate) fn from_parts(measure: u32, position: Rational) -> Self {
        debug_assert!(position >= Rational::from_integer(0));
        Self { measure, position }
    }

    /// First instant of `measure`.
    pub const fn measure_start(measure: u32) -> Self {
        Self {
            measure,
            position: Ratio::new_raw(0, 1),
        }
    }

    pub fn measure(&self) -> u32 {
        self.measure
    }

    pub fn position(&self) -> Rational {
        self.position
    }
}

impl Default for TimePoint {
    fn default() -> Self {
        Self::measure_start(1)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}+{}", self.measure, self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    upper: u32,
    lower: u32,
}

impl TimeSignature {
    pub fn new(upper: u32, lower: u32) -> Result<Self, ChartError> {
        if upper == 0 || lower == 0 {
            return Err(ChartError::InvalidTimeSignature { upper, lower });
        }
        Ok(Self { upper, lower })
    }

    pub fn upper(&self) -> u32 {
        self.upper
    }

    pub fn lower(&self) -> u32 {
        self.lower
    }

    /// Length of one measure in whole notes.
    pub fn as_fraction(&self) -> Rational {
        Rational::new(i64::from(self.upper), i64::from(self.lower))
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { upper: 4, lower: 4 }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.upper, self.lower)
    }
}

/// Round to the nearest integer, ties to even.
pub fn round_half_even(value: Rational) -> i64 {
    let floor = value.floor();
    let base = floor.to_integer();
    let frac = value - floor;
    let half = Rational::new(1, 2);
    if frac > half || (frac == half && base % 2 != 0) {
        base + 1
    } else {
        base
    }
}

/// Nearest `f64` to an exact fraction.
pub fn rational_to_f64(value: Rational) -> f64 {
    *value.numer() as f64 / *value.denom() as f64
}

/// Convert a duration in whole notes to ticks.
pub fn duration_to_ticks(duration: Rational) -> i64 {
    round_half_even(duration * TICKS_PER_BAR)
}
