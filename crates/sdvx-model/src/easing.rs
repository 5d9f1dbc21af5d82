// Easing curves used to render curved laser segments

use std::f64::consts::PI;

use crate::enums::EasingType;
use crate::time::{Rational, rational_to_f64};

/// Curve weights are quantized to this denominator to keep positions small fractions.
const WEIGHT_SCALE: i64 = 1_000_000_000;

pub fn clamp(value: f64, low: f64, high: f64) -> f64 {
    if value < low {
        low
    } else if value > high {
        high
    } else {
        value
    }
}

/// Linearly map `value` from `domain` onto `range`.
pub fn linear_map(value: f64, domain: (f64, f64), range: (f64, f64)) -> f64 {
    let (dl, dh) = domain;
    let (rl, rh) = range;
    (value - dl) / (dh - dl) * (rh - rl) + rl
}

/// Evaluate a strictly increasing curve mapping `[0, 1]` onto `[0, 1]`.
///
/// `NoEasing` has no curve and evaluates as linear.
pub fn ease(ease_type: EasingType, x: f64) -> f64 {
    let x = clamp(x, 0.0, 1.0);
    match ease_type {
        EasingType::NoEasing | EasingType::Linear => x,
        EasingType::EaseInSine => (x * PI / 2.0).sin(),
        EasingType::EaseOutSine => ((x - 1.0) * PI / 2.0).sin() + 1.0,
    }
}

/// Value at `progress` along the curve from `initial` to `target`.
///
/// `curve_range` trims the curve: `(0.0, 0.5)` uses only its first half, rescaled so
/// the result still runs from `initial` to `target`.
pub fn interpolate(
    ease_type: EasingType,
    progress: Rational,
    initial: Rational,
    target: Rational,
    curve_range: (f64, f64),
) -> Rational {
    if progress <= Rational::from_integer(0) {
        return initial;
    }
    if progress >= Rational::from_integer(1) {
        return target;
    }

    let (lb, lt) = curve_range;
    let progress = rational_to_f64(progress);
    let in_val = linear_map(progress, (0.0, 1.0), curve_range);
    let mid_val = ease(ease_type, in_val);
    let out_val = linear_map(mid_val, (ease(ease_type, lb), ease(ease_type, lt)), (0.0, 1.0));

    let weight = Rational::new((out_val * WEIGHT_SCALE as f64).round() as i64, WEIGHT_SCALE);
    initial + weight * (target - initial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_endpoints() {
        for ease_type in [
            EasingType::Linear,
            EasingType::EaseInSine,
            EasingType::EaseOutSine,
        ] {
            assert!(ease(ease_type, 0.0).abs() < 1e-12);
            assert!((ease(ease_type, 1.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_interpolate_bounds() {
        let zero = Rational::from_integer(0);
        let one = Rational::from_integer(1);
        assert_eq!(
            interpolate(EasingType::Linear, zero, zero, one, (0.0, 1.0)),
            zero
        );
        assert_eq!(
            interpolate(EasingType::Linear, one, zero, one, (0.0, 1.0)),
            one
        );
    }

    #[test]
    fn test_interpolate_linear_midpoint() {
        let zero = Rational::from_integer(0);
        let one = Rational::from_integer(1);
        let half = Rational::new(1, 2);
        assert_eq!(
            interpolate(EasingType::Linear, half, zero, one, (0.0, 1.0)),
            half
        );
    }

    #[test]
    fn test_ease_in_is_ahead_of_linear() {
        let zero = Rational::from_integer(0);
        let one = Rational::from_integer(1);
        let quarter = Rational::new(1, 4);
        let eased = interpolate(EasingType::EaseInSine, quarter, zero, one, (0.0, 1.0));
        assert!(eased > quarter);
        let eased = interpolate(EasingType::EaseOutSine, quarter, zero, one, (0.0, 1.0));
        assert!(eased < quarter);
    }

    #[test]
    fn test_linear_map() {
        assert_eq!(linear_map(0.5, (0.0, 1.0), (2.0, 4.0)), 3.0);
        assert_eq!(linear_map(3.0, (2.0, 4.0), (0.0, 1.0)), 0.5);
    }
}
