//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Clamp a probability to `[0, 1]`, returning 0.0 for NaN.
#[must_use]
pub fn clamp_probability(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Convert usize to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Narrow a u128 to u64, saturating at `u64::MAX`.
#[must_use]
pub fn saturating_u128_to_u64(value: u128) -> u64 {
    cast::<u128, u64>(value).unwrap_or(u64::MAX)
}

/// Share of `capacity` occupied by `used`; an empty capacity reads as full.
#[must_use]
pub fn fill_ratio(used: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 1.0;
    }
    clamp_probability(usize_to_f64(used) / usize_to_f64(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_clamps_and_handles_nan() {
        assert!((clamp_probability(f64::NAN) - 0.0).abs() < f64::EPSILON);
        assert!((clamp_probability(1.7) - 1.0).abs() < f64::EPSILON);
        assert!((clamp_probability(-0.2) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn narrowing_saturates() {
        assert_eq!(saturating_u128_to_u64(u128::from(u64::MAX) + 7), u64::MAX);
        assert_eq!(saturating_u128_to_u64(42), 42);
    }

    #[test]
    fn fill_ratio_treats_zero_capacity_as_full() {
        assert!((fill_ratio(0, 0) - 1.0).abs() < f64::EPSILON);
        assert!((fill_ratio(3, 12) - 0.25).abs() < f64::EPSILON);
    }
}
