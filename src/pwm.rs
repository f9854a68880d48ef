//! PWM linearisation over the calibrated valve table.
//!
//! The table is a small, monotone slice of `(thrust_n, pwm)` points loaded
//! from config and validated at startup (`config::validate`); this module
//! only has to walk it and interpolate.

use crate::config::ValvePoint;

/// Map one commanded thrust `r` (newtons) to a PWM value by linear
/// interpolation on `table`:
///
/// - `r == 0` maps to PWM 0 directly, bypassing the search.
/// - `thrust_{k-1} <= r < thrust_k` interpolates linearly between the two
///   bracketing points, rounded to the nearest integer.
/// - `r >= thrust_{K-1}` (the table's last point) maps to `pwm_{K-1}`.
///
/// `table` must be non-empty, strictly monotone, and start at `(0, 0)` —
/// guaranteed by `Config::load`'s validation before any thread starts.
pub fn linearize(r: f64, table: &[ValvePoint]) -> u16 {
    if r <= 0.0 {
        return 0;
    }

    let last = table.last().expect("valve table must be non-empty");
    if r >= last.thrust_n {
        return last.pwm;
    }

    for pair in table.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if r >= lo.thrust_n && r < hi.thrust_n {
            let span = hi.thrust_n - lo.thrust_n;
            let frac = (r - lo.thrust_n) / span;
            let pwm = lo.pwm as f64 + (hi.pwm as f64 - lo.pwm as f64) * frac;
            return pwm.round() as u16;
        }
    }

    // Unreachable for a validated monotone table given the bounds checks
    // above, but fall back to the last point rather than panic.
    last.pwm
}

/// Linearise all four allocator outputs against `table`.
pub fn linearize_all(r: [f64; 4], table: &[ValvePoint]) -> [u16; 4] {
    let mut out = [0u16; 4];
    for (i, v) in r.iter().enumerate() {
        out[i] = linearize(*v, table);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<ValvePoint> {
        vec![
            ValvePoint { thrust_n: 0.0, pwm: 0 },
            ValvePoint { thrust_n: 0.05, pwm: 256 },
            ValvePoint { thrust_n: 0.1, pwm: 512 },
            ValvePoint { thrust_n: 0.15, pwm: 768 },
            ValvePoint { thrust_n: 0.2, pwm: 1023 },
        ]
    }

    #[test]
    fn zero_thrust_maps_to_zero_pwm() {
        assert_eq!(linearize(0.0, &table()), 0);
    }

    #[test]
    fn negative_thrust_clamped_to_zero_pwm() {
        assert_eq!(linearize(-0.01, &table()), 0);
    }

    #[test]
    fn midpoint_of_a_segment_interpolates_linearly() {
        // Midway between (0.05, 256) and (0.1, 512).
        assert_eq!(linearize(0.075, &table()), 384);
    }

    #[test]
    fn exact_table_points_map_exactly() {
        for point in table() {
            assert_eq!(linearize(point.thrust_n, &table()), point.pwm);
        }
    }

    #[test]
    fn at_or_above_final_point_saturates_to_final_pwm() {
        assert_eq!(linearize(0.2, &table()), 1023);
        assert_eq!(linearize(5.0, &table()), 1023);
    }

    #[test]
    fn linear_within_segment_matches_affine_combination() {
        // PWM linearity: for r_a, r_b in the same segment,
        // PWM(alpha*r_a + (1-alpha)*r_b) == alpha*PWM(r_a) +
        // (1-alpha)*PWM(r_b), up to integer rounding.
        let t = table();
        let (r_a, r_b) = (0.06, 0.09);
        let alpha = 0.3;
        let blended = linearize(alpha * r_a + (1.0 - alpha) * r_b, &t) as f64;
        let expected = alpha * linearize(r_a, &t) as f64 + (1.0 - alpha) * linearize(r_b, &t) as f64;
        assert!((blended - expected).abs() <= 1.0, "blended={blended} expected={expected}");
    }
}
