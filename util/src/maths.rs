//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Get the shortest signed angular distance from `current` to `target`.
///
/// Computed with `atan2` so the result is always in `(-pi, pi]` and never
/// takes the long way around the circle. A naive `target - current`
/// subtraction flips sign across the `+/-pi` boundary, which in a closed
/// control loop turns into a full-speed reversal.
pub fn shortest_ang_dist<T>(current: T, target: T) -> T
where
    T: Float,
{
    let diff = target - current;
    diff.sin().atan2(diff.cos())
}

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_shortest_ang_dist() {
        assert!((shortest_ang_dist(1f64, 2f64) - 1f64).abs() < 1e-12);
        assert!((shortest_ang_dist(2f64, 1f64) + 1f64).abs() < 1e-12);

        // Crossing the +/-pi boundary must go the short way round. From 3.0
        // to -3.0 the short path is +0.283 rad through pi, not -6.0 rad.
        let d = shortest_ang_dist(3.0f64, -3.0f64);
        assert!(d.abs() < PI);
        assert!(d > 0f64);
        assert!((d - (2f64 * PI - 6f64)).abs() < 1e-12);

        // And the opposite direction
        let d = shortest_ang_dist(-3.0f64, 3.0f64);
        assert!(d.abs() < PI);
        assert!(d < 0f64);
    }
}
