//! Small numeric helpers shared by the policy chain's region/tier math.

/// Scales a limit by a floating multiplier, preserving `-1` (unbounded) as
/// a special case that must never be multiplied into a finite number.
pub fn scale(limit: i64, multiplier: f64) -> i64 {
    if limit < 0 {
        return limit;
    }
    ((limit as f64) * multiplier).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_stays_unbounded() {
        assert_eq!(scale(-1, 0.8), -1);
    }

    #[test]
    fn scales_down_for_low_latency_regions() {
        assert_eq!(scale(100, 0.8), 80);
    }

    #[test]
    fn scales_up_for_high_latency_regions() {
        assert_eq!(scale(100, 1.2), 120);
    }
}
