//! Sampling priority
//!
//! Every event stream in the agent is sampled by priority: a float in
//! [0.0, 2.0). Fresh priorities are uniform in [0, 1); transactions chosen
//! by the trace sampler are boosted by exactly 1.0 so that all of their
//! downstream events (spans, errors, logs) outrank unsampled traffic in
//! every reservoir.

use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Weighted-sampling key. Total order via `f32::total_cmp`; the agent never
/// constructs a NaN priority.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct Priority(f32);

impl Priority {
    /// Fresh priority, uniform in [0, 1).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Priority(rng.gen_range(0.0..1.0))
    }

    /// Reconstruct a priority received from an upstream caller. Values
    /// outside [0, 2) are clamped; non-finite input falls back to zero.
    pub fn from_value(value: f32) -> Self {
        if !value.is_finite() {
            return Priority(0.0);
        }
        Priority(value.clamp(0.0, 1.999_999))
    }

    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }

    /// Mark the owning transaction as sampled: +1.0, applied at most once.
    pub fn boost(self) -> Self {
        if self.is_boosted() {
            self
        } else {
            Priority(self.0 + 1.0)
        }
    }

    #[inline]
    pub fn is_boosted(self) -> bool {
        self.0 >= 1.0
    }

    /// Wire rendering for trace context: at most six decimal digits,
    /// trailing zeros trimmed (`1.5`, not `1.500000`).
    pub fn traced(self) -> String {
        let mut s = format!("{:.6}", self.0);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.traced())
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_in_unit_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let p = Priority::random(&mut rng);
            assert!(p.value() >= 0.0 && p.value() < 1.0);
            assert!(!p.is_boosted());
        }
    }

    #[test]
    fn test_boost_is_idempotent() {
        let p = Priority::from_value(0.25).boost();
        assert!(p.is_boosted());
        assert_eq!(p.value(), 1.25);
        assert_eq!(p.boost().value(), 1.25);
    }

    #[test]
    fn test_traced_trims_zeros() {
        assert_eq!(Priority::from_value(1.5).traced(), "1.5");
        assert_eq!(Priority::from_value(0.0).traced(), "0");
        assert_eq!(Priority::from_value(1.0).traced(), "1");
        assert_eq!(Priority::from_value(1.315222).traced(), "1.315222");
    }

    #[test]
    fn test_from_value_clamps() {
        assert_eq!(Priority::from_value(-3.0).value(), 0.0);
        assert!(Priority::from_value(9.0).value() < 2.0);
        assert_eq!(Priority::from_value(f32::NAN).value(), 0.0);
    }

    #[test]
    fn test_total_order() {
        let lo = Priority::from_value(0.1);
        let hi = Priority::from_value(0.9);
        assert!(lo < hi);
        assert_eq!(lo.max(hi), hi);
    }
}
