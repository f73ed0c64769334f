//! Static safety ceilings for every stressor.
//!
//! Requested magnitudes are clamped, never rejected. The ranges are fixed at
//! compile time so every caller (CLI, daemon, library user) gets the same bounds.

#![allow(missing_docs)]

/// Inclusive `[floor, ceiling]` range for one stressor input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapRange {
    pub floor: i64,
    pub ceiling: i64,
}

impl CapRange {
    #[must_use]
    pub const fn new(floor: i64, ceiling: i64) -> Self {
        Self { floor, ceiling }
    }

    /// Clamp `requested` into the range and return it as an unsigned magnitude.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn clamp(self, requested: i64) -> u64 {
        let v = if requested < self.floor {
            self.floor
        } else if requested > self.ceiling {
            self.ceiling
        } else {
            requested
        };
        // Every floor is non-negative.
        v as u64
    }

    #[must_use]
    pub const fn contains(self, value: i64) -> bool {
        value >= self.floor && value <= self.ceiling
    }
}

/// CPU loop iterations.
pub const CPU_ITERATIONS: CapRange = CapRange::new(0, 7_000_000);
/// Memory to allocate, in MiB.
pub const MEMORY_MB: CapRange = CapRange::new(1, 1_000);
/// Database insert operations.
pub const DATABASE_OPS: CapRange = CapRange::new(1, 10_000);
/// Combined stress wall-clock duration, in seconds.
pub const COMBINED_SECS: CapRange = CapRange::new(1, 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_boundaries() {
        assert_eq!(CPU_ITERATIONS.clamp(-1), 0);
        assert_eq!(CPU_ITERATIONS.clamp(0), 0);
        assert_eq!(CPU_ITERATIONS.clamp(7_000_000), 7_000_000);
        assert_eq!(CPU_ITERATIONS.clamp(7_000_001), 7_000_000);
        assert_eq!(MEMORY_MB.clamp(-5), 1);
        assert_eq!(MEMORY_MB.clamp(1_001), 1_000);
        assert_eq!(DATABASE_OPS.clamp(0), 1);
        assert_eq!(DATABASE_OPS.clamp(50_000), 10_000);
        assert_eq!(COMBINED_SECS.clamp(0), 1);
        assert_eq!(COMBINED_SECS.clamp(i64::MAX), 60);
        assert_eq!(COMBINED_SECS.clamp(i64::MIN), 1);
    }

    #[test]
    fn contains_is_inclusive() {
        assert!(MEMORY_MB.contains(1));
        assert!(MEMORY_MB.contains(1_000));
        assert!(!MEMORY_MB.contains(0));
        assert!(!MEMORY_MB.contains(1_001));
    }
}
