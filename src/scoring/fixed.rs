use std::ops::{Add, AddAssign};
use serde::{Deserialize, Serialize};

/// One in 24.8 fixed point.
pub const FX_ONE: i64 = 256;

/// A relevance score in 24.8 fixed point.
///
/// Opaque on purpose: ranking only ever compares scores, so the integer
/// representation never leaks. `to_f64` exists for display.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Score(i64);

impl Score {
    pub const ZERO: Score = Score(0);

    pub fn from_raw(raw: i64) -> Self {
        Score(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// For display only; the core never computes with floats.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / FX_ONE as f64
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score(self.0 + rhs.0)
    }
}

impl AddAssign for Score {
    fn add_assign(&mut self, rhs: Score) {
        self.0 += rhs.0;
    }
}

/// log2(v) in 24.8 fixed point; 0 for v == 0.
///
/// Integer part from the leading-zero count, fractional part from linear
/// interpolation of the remainder above the nearest power of two. The
/// interpolation error stays under ~0.04, which ranking tolerates.
pub fn log2_fx(v: u64) -> i64 {
    if v == 0 {
        return 0;
    }
    let k = 63 - v.leading_zeros() as i64;
    let base = 1u64 << k;
    let rem = v - base;
    let frac = ((rem as u128 * FX_ONE as u128) / base as u128) as i64;
    k * FX_ONE + frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log2_exact_powers() {
        for k in 0..=62u32 {
            assert_eq!(log2_fx(1u64 << k), k as i64 * 256, "2^{}", k);
        }
    }

    #[test]
    fn test_log2_zero() {
        assert_eq!(log2_fx(0), 0);
    }

    #[test]
    fn test_log2_monotonic() {
        let mut prev = log2_fx(1);
        for v in 2..2048u64 {
            let cur = log2_fx(v);
            assert!(cur >= prev, "log2_fx({}) regressed", v);
            prev = cur;
        }
    }

    #[test]
    fn test_log2_interpolation_error() {
        // 3 -> log2(3) = 1.585, interpolated as 1.5 (384/256).
        assert_eq!(log2_fx(3), 384);
        let exact = (3f64).log2();
        let approx = 384.0 / 256.0;
        assert!((exact - approx).abs() < 0.09);
    }

    #[test]
    fn test_score_display_conversion() {
        assert_eq!(Score::from_raw(384).to_f64(), 1.5);
        assert!(Score::ZERO.is_zero());
        let mut s = Score::from_raw(100);
        s += Score::from_raw(28);
        assert_eq!(s.raw(), 128);
    }
}
