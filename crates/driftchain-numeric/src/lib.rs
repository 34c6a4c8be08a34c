//! Exact integer arithmetic for on-chain amounts.
//!
//! Every balance, reserve, order quantity and price level in the node is an
//! unsigned integer in the token's smallest unit. Floating-point is never
//! used in state-transition code; all scaling uses the mandated
//! multiply-then-divide, floor-toward-zero pattern.

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the exact-arithmetic helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NumericError {
    /// An intermediate or final value did not fit in the target width.
    #[error("numeric overflow")]
    Overflow,
    /// Division by zero was attempted.
    #[error("division by zero")]
    DivisionByZero,
    /// A decimal string could not be parsed.
    #[error("invalid decimal string: {0}")]
    InvalidDecimal(String),
}

/// An on-chain amount: a non-negative integer in a token's smallest unit.
pub type Amount = U256;

/// The fixed-point scale used for LP fee-growth accumulators (spec: `1e18`).
pub fn fee_growth_scale() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

/// Computes `floor((a * b) / c)` using a widened `U512` intermediate so that
/// the multiplication can never silently wrap, then narrows back to `U256`.
///
/// This is the single `(a * b) / c` pattern mandated for price × quantity and
/// fee accounting throughout the state-transition engine. Division truncates
/// toward zero, which for non-negative operands is the same as flooring.
pub fn mul_div_floor(a: U256, b: U256, c: U256) -> Result<U256, NumericError> {
    if c.is_zero() {
        return Err(NumericError::DivisionByZero);
    }
    let wide = U512::from(a) * U512::from(b);
    let result = wide / U512::from(c);
    U256::try_from(result).map_err(|_| NumericError::Overflow)
}

/// Checked addition returning `NumericError::Overflow` on wraparound.
pub fn checked_add(a: U256, b: U256) -> Result<U256, NumericError> {
    a.checked_add(b).ok_or(NumericError::Overflow)
}

/// Checked subtraction returning `NumericError::Overflow` if `b > a`.
pub fn checked_sub(a: U256, b: U256) -> Result<U256, NumericError> {
    a.checked_sub(b).ok_or(NumericError::Overflow)
}

/// Integer square root via Newton's method, used for the initial LP-token
/// mint on a pool's first deposit (`mint = sqrt(da * db)`).
pub fn isqrt(n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    let mut x = n;
    let mut y = (x + U256::one()) / U256::from(2u8);
    while y < x {
        x = y;
        y = (x + n / x) / U256::from(2u8);
    }
    x
}

/// A token amount paired with the precision (number of decimal digits in the
/// smallest unit) it was minted under, used only for human-facing display
/// and decimal-string (de)serialization of persisted documents — all
/// arithmetic stays in the raw integer domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decimal {
    /// The raw integer value in the token's smallest unit.
    pub raw: U256,
    /// The number of smallest-unit digits per whole token.
    pub precision: u8,
}

impl Decimal {
    /// Builds a `Decimal` from a raw smallest-unit integer and a precision.
    pub fn new(raw: U256, precision: u8) -> Self {
        Self { raw, precision }
    }

    /// The scale factor `10^precision` for this decimal's precision.
    pub fn scale(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.precision as u64))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Persisted collections store amounts as decimal strings in
        // smallest units per the wire format, so displaying the raw
        // integer is the canonical representation.
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Decimal {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw =
            U256::from_dec_str(s).map_err(|_| NumericError::InvalidDecimal(s.to_string()))?;
        Ok(Self { raw, precision: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_floor_basic() {
        // Scenario B from the spec: 100_000_000 * 9970 / 10000 = 99_700_000
        let out = mul_div_floor(U256::from(100_000_000u64), U256::from(9970u64), U256::from(10_000u64)).unwrap();
        assert_eq!(out, U256::from(99_700_000u64));
    }

    #[test]
    fn mul_div_floor_truncates() {
        // 7 * 3 / 2 = 10.5 -> floors to 10
        let out = mul_div_floor(U256::from(7u64), U256::from(3u64), U256::from(2u64)).unwrap();
        assert_eq!(out, U256::from(10u64));
    }

    #[test]
    fn mul_div_floor_rejects_zero_divisor() {
        assert_eq!(
            mul_div_floor(U256::one(), U256::one(), U256::zero()),
            Err(NumericError::DivisionByZero)
        );
    }

    #[test]
    fn mul_div_floor_does_not_overflow_on_large_u256_operands() {
        let a = U256::MAX / U256::from(2u8);
        let b = U256::from(3u64);
        let c = U256::from(3u64);
        // a * 3 would overflow U256, but the widened intermediate handles it,
        // and dividing back by 3 brings the result back into range.
        let out = mul_div_floor(a, b, c).unwrap();
        assert_eq!(out, a);
    }

    #[test]
    fn isqrt_exact_and_floor() {
        assert_eq!(isqrt(U256::from(144u64)), U256::from(12u64));
        assert_eq!(isqrt(U256::from(145u64)), U256::from(12u64));
        assert_eq!(isqrt(U256::zero()), U256::zero());
    }

    proptest::proptest! {
        #[test]
        fn mul_div_floor_matches_u128_math(a in 0u64..1_000_000_000, b in 1u64..1_000_000, c in 1u64..1_000_000) {
            let expected = (a as u128 * b as u128) / c as u128;
            let got = mul_div_floor(U256::from(a), U256::from(b), U256::from(c)).unwrap();
            proptest::prop_assert_eq!(got, U256::from(expected));
        }
    }
}
