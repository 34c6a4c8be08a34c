//! Constant-product AMM math.
//!
//! Every reserve update goes through [`mul_div_floor`], never a plain `*`
//! or `/`, so results are bit-for-bit reproducible across nodes regardless
//! of target architecture. The full input amount (fee included) is added to
//! the input reserve on every swap, so `reserve_a * reserve_b` never falls
//! below its pre-swap value; the fee is additionally tracked in the pool's
//! fee-growth accumulators so LPs can claim their share independently of
//! withdrawing liquidity.

use driftchain_numeric::{fee_growth_scale, isqrt, mul_div_floor, Amount, NumericError};
use driftchain_types::pool::LiquidityPool;

const BPS_DENOMINATOR: u64 = 10_000;

/// The result of quoting (or executing) a swap against one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    /// The token symbol received.
    pub token_out: String,
    /// The amount of `token_out` the trader receives.
    pub amount_out: Amount,
    /// The fee charged, denominated in `token_in`.
    pub fee_amount: Amount,
}

/// Quotes (without mutating `pool`) the output of selling `amount_in` of
/// `token_in` at `fee_bps` basis points.
pub fn quote_swap_exact_in(
    pool: &LiquidityPool,
    token_in: &str,
    amount_in: Amount,
    fee_bps: u32,
) -> Result<SwapQuote, NumericError> {
    let (token_out, reserve_out) = pool
        .other_side(token_in)
        .ok_or(NumericError::InvalidDecimal("token not in pool".to_string()))?;
    let reserve_in = if pool.token_a == token_in {
        pool.reserve_a
    } else {
        pool.reserve_b
    };

    let fee_amount = mul_div_floor(amount_in, Amount::from(fee_bps), Amount::from(BPS_DENOMINATOR))?;
    let amount_after_fee = amount_in
        .checked_sub(fee_amount)
        .ok_or(NumericError::Overflow)?;

    // The fee stays in the reserve (Rin' = Rin + din, full input); only the
    // output-side denominator uses the post-fee amount.
    let denom = reserve_in
        .checked_add(amount_after_fee)
        .ok_or(NumericError::Overflow)?;
    let amount_out = mul_div_floor(amount_after_fee, reserve_out, denom)?;

    Ok(SwapQuote {
        token_out: token_out.to_string(),
        amount_out,
        fee_amount,
    })
}

/// Applies a swap to `pool` in place: moves `amount_in_net` into the input
/// reserve, moves `quote.amount_out` out of the output reserve, and
/// accrues `quote.fee_amount` into the input side's fee-growth
/// accumulator, distributed pro-rata over `pool.total_lp_tokens`.
pub fn apply_swap(
    pool: &mut LiquidityPool,
    token_in: &str,
    amount_in: Amount,
    quote: &SwapQuote,
    now_ms: i64,
) -> Result<(), NumericError> {
    if pool.token_a == token_in {
        pool.reserve_a = pool
            .reserve_a
            .checked_add(amount_in)
            .ok_or(NumericError::Overflow)?;
        pool.reserve_b = pool
            .reserve_b
            .checked_sub(quote.amount_out)
            .ok_or(NumericError::Overflow)?;
        if !pool.total_lp_tokens.is_zero() {
            let growth = mul_div_floor(quote.fee_amount, fee_growth_scale(), pool.total_lp_tokens)?;
            pool.fee_growth_a = pool
                .fee_growth_a
                .checked_add(growth)
                .ok_or(NumericError::Overflow)?;
        }
    } else {
        pool.reserve_b = pool
            .reserve_b
            .checked_add(amount_in)
            .ok_or(NumericError::Overflow)?;
        pool.reserve_a = pool
            .reserve_a
            .checked_sub(quote.amount_out)
            .ok_or(NumericError::Overflow)?;
        if !pool.total_lp_tokens.is_zero() {
            let growth = mul_div_floor(quote.fee_amount, fee_growth_scale(), pool.total_lp_tokens)?;
            pool.fee_growth_b = pool
                .fee_growth_b
                .checked_add(growth)
                .ok_or(NumericError::Overflow)?;
        }
    }
    pool.last_updated_at = now_ms;
    Ok(())
}

/// The LP tokens minted and actual reserve deltas for a deposit of up to
/// `desired_a`/`desired_b`. On a pool's first deposit, `mint = sqrt(a * b)`
/// and the full desired amounts are taken. On subsequent deposits, the
/// deposit is clamped to the pool's current ratio so neither side is
/// diluted, and LP tokens mint proportionally to the existing supply.
pub struct MintQuote {
    /// LP tokens minted to the depositor.
    pub lp_minted: Amount,
    /// Actual `token_a` taken (may be less than `desired_a`).
    pub taken_a: Amount,
    /// Actual `token_b` taken (may be less than `desired_b`).
    pub taken_b: Amount,
}

/// Quotes an `AddLiquidity` deposit without mutating `pool`.
pub fn quote_add_liquidity(
    pool: &LiquidityPool,
    desired_a: Amount,
    desired_b: Amount,
) -> Result<MintQuote, NumericError> {
    if pool.total_lp_tokens.is_zero() {
        let lp_minted = isqrt(
            desired_a
                .checked_mul(desired_b)
                .ok_or(NumericError::Overflow)?,
        );
        return Ok(MintQuote {
            lp_minted,
            taken_a: desired_a,
            taken_b: desired_b,
        });
    }

    // Clamp to the pool's current ratio: try taking all of desired_a and a
    // matching amount of b; if that would exceed desired_b, do the reverse.
    let matching_b = mul_div_floor(desired_a, pool.reserve_b, pool.reserve_a)?;
    let (taken_a, taken_b) = if matching_b <= desired_b {
        (desired_a, matching_b)
    } else {
        let matching_a = mul_div_floor(desired_b, pool.reserve_a, pool.reserve_b)?;
        (matching_a, desired_b)
    };

    let lp_minted = mul_div_floor(taken_a, pool.total_lp_tokens, pool.reserve_a)?;
    Ok(MintQuote {
        lp_minted,
        taken_a,
        taken_b,
    })
}

/// Applies a deposit to `pool` in place.
pub fn apply_add_liquidity(
    pool: &mut LiquidityPool,
    quote: &MintQuote,
    now_ms: i64,
) -> Result<(), NumericError> {
    pool.reserve_a = pool
        .reserve_a
        .checked_add(quote.taken_a)
        .ok_or(NumericError::Overflow)?;
    pool.reserve_b = pool
        .reserve_b
        .checked_add(quote.taken_b)
        .ok_or(NumericError::Overflow)?;
    pool.total_lp_tokens = pool
        .total_lp_tokens
        .checked_add(quote.lp_minted)
        .ok_or(NumericError::Overflow)?;
    pool.last_updated_at = now_ms;
    Ok(())
}

/// The reserves released by burning `lp_amount` of a pool's LP tokens.
pub struct BurnQuote {
    /// `token_a` released to the withdrawer.
    pub out_a: Amount,
    /// `token_b` released to the withdrawer.
    pub out_b: Amount,
}

/// Quotes a `RemoveLiquidity` withdrawal without mutating `pool`.
pub fn quote_remove_liquidity(
    pool: &LiquidityPool,
    lp_amount: Amount,
) -> Result<BurnQuote, NumericError> {
    if pool.total_lp_tokens.is_zero() {
        return Err(NumericError::DivisionByZero);
    }
    let out_a = mul_div_floor(lp_amount, pool.reserve_a, pool.total_lp_tokens)?;
    let out_b = mul_div_floor(lp_amount, pool.reserve_b, pool.total_lp_tokens)?;
    Ok(BurnQuote { out_a, out_b })
}

/// Applies a withdrawal to `pool` in place.
pub fn apply_remove_liquidity(
    pool: &mut LiquidityPool,
    lp_amount: Amount,
    quote: &BurnQuote,
    now_ms: i64,
) -> Result<(), NumericError> {
    pool.reserve_a = pool
        .reserve_a
        .checked_sub(quote.out_a)
        .ok_or(NumericError::Overflow)?;
    pool.reserve_b = pool
        .reserve_b
        .checked_sub(quote.out_b)
        .ok_or(NumericError::Overflow)?;
    pool.total_lp_tokens = pool
        .total_lp_tokens
        .checked_sub(lp_amount)
        .ok_or(NumericError::Overflow)?;
    pool.last_updated_at = now_ms;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_pool() -> LiquidityPool {
        let mut pool = LiquidityPool::new("DRIFT".into(), "USDT".into(), 0);
        pool.reserve_a = Amount::from(1_000_000u64);
        pool.reserve_b = Amount::from(2_000_000u64);
        pool.total_lp_tokens = Amount::from(1_414_213u64);
        pool
    }

    #[test]
    fn swap_decreases_output_reserve_and_increases_input_reserve() {
        let mut pool = seeded_pool();
        let quote = quote_swap_exact_in(&pool, "DRIFT", Amount::from(100_000u64), 30).unwrap();
        apply_swap(&mut pool, "DRIFT", Amount::from(100_000u64), &quote, 1).unwrap();
        assert!(pool.reserve_a > Amount::from(1_000_000u64));
        assert!(pool.reserve_b < Amount::from(2_000_000u64));
        assert!(pool.fee_growth_a > Amount::from(0u64));
    }

    #[test]
    fn first_deposit_mints_sqrt_of_product() {
        let pool = LiquidityPool::new("DRIFT".into(), "USDT".into(), 0);
        let quote = quote_add_liquidity(&pool, Amount::from(100u64), Amount::from(400u64)).unwrap();
        assert_eq!(quote.lp_minted, Amount::from(200u64));
    }

    #[test]
    fn add_liquidity_clamps_to_existing_ratio() {
        let pool = seeded_pool();
        // Ratio is 1:2 (a:b). Offering 10:10 should clamp b down to 20.
        let quote = quote_add_liquidity(&pool, Amount::from(10u64), Amount::from(10u64)).unwrap();
        assert_eq!(quote.taken_a, Amount::from(10u64));
        assert_eq!(quote.taken_b, Amount::from(20u64));
    }

    #[test]
    fn remove_liquidity_returns_proportional_reserves() {
        let pool = seeded_pool();
        let half = pool.total_lp_tokens / Amount::from(2u64);
        let quote = quote_remove_liquidity(&pool, half).unwrap();
        assert_eq!(quote.out_a, pool.reserve_a / Amount::from(2u64));
        assert_eq!(quote.out_b, pool.reserve_b / Amount::from(2u64));
    }

    proptest::proptest! {
        #[test]
        fn swap_never_increases_constant_product_k_beyond_fee_tolerance(
            reserve_a in 1_000u64..1_000_000_000,
            reserve_b in 1_000u64..1_000_000_000,
            amount_in in 1u64..100_000,
        ) {
            let mut pool = LiquidityPool::new("DRIFT".into(), "USDT".into(), 0);
            pool.reserve_a = Amount::from(reserve_a);
            pool.reserve_b = Amount::from(reserve_b);
            pool.total_lp_tokens = Amount::from(1u64);
            let k_before = pool.reserve_a * pool.reserve_b;
            let quote = quote_swap_exact_in(&pool, "DRIFT", Amount::from(amount_in), 30).unwrap();
            apply_swap(&mut pool, "DRIFT", Amount::from(amount_in), &quote, 0).unwrap();
            let k_after = pool.reserve_a * pool.reserve_b;
            proptest::prop_assert!(k_after >= k_before);
        }
    }
}
