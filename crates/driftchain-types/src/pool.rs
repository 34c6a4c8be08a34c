//! Constant-product automated market maker pools.

use driftchain_numeric::{fee_growth_scale, Amount};
use serde::{Deserialize, Serialize};

/// A pool id: deterministically derived from its two token symbols so that
/// `CreatePool` is idempotent regardless of argument order.
pub type PoolId = String;

/// Builds the canonical pool id for an unordered token pair: the symbols
/// sorted lexicographically and joined with `/`.
pub fn canonical_pool_id(token_a: &str, token_b: &str) -> PoolId {
    if token_a <= token_b {
        format!("{token_a}/{token_b}")
    } else {
        format!("{token_b}/{token_a}")
    }
}

/// A constant-product liquidity pool for one token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    /// The canonical pool id (`canonical_pool_id(token_a, token_b)`).
    pub id: PoolId,
    /// The lexicographically smaller token symbol.
    pub token_a: String,
    /// The lexicographically larger token symbol.
    pub token_b: String,
    /// Current reserve of `token_a`.
    pub reserve_a: Amount,
    /// Current reserve of `token_b`.
    pub reserve_b: Amount,
    /// Total LP tokens outstanding for this pool.
    pub total_lp_tokens: Amount,
    /// Cumulative fee growth per LP token for `token_a`, scaled by
    /// [`driftchain_numeric::fee_growth_scale`].
    pub fee_growth_a: Amount,
    /// Cumulative fee growth per LP token for `token_b`, scaled the same way.
    pub fee_growth_b: Amount,
    /// Unix millis of the most recent swap or liquidity change.
    pub last_updated_at: i64,
}

impl LiquidityPool {
    /// Builds an empty pool for a freshly canonicalized token pair.
    pub fn new(token_a: String, token_b: String, created_at: i64) -> Self {
        let id = canonical_pool_id(&token_a, &token_b);
        let (token_a, token_b) = if token_a <= token_b {
            (token_a, token_b)
        } else {
            (token_b, token_a)
        };
        Self {
            id,
            token_a,
            token_b,
            reserve_a: Amount::from(0u64),
            reserve_b: Amount::from(0u64),
            total_lp_tokens: Amount::from(0u64),
            fee_growth_a: Amount::from(0u64),
            fee_growth_b: Amount::from(0u64),
            last_updated_at: created_at,
        }
    }

    /// The pool's constant-product invariant `k = reserve_a * reserve_b`.
    pub fn has_liquidity(&self) -> bool {
        !self.reserve_a.is_zero() && !self.reserve_b.is_zero()
    }

    /// Whether `token` is one of this pool's two sides.
    pub fn has_token(&self, token: &str) -> bool {
        self.token_a == token || self.token_b == token
    }

    /// The reserve and symbol of the other side of `token`, if `token` is
    /// one of this pool's sides.
    pub fn other_side(&self, token: &str) -> Option<(&str, Amount)> {
        if self.token_a == token {
            Some((&self.token_b, self.reserve_b))
        } else if self.token_b == token {
            Some((&self.token_a, self.reserve_a))
        } else {
            None
        }
    }
}

/// A liquidity provider's claim on a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpPosition {
    /// The owning account.
    pub user: String,
    /// The pool this position is in.
    pub pool_id: PoolId,
    /// LP tokens currently held.
    pub lp_balance: Amount,
    /// `fee_growth_a` at the time this position's unclaimed fees were last
    /// settled; used to compute newly accrued fees on the next touch.
    pub fee_growth_a_checkpoint: Amount,
    /// `fee_growth_b` at the time this position's unclaimed fees were last
    /// settled.
    pub fee_growth_b_checkpoint: Amount,
}

impl LpPosition {
    /// Builds a fresh zero-balance position checkpointed at the pool's
    /// current fee-growth accumulators.
    pub fn new(user: String, pool: &LiquidityPool) -> Self {
        Self {
            user,
            pool_id: pool.id.clone(),
            lp_balance: Amount::from(0u64),
            fee_growth_a_checkpoint: pool.fee_growth_a,
            fee_growth_b_checkpoint: pool.fee_growth_b,
        }
    }

    /// Fees accrued on each side since the last checkpoint, given the pool's
    /// current accumulators.
    pub fn accrued_fees(
        &self,
        pool: &LiquidityPool,
    ) -> Result<(Amount, Amount), driftchain_numeric::NumericError> {
        let scale = fee_growth_scale();
        let delta_a = pool
            .fee_growth_a
            .checked_sub(self.fee_growth_a_checkpoint)
            .unwrap_or_default();
        let delta_b = pool
            .fee_growth_b
            .checked_sub(self.fee_growth_b_checkpoint)
            .unwrap_or_default();
        let fees_a = driftchain_numeric::mul_div_floor(delta_a, self.lp_balance, scale)?;
        let fees_b = driftchain_numeric::mul_div_floor(delta_b, self.lp_balance, scale)?;
        Ok((fees_a, fees_b))
    }
}
