//! Transaction execution: dispatches each [`TxData`] variant against a
//! [`Cache`], mutating accounts, tokens, pools and the orderbook.
//!
//! Every call to [`StateEngine::process_transaction`] opens its own
//! checkpoint and either commits it (on success) or rolls it back (on any
//! error), so a single failing transaction in a block never leaves partial
//! writes behind for the transactions around it.

use driftchain_numeric::Amount;
use driftchain_storage::{Cache, DocStore};
use driftchain_types::account::{Account, AccountName};
use driftchain_types::error::{StorageError, TransactionError};
use driftchain_types::keys::{
    position_doc_id, COLLECTION_ACCOUNTS, COLLECTION_ORDERS, COLLECTION_POOLS, COLLECTION_POSITIONS,
    COLLECTION_TOKENS, COLLECTION_TRADES, COLLECTION_WITNESSES,
};
use driftchain_types::order::{Order, OrderStatus, OrderType, Side};
use driftchain_types::pool::{canonical_pool_id, LiquidityPool, LpPosition};
use driftchain_types::token::Token;
use driftchain_types::trade::Trade;
use driftchain_types::tx::TxData;
use driftchain_types::witness::WitnessInfo;
use driftchain_types::Transaction;

use crate::amm;
use crate::orderbook;
use crate::router;

fn storage_err(e: StorageError) -> TransactionError {
    TransactionError::ExecutionDivergence(format!("storage error: {e}"))
}

fn numeric_err(e: driftchain_numeric::NumericError) -> TransactionError {
    TransactionError::Numeric(e)
}

fn parse_pair(pair: &str) -> Result<(&str, &str), TransactionError> {
    pair.split_once('/')
        .ok_or_else(|| TransactionError::ValidationFail(format!("malformed pair: {pair}")))
}

/// Deterministic state transition over a write-through cache.
pub struct StateEngine<S: DocStore> {
    cache: Cache<S>,
    amm_fee_bps: u32,
}

impl<S: DocStore> StateEngine<S> {
    /// Builds an engine over `cache`, charging `amm_fee_bps` basis points
    /// on every AMM swap.
    pub fn new(cache: Cache<S>, amm_fee_bps: u32) -> Self {
        Self { cache, amm_fee_bps }
    }

    /// Borrows the underlying cache, for callers (block finalization,
    /// genesis seeding) that need direct document access.
    pub fn cache(&self) -> &Cache<S> {
        &self.cache
    }

    /// Mutably borrows the underlying cache.
    pub fn cache_mut(&mut self) -> &mut Cache<S> {
        &mut self.cache
    }

    fn get_account(&self, name: &str) -> Result<Option<Account>, TransactionError> {
        self.cache.get(COLLECTION_ACCOUNTS, name).map_err(storage_err)
    }

    fn require_account(&self, name: &str) -> Result<Account, TransactionError> {
        self.get_account(name)?
            .ok_or_else(|| TransactionError::UnknownAccount(name.to_string()))
    }

    fn put_account(&mut self, account: &Account) -> Result<(), TransactionError> {
        self.cache
            .put(COLLECTION_ACCOUNTS, &account.name, account)
            .map_err(storage_err)
    }

    fn get_or_create_account(&mut self, name: &str, now_ms: i64) -> Result<Account, TransactionError> {
        match self.get_account(name)? {
            Some(account) => Ok(account),
            None => Ok(Account::new(name.to_string(), String::new(), now_ms)),
        }
    }

    fn credit(&mut self, account: &mut Account, token: &str, amount: Amount) -> Result<(), TransactionError> {
        let balance = account.balance_of(token);
        let updated = balance.checked_add(amount).ok_or(driftchain_numeric::NumericError::Overflow).map_err(numeric_err)?;
        account.balances.insert(token.to_string(), updated);
        Ok(())
    }

    fn debit(&mut self, account: &mut Account, token: &str, amount: Amount) -> Result<(), TransactionError> {
        let balance = account.balance_of(token);
        if balance < amount {
            return Err(TransactionError::InsufficientBalance {
                have: balance.to_string(),
                need: amount.to_string(),
            });
        }
        account.balances.insert(token.to_string(), balance - amount);
        Ok(())
    }

    fn get_token(&self, symbol: &str) -> Result<Token, TransactionError> {
        self.cache
            .get(COLLECTION_TOKENS, symbol)
            .map_err(storage_err)?
            .ok_or_else(|| TransactionError::UnknownToken(symbol.to_string()))
    }

    fn put_token(&mut self, token: &Token) -> Result<(), TransactionError> {
        self.cache.put(COLLECTION_TOKENS, &token.symbol, token).map_err(storage_err)
    }

    fn get_pool(&self, pool_id: &str) -> Result<LiquidityPool, TransactionError> {
        self.cache
            .get(COLLECTION_POOLS, pool_id)
            .map_err(storage_err)?
            .ok_or_else(|| TransactionError::UnknownPool(pool_id.to_string()))
    }

    fn put_pool(&mut self, pool: &LiquidityPool) -> Result<(), TransactionError> {
        self.cache.put(COLLECTION_POOLS, &pool.id, pool).map_err(storage_err)
    }

    fn all_pools(&self) -> Result<Vec<LiquidityPool>, TransactionError> {
        let raw = self.cache.scan_raw(COLLECTION_POOLS).map_err(storage_err)?;
        raw.into_iter()
            .map(|(_, bytes)| {
                driftchain_types::codec::from_bytes_canonical(&bytes).map_err(|e| {
                    TransactionError::ExecutionDivergence(format!("corrupt pool document: {e}"))
                })
            })
            .collect()
    }

    fn get_position(&self, user: &str, pool_id: &str) -> Result<Option<LpPosition>, TransactionError> {
        self.cache
            .get(COLLECTION_POSITIONS, &position_doc_id(user, pool_id))
            .map_err(storage_err)
    }

    fn put_position(&mut self, position: &LpPosition) -> Result<(), TransactionError> {
        let id = position_doc_id(&position.user, &position.pool_id);
        self.cache.put(COLLECTION_POSITIONS, &id, position).map_err(storage_err)
    }

    fn get_order(&self, order_id: &str) -> Result<Order, TransactionError> {
        self.cache
            .get(COLLECTION_ORDERS, order_id)
            .map_err(storage_err)?
            .ok_or_else(|| TransactionError::UnknownOrder(order_id.to_string()))
    }

    fn put_order(&mut self, order: &Order) -> Result<(), TransactionError> {
        self.cache.put(COLLECTION_ORDERS, &order.id, order).map_err(storage_err)
    }

    fn resting_orders(&self, pair: &str, side: Side) -> Result<Vec<Order>, TransactionError> {
        let raw = self.cache.scan_raw(COLLECTION_ORDERS).map_err(storage_err)?;
        let mut out = Vec::new();
        for (_, bytes) in raw {
            let order: Order = driftchain_types::codec::from_bytes_canonical(&bytes)
                .map_err(|e| TransactionError::ExecutionDivergence(format!("corrupt order: {e}")))?;
            if order.pair == pair && order.side == side && order.is_open() {
                out.push(order);
            }
        }
        orderbook::sort_book(side, &mut out);
        Ok(out)
    }

    fn put_trade(&mut self, trade: &Trade) -> Result<(), TransactionError> {
        self.cache.put(COLLECTION_TRADES, &trade.id, trade).map_err(storage_err)
    }

    /// Settles a position's accrued fees directly into the owner's account
    /// balances and advances its fee-growth checkpoint, called whenever a
    /// position's LP balance is about to change.
    fn settle_position_fees(
        &mut self,
        position: &mut LpPosition,
        pool: &LiquidityPool,
    ) -> Result<(), TransactionError> {
        let (fees_a, fees_b) = position.accrued_fees(pool).map_err(numeric_err)?;
        if !fees_a.is_zero() || !fees_b.is_zero() {
            let mut owner = self.require_account(&position.user)?;
            if !fees_a.is_zero() {
                self.credit(&mut owner, &pool.token_a, fees_a)?;
            }
            if !fees_b.is_zero() {
                self.credit(&mut owner, &pool.token_b, fees_b)?;
            }
            self.put_account(&owner)?;
        }
        position.fee_growth_a_checkpoint = pool.fee_growth_a;
        position.fee_growth_b_checkpoint = pool.fee_growth_b;
        Ok(())
    }

    /// Swaps `amount_in` of `token_in` through a specific chain of pools,
    /// crediting/debiting `sender`'s balances and returning the total fee
    /// paid, denominated in whichever token was sold at each hop.
    fn swap_along_path(
        &mut self,
        sender: &mut Account,
        path: &[String],
        mut token_in: String,
        mut amount_in: Amount,
        min_amount_out: Amount,
        now_ms: i64,
    ) -> Result<u128, TransactionError> {
        self.debit(sender, &token_in, amount_in)?;
        let mut total_fee_units: u128 = 0;
        for pool_id in path {
            let mut pool = self.get_pool(pool_id)?;
            if !pool.has_token(&token_in) {
                return Err(TransactionError::ValidationFail(format!(
                    "pool {pool_id} does not hold token {token_in}"
                )));
            }
            let quote = amm::quote_swap_exact_in(&pool, &token_in, amount_in, self.amm_fee_bps)
                .map_err(numeric_err)?;
            amm::apply_swap(&mut pool, &token_in, amount_in, &quote, now_ms).map_err(numeric_err)?;
            total_fee_units = total_fee_units.saturating_add(quote.fee_amount.low_u128());
            self.put_pool(&pool)?;
            token_in = quote.token_out;
            amount_in = quote.amount_out;
        }
        if amount_in < min_amount_out {
            return Err(TransactionError::SlippageExceeded {
                min_out: min_amount_out.to_string(),
                realized: amount_in.to_string(),
            });
        }
        self.credit(sender, &token_in, amount_in)?;
        Ok(total_fee_units)
    }

    /// Executes one transaction, returning the distribution amount it
    /// contributes to the block's `dist` total. Any error leaves the cache
    /// exactly as it was before this call (the caller is expected to wrap
    /// this in a checkpoint/rollback pair; see `process_transaction`).
    fn dispatch(&mut self, tx: &Transaction) -> Result<u128, TransactionError> {
        let now_ms = tx.timestamp;
        match &tx.data {
            TxData::CreateAccount { name, public_key } => {
                if self.get_account(name)?.is_some() {
                    return Err(TransactionError::ValidationFail(format!(
                        "account {name} already exists"
                    )));
                }
                let account = Account::new(name.clone(), public_key.clone(), now_ms);
                self.put_account(&account)?;
                Ok(0)
            }

            TxData::Transfer { to, token, amount } => {
                let mut sender = self.require_account(&tx.sender)?;
                self.debit(&mut sender, token, *amount)?;
                self.put_account(&sender)?;
                let mut recipient = self.get_or_create_account(to, now_ms)?;
                self.credit(&mut recipient, token, *amount)?;
                self.put_account(&recipient)?;
                Ok(0)
            }

            TxData::IssueToken {
                symbol,
                precision,
                max_supply,
                initial_supply,
                mintable,
            } => {
                if self.cache.get::<Token>(COLLECTION_TOKENS, symbol).map_err(storage_err)?.is_some() {
                    return Err(TransactionError::ValidationFail(format!(
                        "token {symbol} already exists"
                    )));
                }
                if !max_supply.is_zero() && *initial_supply > *max_supply {
                    return Err(TransactionError::ValidationFail(
                        "initial supply exceeds max supply".to_string(),
                    ));
                }
                let token = Token {
                    symbol: symbol.clone(),
                    precision: *precision,
                    max_supply: *max_supply,
                    current_supply: *initial_supply,
                    mintable: *mintable,
                    creator: tx.sender.clone(),
                };
                self.put_token(&token)?;
                let mut creator = self.require_account(&tx.sender)?;
                self.credit(&mut creator, symbol, *initial_supply)?;
                self.put_account(&creator)?;
                Ok(0)
            }

            TxData::Mint { symbol, to, amount } => {
                let mut token = self.get_token(symbol)?;
                if token.creator != tx.sender {
                    return Err(TransactionError::ValidationFail(
                        "only the token creator may mint".to_string(),
                    ));
                }
                if !token.mintable {
                    return Err(TransactionError::ValidationFail(format!(
                        "token {symbol} is not mintable"
                    )));
                }
                if !token.can_mint(*amount) {
                    return Err(TransactionError::ValidationFail(format!(
                        "minting {amount} would exceed max supply"
                    )));
                }
                token.current_supply = token.current_supply.checked_add(*amount).ok_or(
                    driftchain_numeric::NumericError::Overflow,
                ).map_err(numeric_err)?;
                self.put_token(&token)?;
                let mut recipient = self.get_or_create_account(to, now_ms)?;
                self.credit(&mut recipient, symbol, *amount)?;
                self.put_account(&recipient)?;
                Ok(0)
            }

            TxData::Vote { witnesses } => {
                let mut voter = self.require_account(&tx.sender)?;
                let old_weight = voter.last_vote_weight;
                let new_weight = voter.balance_of("DRIFT");

                for old_witness in &voter.voted_witnesses {
                    if let Some(mut info) = self
                        .cache
                        .get::<WitnessInfo>(COLLECTION_WITNESSES, old_witness)
                        .map_err(storage_err)?
                    {
                        info.vote_weight = info.vote_weight.checked_sub(old_weight).unwrap_or_default();
                        self.cache.put(COLLECTION_WITNESSES, old_witness, &info).map_err(storage_err)?;
                    }
                }
                for new_witness in witnesses {
                    let mut info = self
                        .cache
                        .get::<WitnessInfo>(COLLECTION_WITNESSES, new_witness)
                        .map_err(storage_err)?
                        .ok_or_else(|| TransactionError::ValidationFail(format!(
                            "{new_witness} is not a registered witness"
                        )))?;
                    info.vote_weight = info.vote_weight.checked_add(new_weight).ok_or(
                        driftchain_numeric::NumericError::Overflow,
                    ).map_err(numeric_err)?;
                    self.cache.put(COLLECTION_WITNESSES, new_witness, &info).map_err(storage_err)?;
                }
                voter.voted_witnesses = witnesses.clone();
                voter.last_vote_weight = new_weight;
                self.put_account(&voter)?;
                Ok(0)
            }

            TxData::RegisterWitness { network_address } => {
                self.require_account(&tx.sender)?;
                let info = WitnessInfo {
                    account: tx.sender.clone(),
                    network_address: network_address.clone(),
                    vote_weight: self
                        .cache
                        .get::<WitnessInfo>(COLLECTION_WITNESSES, &tx.sender)
                        .map_err(storage_err)?
                        .map(|i| i.vote_weight)
                        .unwrap_or_default(),
                    registered_at: now_ms,
                };
                self.cache.put(COLLECTION_WITNESSES, &tx.sender, &info).map_err(storage_err)?;
                Ok(0)
            }

            TxData::CreatePool { token_a, token_b } => {
                self.get_token(token_a)?;
                self.get_token(token_b)?;
                let id = canonical_pool_id(token_a, token_b);
                if self.cache.get::<LiquidityPool>(COLLECTION_POOLS, &id).map_err(storage_err)?.is_some() {
                    return Err(TransactionError::ValidationFail(format!("pool {id} already exists")));
                }
                let pool = LiquidityPool::new(token_a.clone(), token_b.clone(), now_ms);
                self.put_pool(&pool)?;
                Ok(0)
            }

            TxData::AddLiquidity {
                pool_id,
                amount_a,
                amount_b,
                min_lp_out,
            } => {
                let mut pool = self.get_pool(pool_id)?;
                let mut sender = self.require_account(&tx.sender)?;
                let mut position = match self.get_position(&tx.sender, pool_id)? {
                    Some(mut p) => {
                        self.settle_position_fees(&mut p, &pool)?;
                        p
                    }
                    None => LpPosition::new(tx.sender.clone(), &pool),
                };

                let quote = amm::quote_add_liquidity(&pool, *amount_a, *amount_b).map_err(numeric_err)?;
                if quote.lp_minted < *min_lp_out {
                    return Err(TransactionError::SlippageExceeded {
                        min_out: min_lp_out.to_string(),
                        realized: quote.lp_minted.to_string(),
                    });
                }
                self.debit(&mut sender, &pool.token_a, quote.taken_a)?;
                self.debit(&mut sender, &pool.token_b, quote.taken_b)?;
                amm::apply_add_liquidity(&mut pool, &quote, now_ms).map_err(numeric_err)?;
                position.lp_balance = position.lp_balance.checked_add(quote.lp_minted).ok_or(
                    driftchain_numeric::NumericError::Overflow,
                ).map_err(numeric_err)?;
                position.fee_growth_a_checkpoint = pool.fee_growth_a;
                position.fee_growth_b_checkpoint = pool.fee_growth_b;

                self.put_pool(&pool)?;
                self.put_position(&position)?;
                self.put_account(&sender)?;
                Ok(0)
            }

            TxData::RemoveLiquidity {
                pool_id,
                lp_amount,
                min_a_out,
                min_b_out,
            } => {
                let mut pool = self.get_pool(pool_id)?;
                let mut position = self
                    .get_position(&tx.sender, pool_id)?
                    .ok_or_else(|| TransactionError::ValidationFail("no liquidity position".to_string()))?;
                self.settle_position_fees(&mut position, &pool)?;
                if *lp_amount > position.lp_balance {
                    return Err(TransactionError::InsufficientBalance {
                        have: position.lp_balance.to_string(),
                        need: lp_amount.to_string(),
                    });
                }
                let quote = amm::quote_remove_liquidity(&pool, *lp_amount).map_err(numeric_err)?;
                if quote.out_a < *min_a_out || quote.out_b < *min_b_out {
                    return Err(TransactionError::SlippageExceeded {
                        min_out: format!("{min_a_out}/{min_b_out}"),
                        realized: format!("{}/{}", quote.out_a, quote.out_b),
                    });
                }
                amm::apply_remove_liquidity(&mut pool, *lp_amount, &quote, now_ms).map_err(numeric_err)?;
                position.lp_balance = position.lp_balance.checked_sub(*lp_amount).ok_or(
                    driftchain_numeric::NumericError::Overflow,
                ).map_err(numeric_err)?;
                position.fee_growth_a_checkpoint = pool.fee_growth_a;
                position.fee_growth_b_checkpoint = pool.fee_growth_b;

                let mut sender = self.require_account(&tx.sender)?;
                self.credit(&mut sender, &pool.token_a, quote.out_a)?;
                self.credit(&mut sender, &pool.token_b, quote.out_b)?;

                self.put_pool(&pool)?;
                self.put_position(&position)?;
                self.put_account(&sender)?;
                Ok(0)
            }

            TxData::SwapExactIn {
                pool_id,
                token_in,
                amount_in,
                min_amount_out,
            } => {
                let mut sender = self.require_account(&tx.sender)?;
                let fee = self.swap_along_path(
                    &mut sender,
                    std::slice::from_ref(pool_id),
                    token_in.clone(),
                    *amount_in,
                    *min_amount_out,
                    now_ms,
                )?;
                self.put_account(&sender)?;
                Ok(fee)
            }

            TxData::SwapRoute {
                path,
                token_in,
                amount_in,
                min_amount_out,
            } => {
                if path.is_empty() {
                    return Err(TransactionError::ValidationFail("empty swap path".to_string()));
                }
                let mut sender = self.require_account(&tx.sender)?;
                let fee = self.swap_along_path(
                    &mut sender,
                    path,
                    token_in.clone(),
                    *amount_in,
                    *min_amount_out,
                    now_ms,
                )?;
                self.put_account(&sender)?;
                Ok(fee)
            }

            TxData::SwapAuto {
                token_in,
                token_out,
                amount_in,
                min_amount_out,
                max_hops,
            } => {
                let pools = self.all_pools()?;
                let path = router::find_route(&pools, token_in, token_out, *max_hops)
                    .ok_or_else(|| TransactionError::ValidationFail("no route found".to_string()))?;
                if path.is_empty() {
                    return Err(TransactionError::ValidationFail(
                        "token_in and token_out are the same token".to_string(),
                    ));
                }
                let mut sender = self.require_account(&tx.sender)?;
                let fee = self.swap_along_path(
                    &mut sender,
                    &path,
                    token_in.clone(),
                    *amount_in,
                    *min_amount_out,
                    now_ms,
                )?;
                self.put_account(&sender)?;
                Ok(fee)
            }

            TxData::PlaceOrder {
                pair,
                side,
                order_type,
                price,
                quantity,
            } => {
                let (base, quote) = parse_pair(pair)?;
                let mut sender = self.require_account(&tx.sender)?;

                if *order_type == OrderType::Limit {
                    match side {
                        Side::Sell => self.debit(&mut sender, base, *quantity)?,
                        Side::Buy => {
                            let cost = price.checked_mul(*quantity).ok_or(
                                driftchain_numeric::NumericError::Overflow,
                            ).map_err(numeric_err)?;
                            self.debit(&mut sender, quote, cost)?
                        }
                    }
                }

                let mut incoming = Order {
                    id: tx.hash.clone(),
                    user: tx.sender.clone(),
                    pair: pair.clone(),
                    side: *side,
                    order_type: *order_type,
                    price: *price,
                    quantity: *quantity,
                    remaining: *quantity,
                    filled: Amount::from(0u64),
                    status: OrderStatus::Open,
                    timestamp: now_ms,
                };

                let mut resting = self.resting_orders(pair, side.opposite())?;
                let mut counter: u64 = 0;
                let trades = orderbook::match_against_book(
                    &mut incoming,
                    &mut resting,
                    |taker, maker| {
                        counter += 1;
                        format!("{}:{}:{}", taker.id, maker.id, counter)
                    },
                    now_ms,
                )
                .map_err(numeric_err)?;

                for trade in &trades {
                    match incoming.side {
                        Side::Buy => self.credit(&mut sender, base, trade.quantity)?,
                        Side::Sell => self.credit(&mut sender, quote, trade.quote_volume)?,
                    }
                    if *order_type == OrderType::Market {
                        match incoming.side {
                            Side::Buy => self.debit(&mut sender, quote, trade.quote_volume)?,
                            Side::Sell => self.debit(&mut sender, base, trade.quantity)?,
                        }
                    }

                    // The maker's side of the trade was already escrowed when
                    // its order was placed; settle what it is owed now.
                    let maker = resting
                        .iter()
                        .find(|o| o.id == trade.maker_order_id)
                        .expect("match_against_book only trades against orders in `resting`");
                    let mut maker_account = self.require_account(&maker.user)?;
                    match maker.side {
                        Side::Sell => self.credit(&mut maker_account, quote, trade.quote_volume)?,
                        Side::Buy => self.credit(&mut maker_account, base, trade.quantity)?,
                    }
                    self.put_account(&maker_account)?;
                    self.put_trade(trade)?;
                }

                for maker in &resting {
                    self.put_order(maker)?;
                }
                if *order_type == OrderType::Limit {
                    self.put_order(&incoming)?;
                }
                self.put_account(&sender)?;
                Ok(0)
            }

            TxData::CancelOrder { order_id } => {
                let mut order = self.get_order(order_id)?;
                if order.user != tx.sender {
                    return Err(TransactionError::ValidationFail(
                        "only the order owner may cancel it".to_string(),
                    ));
                }
                if !order.is_open() {
                    return Err(TransactionError::ValidationFail(
                        "order is not open".to_string(),
                    ));
                }
                let (base, quote) = parse_pair(&order.pair)?;
                let mut sender = self.require_account(&tx.sender)?;
                match order.side {
                    Side::Sell => self.credit(&mut sender, base, order.remaining)?,
                    Side::Buy => {
                        let refund = order.price.checked_mul(order.remaining).ok_or(
                            driftchain_numeric::NumericError::Overflow,
                        ).map_err(numeric_err)?;
                        self.credit(&mut sender, quote, refund)?
                    }
                }
                order.remaining = Amount::from(0u64);
                order.status = OrderStatus::Cancelled;
                self.put_order(&order)?;
                self.put_account(&sender)?;
                Ok(0)
            }
        }
    }

    /// Executes `tx` inside its own checkpoint, rolling back on any error.
    pub fn process_transaction(&mut self, tx: &Transaction) -> Result<u128, TransactionError> {
        self.cache.checkpoint();
        match self.dispatch(tx) {
            Ok(dist) => {
                self.cache.commit_checkpoint();
                Ok(dist)
            }
            Err(e) => {
                self.cache.rollback();
                Err(e)
            }
        }
    }
}
