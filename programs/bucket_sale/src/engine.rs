use anchor_lang::prelude::*;

use crate::constants::{PRICE_SCALE, UNIT_SCALE};
use crate::errors::SaleError;
use crate::state::{BuyerPosition, Sale};

// ─────────────────────────────────────────────────────────────────────────────
// Purchase settlement
// ─────────────────────────────────────────────────────────────────────────────
//
// `settle` and `preview_fill` are pure: they read the records and describe the
// outcome. `purchase` commits both outcomes only after both have succeeded, so
// a failed request leaves the Sale and the BuyerPosition untouched.

/// Outcome of settling one purchase against a sale snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settlement {
    /// Raw tokens allocated to the buyer.
    pub tokens_out: u64,
    /// Native units the buyer pays. Never more than `amount_in`.
    pub amount_spent: u64,
    /// Part of `amount_in` that is not charged.
    pub refunded: u64,
    /// Sale `tokens_sold` after this purchase.
    pub tokens_sold: u64,
    /// Sale `current_bucket` after this purchase.
    pub current_bucket: u16,
    /// Sale `is_active` after this purchase.
    pub is_active: bool,
}

/// Position totals after recording one fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionUpdate {
    pub tokens_purchased: u64,
    pub avg_entry_price: u64,
    pub total_spent: u64,
}

fn ceil_div(n: u128, d: u128) -> Result<u128> {
    require!(d != 0, SaleError::ArithmeticOverflow);
    let n = n
        .checked_add(d - 1)
        .ok_or(SaleError::ArithmeticOverflow)?;
    Ok(n / d)
}

fn to_u64(v: u128) -> Result<u64> {
    u64::try_from(v).map_err(|_| error!(SaleError::ArithmeticOverflow))
}

/// Native units needed to buy `tokens` at `rate`, rounded up.
fn cost_of(tokens: u64, rate: u64) -> Result<u128> {
    let scaled = (tokens as u128)
        .checked_mul(UNIT_SCALE)
        .ok_or(SaleError::ArithmeticOverflow)?;
    ceil_div(scaled, rate as u128)
}

/// Tokens left in the bucket that `tokens_sold` falls into.
fn bucket_capacity(sale: &Sale, tokens_sold: u64) -> Result<u64> {
    let filled = tokens_sold
        .checked_rem(sale.bucket_size)
        .ok_or(SaleError::ArithmeticOverflow)?;
    Ok(sale.bucket_size - filled)
}

/// Walks the buckets from the sale's current position, spending `amount_in`.
pub fn settle(sale: &Sale, amount_in: u64) -> Result<Settlement> {
    require!(sale.is_active, SaleError::SaleNotActive);
    require!(amount_in > 0, SaleError::ZeroAllocation);

    let last_bucket = sale
        .bucket_count
        .checked_sub(1)
        .ok_or(SaleError::InvalidParameters)?;

    let mut remaining_in = amount_in as u128;
    let mut tokens_out: u64 = 0;
    let mut tokens_sold = sale.tokens_sold;
    let mut bucket = sale.current_bucket;
    let mut is_active = true;

    while remaining_in > 0 && tokens_sold < sale.total_supply {
        let supply_left = sale.total_supply - tokens_sold;
        let capacity = bucket_capacity(sale, tokens_sold)?.min(supply_left);
        let rate = sale.rate(bucket)?;
        let cost_for_capacity = cost_of(capacity, rate)?;

        if remaining_in >= cost_for_capacity {
            // Whole bucket.
            tokens_out = tokens_out
                .checked_add(capacity)
                .ok_or(SaleError::ArithmeticOverflow)?;
            tokens_sold = tokens_sold
                .checked_add(capacity)
                .ok_or(SaleError::ArithmeticOverflow)?;
            remaining_in -= cost_for_capacity;

            if tokens_sold == sale.total_supply {
                is_active = false;
                break;
            }
            bucket = bucket.saturating_add(1).min(last_bucket);
        } else {
            // Partial fill, ends the walk.
            let affordable = remaining_in
                .checked_mul(rate as u128)
                .ok_or(SaleError::ArithmeticOverflow)?
                / UNIT_SCALE;
            let purchasable = to_u64(affordable)?.min(supply_left);
            if purchasable == 0 {
                break;
            }

            let spent = cost_of(purchasable, rate)?;
            tokens_out = tokens_out
                .checked_add(purchasable)
                .ok_or(SaleError::ArithmeticOverflow)?;
            tokens_sold = tokens_sold
                .checked_add(purchasable)
                .ok_or(SaleError::ArithmeticOverflow)?;
            remaining_in = remaining_in
                .checked_sub(spent)
                .ok_or(SaleError::ArithmeticOverflow)?;

            if tokens_sold == sale.total_supply {
                is_active = false;
            }
            break;
        }
    }

    require!(tokens_out > 0, SaleError::ZeroAllocation);

    let refunded = to_u64(remaining_in)?;
    Ok(Settlement {
        tokens_out,
        amount_spent: amount_in - refunded,
        refunded,
        tokens_sold,
        current_bucket: bucket,
        is_active,
    })
}

/// Native units that would buy every remaining token.
pub fn cost_to_sell_out(sale: &Sale) -> Result<u64> {
    let mut total: u128 = 0;
    let mut tokens_sold = sale.tokens_sold;
    let mut bucket = sale.current_bucket;

    while tokens_sold < sale.total_supply && bucket < sale.bucket_count {
        let capacity = bucket_capacity(sale, tokens_sold)?.min(sale.total_supply - tokens_sold);
        total = total
            .checked_add(cost_of(capacity, sale.rate(bucket)?)?)
            .ok_or(SaleError::ArithmeticOverflow)?;
        tokens_sold += capacity;
        bucket += 1;
    }
    to_u64(total)
}

// ─────────────────────────────────────────────────────────────────────────────
// Weighted-average entry price
// ─────────────────────────────────────────────────────────────────────────────

/// Blends a new fill into a running average price (native units per raw
/// token, scaled by `PRICE_SCALE`).
pub fn blend_entry_price(
    prior_tokens: u64,
    prior_avg: u64,
    new_tokens: u64,
    new_cost: u64,
) -> Result<u64> {
    require!(new_tokens > 0, SaleError::ZeroAllocation);

    let new_value = (new_cost as u128)
        .checked_mul(PRICE_SCALE)
        .ok_or(SaleError::ArithmeticOverflow)?;

    if prior_tokens == 0 {
        return to_u64(new_value / new_tokens as u128);
    }

    let prior_value = (prior_tokens as u128)
        .checked_mul(prior_avg as u128)
        .ok_or(SaleError::ArithmeticOverflow)?;
    let total_tokens = (prior_tokens as u128)
        .checked_add(new_tokens as u128)
        .ok_or(SaleError::ArithmeticOverflow)?;
    let blended = prior_value
        .checked_add(new_value)
        .ok_or(SaleError::ArithmeticOverflow)?
        / total_tokens;
    to_u64(blended)
}

impl BuyerPosition {
    pub fn preview_fill(&self, tokens: u64, cost: u64) -> Result<PositionUpdate> {
        let avg_entry_price =
            blend_entry_price(self.tokens_purchased, self.avg_entry_price, tokens, cost)?;
        Ok(PositionUpdate {
            tokens_purchased: self
                .tokens_purchased
                .checked_add(tokens)
                .ok_or(SaleError::ArithmeticOverflow)?,
            avg_entry_price,
            total_spent: self
                .total_spent
                .checked_add(cost)
                .ok_or(SaleError::ArithmeticOverflow)?,
        })
    }

    pub fn apply(&mut self, update: &PositionUpdate) {
        self.tokens_purchased = update.tokens_purchased;
        self.avg_entry_price = update.avg_entry_price;
        self.total_spent = update.total_spent;
    }
}

/// Settles `amount_in` for one buyer and commits the result to both records.
pub fn purchase(sale: &mut Sale, position: &mut BuyerPosition, amount_in: u64) -> Result<Settlement> {
    let settlement = settle(sale, amount_in)?;
    let update = position.preview_fill(settlement.tokens_out, settlement.amount_spent)?;

    let total_raised = sale
        .total_raised
        .checked_add(settlement.amount_spent)
        .ok_or(SaleError::ArithmeticOverflow)?;
    let buyer_count = if position.is_new() {
        sale.buyer_count
            .checked_add(1)
            .ok_or(SaleError::ArithmeticOverflow)?
    } else {
        sale.buyer_count
    };

    sale.tokens_sold = settlement.tokens_sold;
    sale.current_bucket = settlement.current_bucket;
    sale.is_active = settlement.is_active;
    sale.total_raised = total_raised;
    sale.buyer_count = buyer_count;
    position.apply(&update);

    Ok(settlement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::assert_sale_err;
    use crate::state::SaleParams;
    use proptest::prelude::*;

    const ONE: u64 = UNIT_SCALE as u64;

    fn new_sale(params: SaleParams) -> Sale {
        let mut sale = Sale::empty();
        sale.initialize(Pubkey::new_unique(), &params, 0).unwrap();
        sale
    }

    fn small_sale() -> Sale {
        // 4 buckets of 100 tokens, 1000 -> 400 tokens per unit
        new_sale(SaleParams {
            total_supply: 400,
            bucket_count: 4,
            bucket_size: 100,
            initial_rate: 1_000,
            final_rate: 400,
        })
    }

    fn check_invariants(sale: &Sale) {
        assert!(sale.tokens_sold <= sale.total_supply);
        assert_eq!(sale.current_bucket, sale.bucket_for(sale.tokens_sold));
        if sale.tokens_sold == sale.total_supply {
            assert!(!sale.is_active);
        }
    }

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(10, 5).unwrap(), 2);
        assert_eq!(ceil_div(11, 5).unwrap(), 3);
        assert_eq!(ceil_div(0, 5).unwrap(), 0);
        assert_sale_err(ceil_div(1, 0), SaleError::ArithmeticOverflow);
    }

    #[test]
    fn partial_fill_inside_first_bucket() {
        let sale = small_sale();
        // 0.05 units at 1000/unit -> 50 tokens
        let s = settle(&sale, ONE / 20).unwrap();
        assert_eq!(s.tokens_out, 50);
        assert_eq!(s.amount_spent, ONE / 20);
        assert_eq!(s.refunded, 0);
        assert_eq!(s.current_bucket, 0);
        assert!(s.is_active);
    }

    #[test]
    fn purchase_spans_buckets() {
        let sale = small_sale();
        // rates: 1000, 800, 600, 400
        // bucket 0 costs 0.1 units, bucket 1 costs 0.125 units
        let amount = ONE / 10 + ONE / 8 + ONE / 20; // + 30 tokens at 600
        let s = settle(&sale, amount).unwrap();
        assert_eq!(s.tokens_out, 230);
        assert_eq!(s.tokens_sold, 230);
        assert_eq!(s.current_bucket, 2);
        assert_eq!(s.refunded, 0);
    }

    #[test]
    fn exact_bucket_boundary_advances_bucket() {
        let sale = small_sale();
        let s = settle(&sale, ONE / 10).unwrap();
        assert_eq!(s.tokens_out, 100);
        assert_eq!(s.current_bucket, 1);
        assert!(s.is_active);
    }

    #[test]
    fn overpayment_is_not_charged() {
        let sale = small_sale();
        let cost = cost_to_sell_out(&sale).unwrap();
        let s = settle(&sale, cost + 12_345).unwrap();
        assert_eq!(s.tokens_out, 400);
        assert_eq!(s.amount_spent, cost);
        assert_eq!(s.refunded, 12_345);
        assert!(!s.is_active);
        assert_eq!(s.current_bucket, 3);
    }

    #[test]
    fn dust_amount_allocates_nothing() {
        let sale = small_sale();
        // 1 native unit buys 1000 / 1e9 tokens
        assert_sale_err(settle(&sale, 1), SaleError::ZeroAllocation);
        assert_sale_err(settle(&sale, 0), SaleError::ZeroAllocation);
    }

    #[test]
    fn partial_fill_charges_rounded_up_cost() {
        let sale = new_sale(SaleParams {
            total_supply: 3_000,
            bucket_count: 3,
            bucket_size: 1_000,
            initial_rate: 3,
            final_rate: 1,
        });
        // 1 token at 3/unit costs ceil(1e9 / 3)
        let s = settle(&sale, 400_000_000).unwrap();
        assert_eq!(s.tokens_out, 1);
        assert_eq!(s.amount_spent, 333_333_334);
        assert_eq!(s.refunded, 400_000_000 - 333_333_334);
    }

    #[test]
    fn inactive_sale_rejects_settlement() {
        let mut sale = small_sale();
        let authority = sale.authority;
        sale.halt(&authority).unwrap();
        assert_sale_err(settle(&sale, ONE), SaleError::SaleNotActive);
    }

    #[test]
    fn cost_to_sell_out_matches_bucket_sum() {
        let sale = small_sale();
        // 100 tokens at each of 1000, 800, 600, 400 per unit
        let expected = ONE / 10 + ONE / 8 + ONE / 6 + 1 + ONE / 4;
        assert_eq!(cost_to_sell_out(&sale).unwrap(), expected);
    }

    #[test]
    fn first_fill_sets_average() {
        assert_eq!(blend_entry_price(0, 0, 100, 50).unwrap(), 500_000_000);
    }

    #[test]
    fn blend_weights_by_quantity() {
        // 100 @ 0.5, 300 @ 1.0 -> 0.875
        let first = blend_entry_price(0, 0, 100, 50).unwrap();
        let blended = blend_entry_price(100, first, 300, 300).unwrap();
        assert_eq!(blended, 875_000_000);
    }

    #[test]
    fn purchase_commits_sale_and_position() {
        let mut sale = small_sale();
        let mut position = BuyerPosition::empty();

        let s = purchase(&mut sale, &mut position, ONE / 10).unwrap();
        assert_eq!(sale.tokens_sold, s.tokens_out);
        assert_eq!(sale.total_raised, s.amount_spent);
        assert_eq!(sale.buyer_count, 1);
        assert_eq!(position.tokens_purchased, 100);
        assert_eq!(position.total_spent, ONE / 10);
        assert_eq!(position.avg_entry_price, (ONE / 10) / 100 * PRICE_SCALE as u64);

        purchase(&mut sale, &mut position, ONE / 10).unwrap();
        assert_eq!(sale.buyer_count, 1);
        check_invariants(&sale);
    }

    #[test]
    fn failed_purchase_changes_nothing() {
        let mut sale = small_sale();
        let mut position = BuyerPosition::empty();
        purchase(&mut sale, &mut position, ONE / 20).unwrap();

        let sale_before = sale.clone();
        let position_before = position.clone();
        assert_sale_err(purchase(&mut sale, &mut position, 1), SaleError::ZeroAllocation);
        assert_eq!(sale, sale_before);
        assert_eq!(position, position_before);
    }

    #[test]
    fn position_overflow_aborts_whole_purchase() {
        let mut sale = small_sale();
        let mut position = BuyerPosition::empty();
        position.tokens_purchased = 1;
        position.total_spent = u64::MAX;

        let sale_before = sale.clone();
        assert_sale_err(
            purchase(&mut sale, &mut position, ONE / 20),
            SaleError::ArithmeticOverflow,
        );
        assert_eq!(sale, sale_before);
        assert_eq!(position.total_spent, u64::MAX);
    }

    proptest! {
        #[test]
        fn purchases_preserve_sale_invariants(
            amounts in proptest::collection::vec(1u64..400_000_000, 1..40),
        ) {
            let mut sale = small_sale();
            let mut position = BuyerPosition::empty();
            for amount in amounts {
                let sold_before = sale.tokens_sold;
                let held_before = position.tokens_purchased;
                let bucket_before = sale.current_bucket;
                match purchase(&mut sale, &mut position, amount) {
                    Ok(s) => {
                        prop_assert!(s.amount_spent <= amount);
                        prop_assert_eq!(sale.tokens_sold - sold_before, s.tokens_out);
                        prop_assert_eq!(position.tokens_purchased - held_before, s.tokens_out);
                        prop_assert!(sale.current_bucket >= bucket_before);
                    }
                    Err(_) => {
                        prop_assert_eq!(sale.tokens_sold, sold_before);
                        prop_assert_eq!(position.tokens_purchased, held_before);
                    }
                }
                prop_assert!(sale.tokens_sold <= sale.total_supply);
                prop_assert_eq!(sale.current_bucket, sale.bucket_for(sale.tokens_sold));
                prop_assert_eq!(sale.is_active, sale.tokens_sold < sale.total_supply);
            }
        }

        #[test]
        fn average_tracks_purchase_history(
            amounts in proptest::collection::vec(1_000_000u64..200_000_000, 1..20),
        ) {
            let mut sale = small_sale();
            let mut position = BuyerPosition::empty();
            let mut fills: Vec<(u64, u64)> = Vec::new();
            for amount in amounts {
                if let Ok(s) = purchase(&mut sale, &mut position, amount) {
                    fills.push((s.tokens_out, s.amount_spent));
                }
            }
            prop_assume!(!fills.is_empty());

            let tokens: u128 = fills.iter().map(|f| f.0 as u128).sum();
            let cost: u128 = fills.iter().map(|f| f.1 as u128).sum();
            let avg = position.avg_entry_price as u128;
            let n = fills.len() as u128;

            // Each blend floors once, so the running value trails the exact
            // average by less than one unit per fill.
            prop_assert!(avg * tokens <= cost * PRICE_SCALE);
            prop_assert!((avg + n) * tokens >= cost * PRICE_SCALE);
            prop_assert_eq!(position.total_spent as u128, cost);
        }
    }
}
