use anchor_lang::prelude::*;

/// Seed prefix for BuyerPosition PDAs.
#[constant]
pub const POSITION_SEED: &[u8] = b"position";

/// Native currency units per whole currency unit (lamports per SOL).
/// Rates are quoted as raw tokens per whole currency unit.
pub const UNIT_SCALE: u128 = 1_000_000_000;

/// Fixed-point multiplier for `BuyerPosition::avg_entry_price`.
pub const PRICE_SCALE: u128 = 1_000_000_000;

/// Derives the BuyerPosition address for `(sale, buyer)`.
///
/// Pure: anyone can recompute it from the two identities alone.
pub fn position_address(sale: &Pubkey, buyer: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[POSITION_SEED, sale.as_ref(), buyer.as_ref()],
        &crate::ID,
    )
}
