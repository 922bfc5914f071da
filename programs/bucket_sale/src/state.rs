use anchor_lang::prelude::*;

use crate::errors::SaleError;

// ─────────────────────────────────────────────────────────────────────────────
// SaleParams — caller-supplied sale configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct SaleParams {
    /// Total raw tokens offered.
    pub total_supply: u64,
    /// Number of price buckets.
    pub bucket_count: u16,
    /// Raw tokens released per bucket.
    pub bucket_size: u64,
    /// Raw tokens per whole currency unit in bucket 0.
    pub initial_rate: u64,
    /// Raw tokens per whole currency unit in the last bucket.
    pub final_rate: u64,
}

impl SaleParams {
    pub fn validate(&self) -> Result<()> {
        require!(self.total_supply > 0, SaleError::InvalidParameters);
        require!(self.bucket_count > 0, SaleError::InvalidParameters);
        require!(self.bucket_size > 0, SaleError::InvalidParameters);
        require!(self.final_rate > 0, SaleError::InvalidParameters);
        require!(
            self.initial_rate >= self.final_rate,
            SaleError::InvalidParameters
        );

        let supply = (self.bucket_size as u128)
            .checked_mul(self.bucket_count as u128)
            .ok_or(SaleError::ArithmeticOverflow)?;
        require!(
            supply == self.total_supply as u128,
            SaleError::InvalidParameters
        );

        // A single bucket is both the first and the last one.
        if self.bucket_count == 1 {
            require!(
                self.initial_rate == self.final_rate,
                SaleError::InvalidParameters
            );
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sale — one per sale instance
// ─────────────────────────────────────────────────────────────────────────────
// Keypair account, created by `initialize`.

#[account]
#[derive(Debug, PartialEq)]
pub struct Sale {
    /// The wallet that created this sale and receives its proceeds.
    pub authority: Pubkey,

    /// Raw tokens offered. Immutable.
    pub total_supply: u64,

    /// Number of price buckets. Immutable.
    pub bucket_count: u16,

    /// Raw tokens per bucket. `bucket_size * bucket_count == total_supply`.
    pub bucket_size: u64,

    /// Raw tokens per whole currency unit in bucket 0.
    pub initial_rate: u64,

    /// Raw tokens per whole currency unit in bucket `bucket_count - 1`.
    pub final_rate: u64,

    /// `min(tokens_sold / bucket_size, bucket_count - 1)`.
    pub current_bucket: u16,

    /// Raw tokens allocated so far.
    pub tokens_sold: u64,

    /// Native currency units collected so far.
    pub total_raised: u64,

    /// Number of distinct buyer positions opened.
    pub buyer_count: u32,

    /// Unix timestamp captured at creation.
    pub start_time: i64,

    /// False once sold out or halted. Never set back to true.
    pub is_active: bool,

    /// Set when the authority ended the sale early.
    pub halted: bool,

    /// Reserved for future use.
    pub _reserved: [u8; 64],
}

impl Sale {
    pub const MAX_SIZE: usize = 8  // discriminator
        + 32  // authority
        + 8   // total_supply
        + 2   // bucket_count
        + 8   // bucket_size
        + 8   // initial_rate
        + 8   // final_rate
        + 2   // current_bucket
        + 8   // tokens_sold
        + 8   // total_raised
        + 4   // buyer_count
        + 8   // start_time
        + 1   // is_active
        + 1   // halted
        + 64; // _reserved

    /// A zeroed record, as the runtime hands it over before `initialize`.
    pub fn empty() -> Self {
        Self {
            authority: Pubkey::default(),
            total_supply: 0,
            bucket_count: 0,
            bucket_size: 0,
            initial_rate: 0,
            final_rate: 0,
            current_bucket: 0,
            tokens_sold: 0,
            total_raised: 0,
            buyer_count: 0,
            start_time: 0,
            is_active: false,
            halted: false,
            _reserved: [0u8; 64],
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.authority != Pubkey::default() || self.total_supply != 0
    }

    /// Fills a blank record. Nothing is written unless every check passes.
    pub fn initialize(&mut self, authority: Pubkey, params: &SaleParams, now: i64) -> Result<()> {
        require!(!self.is_initialized(), SaleError::AlreadyInitialized);
        require_keys_neq!(authority, Pubkey::default(), SaleError::InvalidParameters);
        params.validate()?;

        self.authority = authority;
        self.total_supply = params.total_supply;
        self.bucket_count = params.bucket_count;
        self.bucket_size = params.bucket_size;
        self.initial_rate = params.initial_rate;
        self.final_rate = params.final_rate;
        self.current_bucket = 0;
        self.tokens_sold = 0;
        self.total_raised = 0;
        self.buyer_count = 0;
        self.start_time = now;
        self.is_active = true;
        self.halted = false;
        self._reserved = [0u8; 64];
        Ok(())
    }

    pub fn remaining_supply(&self) -> u64 {
        self.total_supply.saturating_sub(self.tokens_sold)
    }

    pub fn is_sold_out(&self) -> bool {
        self.tokens_sold >= self.total_supply
    }

    /// Bucket that `tokens_sold` falls into, clamped to the last bucket.
    pub fn bucket_for(&self, tokens_sold: u64) -> u16 {
        if self.bucket_size == 0 || self.bucket_count == 0 {
            return 0;
        }
        let last = (self.bucket_count - 1) as u64;
        (tokens_sold / self.bucket_size).min(last) as u16
    }

    /// Ends the sale early. Only the authority may halt, and only once.
    pub fn halt(&mut self, signer: &Pubkey) -> Result<()> {
        require_keys_eq!(*signer, self.authority, SaleError::Unauthorized);
        require!(self.is_active, SaleError::SaleNotActive);
        self.is_active = false;
        self.halted = true;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BuyerPosition — one per buyer per sale
// ─────────────────────────────────────────────────────────────────────────────
// PDA seeds: [b"position", sale.key().as_ref(), buyer.key().as_ref()]

#[account]
#[derive(Debug, PartialEq)]
pub struct BuyerPosition {
    /// The sale this position belongs to.
    pub sale: Pubkey,

    /// The buyer's wallet address.
    pub buyer: Pubkey,

    /// Raw tokens allocated to this buyer across all purchases.
    pub tokens_purchased: u64,

    /// Weighted-average cost in native units per raw token, scaled by `PRICE_SCALE`.
    pub avg_entry_price: u64,

    /// Native currency units spent across all purchases.
    pub total_spent: u64,

    /// Bump seed for this PDA.
    pub bump: u8,
}

impl BuyerPosition {
    pub const MAX_SIZE: usize = 8  // discriminator
        + 32  // sale
        + 32  // buyer
        + 8   // tokens_purchased
        + 8   // avg_entry_price
        + 8   // total_spent
        + 1;  // bump

    pub fn empty() -> Self {
        Self {
            sale: Pubkey::default(),
            buyer: Pubkey::default(),
            tokens_purchased: 0,
            avg_entry_price: 0,
            total_spent: 0,
            bump: 0,
        }
    }

    /// True until the first fill has been recorded.
    pub fn is_new(&self) -> bool {
        self.tokens_purchased == 0
    }

    /// Binds a freshly created position to its sale and buyer.
    pub fn open(&mut self, sale: Pubkey, buyer: Pubkey, bump: u8) {
        self.sale = sale;
        self.buyer = buyer;
        self.bump = bump;
    }
}
