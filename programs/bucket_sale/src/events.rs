use anchor_lang::prelude::*;

#[event]
pub struct SaleInitialized {
    pub sale: Pubkey,
    pub authority: Pubkey,
    pub total_supply: u64,
    pub bucket_count: u16,
    pub bucket_size: u64,
    pub initial_rate: u64,
    pub final_rate: u64,
    pub start_time: i64,
}

#[event]
pub struct TokensPurchased {
    pub sale: Pubkey,
    pub buyer: Pubkey,
    pub tokens_out: u64,
    pub amount_spent: u64,
    pub refunded: u64,
    pub current_bucket: u16,
    pub avg_entry_price: u64,
}

#[event]
pub struct SaleCompleted {
    pub sale: Pubkey,
    pub tokens_sold: u64,
    pub total_raised: u64,
}

#[event]
pub struct SaleHalted {
    pub sale: Pubkey,
    pub authority: Pubkey,
    pub tokens_sold: u64,
}
