use anchor_lang::prelude::*;

use crate::errors::SaleError;
use crate::state::Sale;

// ─────────────────────────────────────────────────────────────────────────────
// Bucket rate curve
// ─────────────────────────────────────────────────────────────────────────────
//
// Linear interpolation between the two endpoint rates, rounded down on the
// discount so every intermediate rate stays within [final_rate, initial_rate]:
//
//   rate(b) = initial - floor((initial - final) * b / (count - 1))
//
// rate(0) == initial and rate(count - 1) == final exactly.

/// Raw tokens per whole currency unit for `bucket`.
pub fn bucket_rate(initial_rate: u64, final_rate: u64, bucket: u16, bucket_count: u16) -> Result<u64> {
    require!(bucket < bucket_count, SaleError::InvalidParameters);
    require!(
        initial_rate >= final_rate && final_rate > 0,
        SaleError::InvalidParameters
    );

    if bucket_count == 1 {
        return Ok(initial_rate);
    }

    let spread = (initial_rate - final_rate) as u128;
    let discount = spread
        .checked_mul(bucket as u128)
        .ok_or(SaleError::ArithmeticOverflow)?
        / (bucket_count as u128 - 1);

    // discount <= spread, so the subtraction stays in [final_rate, initial_rate].
    Ok(initial_rate - discount as u64)
}

impl Sale {
    pub fn rate(&self, bucket: u16) -> Result<u64> {
        bucket_rate(self.initial_rate, self.final_rate, bucket, self.bucket_count)
    }
}
