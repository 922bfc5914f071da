use anchor_lang::prelude::*;
use anchor_lang::system_program;

pub mod constants;
pub mod curve;
pub mod engine;
pub mod errors;
pub mod events;
pub mod state;

use constants::POSITION_SEED;
use errors::SaleError;
use events::*;
use state::*;

declare_id!("9bef1N9erxKoe8Mvj5SwcaA17iDjMXgboZPnpBrrBXNf");

/// Returned by `purchase` so clients can read the settled amounts.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseResult {
    pub tokens_out: u64,
    pub amount_spent: u64,
}

#[program]
pub mod bucket_sale {
    use super::*;

    // ═════════════════════════════════════════════════════════════════════
    // 1. INITIALIZE
    // ═════════════════════════════════════════════════════════════════════
    /// Creates a sale of `total_supply` raw tokens split into `bucket_count`
    /// buckets of `bucket_size`, priced from `initial_rate` down to
    /// `final_rate` tokens per whole currency unit.
    ///
    /// The sale account is a fresh keypair account. Calling this again on an
    /// existing sale fails with `AlreadyInitialized`.
    pub fn initialize(
        ctx: Context<Initialize>,
        total_supply: u64,
        bucket_count: u16,
        bucket_size: u64,
        initial_rate: u64,
        final_rate: u64,
    ) -> Result<Pubkey> {
        let params = SaleParams {
            total_supply,
            bucket_count,
            bucket_size,
            initial_rate,
            final_rate,
        };
        let now = Clock::get()?.unix_timestamp;
        let sale_key = ctx.accounts.sale.key();
        let authority = ctx.accounts.authority.key();

        let sale = &mut ctx.accounts.sale;
        sale.initialize(authority, &params, now)?;

        emit!(SaleInitialized {
            sale: sale_key,
            authority,
            total_supply,
            bucket_count,
            bucket_size,
            initial_rate,
            final_rate,
            start_time: now,
        });
        msg!(
            "BucketSale: Sale {} created. {} tokens in {} buckets, rate {} -> {}",
            sale_key,
            total_supply,
            bucket_count,
            initial_rate,
            final_rate
        );

        Ok(sale_key)
    }

    // ═════════════════════════════════════════════════════════════════════
    // 2. PURCHASE
    // ═════════════════════════════════════════════════════════════════════
    /// Buys as many tokens as `amount_in` native units afford, walking the
    /// buckets from the sale's current position.
    ///
    /// Only the settled `amount_spent` is moved from the buyer to the sale
    /// authority; any excess over what the remaining supply costs stays with
    /// the buyer. The BuyerPosition PDA is created on the first purchase.
    pub fn purchase(ctx: Context<Purchase>, amount_in: u64) -> Result<PurchaseResult> {
        let sale_key = ctx.accounts.sale.key();
        let buyer_key = ctx.accounts.buyer.key();
        let sale = &mut ctx.accounts.sale;
        let position = &mut ctx.accounts.position;
        let fresh = position.buyer == Pubkey::default();

        let settlement = engine::purchase(sale, position, amount_in)?;
        if fresh {
            position.open(sale_key, buyer_key, ctx.bumps.position);
        }

        // ── Transfer the settled amount to the sale authority ───────────
        system_program::transfer(
            CpiContext::new(
                ctx.accounts.system_program.to_account_info(),
                system_program::Transfer {
                    from: ctx.accounts.buyer.to_account_info(),
                    to: ctx.accounts.proceeds_wallet.to_account_info(),
                },
            ),
            settlement.amount_spent,
        )?;

        emit!(TokensPurchased {
            sale: sale_key,
            buyer: buyer_key,
            tokens_out: settlement.tokens_out,
            amount_spent: settlement.amount_spent,
            refunded: settlement.refunded,
            current_bucket: settlement.current_bucket,
            avg_entry_price: position.avg_entry_price,
        });
        msg!(
            "BucketSale: Buyer {} got {} tokens for {} lamports (bucket {})",
            buyer_key,
            settlement.tokens_out,
            settlement.amount_spent,
            settlement.current_bucket
        );

        if !settlement.is_active {
            emit!(SaleCompleted {
                sale: sale_key,
                tokens_sold: sale.tokens_sold,
                total_raised: sale.total_raised,
            });
            msg!("BucketSale: Sale {} sold out", sale_key);
        }

        Ok(PurchaseResult {
            tokens_out: settlement.tokens_out,
            amount_spent: settlement.amount_spent,
        })
    }

    // ═════════════════════════════════════════════════════════════════════
    // 3. HALT SALE
    // ═════════════════════════════════════════════════════════════════════
    /// Authority ends the sale early. A halted sale never reopens.
    pub fn halt_sale(ctx: Context<HaltSale>) -> Result<()> {
        let sale_key = ctx.accounts.sale.key();
        let authority = ctx.accounts.authority.key();
        let sale = &mut ctx.accounts.sale;

        sale.halt(&authority)?;

        emit!(SaleHalted {
            sale: sale_key,
            authority,
            tokens_sold: sale.tokens_sold,
        });
        msg!(
            "BucketSale: Sale {} halted at {} tokens sold",
            sale_key,
            sale.tokens_sold
        );
        Ok(())
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// ACCOUNT CONTEXTS
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Accounts)]
pub struct Initialize<'info> {
    /// The sale creator, pays for account creation and receives proceeds.
    #[account(mut)]
    pub authority: Signer<'info>,

    /// Sale account. Must be blank; `Sale::initialize` rejects reuse.
    #[account(
        init_if_needed,
        payer = authority,
        space = Sale::MAX_SIZE,
    )]
    pub sale: Account<'info, Sale>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(amount_in: u64)]
pub struct Purchase<'info> {
    /// The buyer paying for tokens.
    #[account(mut)]
    pub buyer: Signer<'info>,

    #[account(mut)]
    pub sale: Account<'info, Sale>,

    /// BuyerPosition PDA — created on first purchase, updated afterwards.
    #[account(
        init_if_needed,
        payer = buyer,
        space = BuyerPosition::MAX_SIZE,
        seeds = [POSITION_SEED, sale.key().as_ref(), buyer.key().as_ref()],
        bump,
    )]
    pub position: Account<'info, BuyerPosition>,

    /// Receives the settled lamports. Must be the sale authority.
    #[account(
        mut,
        address = sale.authority @ SaleError::Unauthorized,
    )]
    pub proceeds_wallet: SystemAccount<'info>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct HaltSale<'info> {
    pub authority: Signer<'info>,

    #[account(mut)]
    pub sale: Account<'info, Sale>,
}
