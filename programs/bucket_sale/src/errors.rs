use anchor_lang::prelude::*;

#[error_code]
pub enum SaleError {
    #[msg("Sale parameters are invalid")]
    InvalidParameters,
    #[msg("Sale account is already initialized")]
    AlreadyInitialized,
    #[msg("Sale is not active")]
    SaleNotActive,
    #[msg("Amount is too small to buy a single token")]
    ZeroAllocation,
    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,
    #[msg("Signer is not the sale authority")]
    Unauthorized,
}

#[cfg(test)]
pub(crate) fn assert_sale_err<T: std::fmt::Debug>(res: Result<T>, expected: SaleError) {
    let code = expected as u32 + anchor_lang::error::ERROR_CODE_OFFSET;
    match res {
        Err(anchor_lang::error::Error::AnchorError(e)) => assert_eq!(e.error_code_number, code),
        other => panic!("expected error code {}, got {:?}", code, other),
    }
}
