use rust_decimal::Decimal;
use thiserror::Error;

/// Arithmetic failures raised while computing a margin.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum MarginError {
    #[error("previous observation is zero; relative change is undefined")]
    ZeroBaseline,
    #[error("relative change overflowed the decimal range")]
    Overflow,
}

/// Relative change of `latest` against `previous`, expressed in percent.
///
/// Computed as `((latest - previous) / |previous|) * 100`, so the sign follows the
/// direction of the move even when `previous` is negative.
pub fn margin(latest: Decimal, previous: Decimal) -> Result<Decimal, MarginError> {
    if previous.is_zero() {
        return Err(MarginError::ZeroBaseline);
    }
    let delta = latest
        .checked_sub(previous)
        .ok_or(MarginError::Overflow)?;
    delta
        .checked_div(previous.abs())
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or(MarginError::Overflow)
}
