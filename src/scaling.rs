//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the decimal scaling between base-unit and quote-unit amounts at a given
// price. All arithmetic is exact over unsigned integers; intermediate products are widened to 256
// bits so that u128 inputs can never overflow mid-computation.
//
// | Function           | Description                                                      |
// |--------------------|------------------------------------------------------------------|
// | unit_scale         | 10^decimals, the divisor for a base asset's precision.           |
// | quote_units        | base * price / scale, rejecting a zero result.                   |
// | base_units         | quote * scale / price, rejecting a zero result.                  |
// | *_floor variants   | Same conversions, zero results allowed.                          |
//--------------------------------------------------------------------------------------------------

use crypto_bigint::{NonZero, U256};
use thiserror::Error;

/// Errors produced by the scaling conversions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleError {
    /// A base-to-quote conversion truncated to zero quote units.
    #[error("quote amount truncates to zero")]
    QuoteAmountTooSmall,
    /// A quote-to-base conversion truncated to zero base units.
    #[error("base amount truncates to zero")]
    BaseAmountTooSmall,
    /// The scaled value does not fit in 128 bits.
    #[error("scaled value exceeds the representable range")]
    ValueOverflow,
    /// The conversion would divide by zero (zero price or zero scale).
    #[error("division by zero in scaling conversion")]
    DivisionByZero,
}

/// Returns `10^decimals`, the scale divisor for an asset with the given precision.
///
/// Returns `None` when the scale itself does not fit in a `u128` (decimals > 38); such assets are
/// rejected at pair creation.
pub fn unit_scale(decimals: u8) -> Option<u128> {
    10u128.checked_pow(u32::from(decimals))
}

#[inline]
fn widen(value: u128) -> U256 {
    U256::from_u128(value)
}

/// Narrows a 256-bit value back to `u128`, or `None` if the top half is non-zero.
fn narrow(value: U256) -> Option<u128> {
    let bytes = value.to_be_bytes();
    if bytes[..16].iter().any(|byte| *byte != 0) {
        return None;
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&bytes[16..]);
    Some(u128::from_be_bytes(low))
}

/// Computes `floor(numerator_a * numerator_b / divisor)` through a 256-bit intermediate.
fn mul_div(numerator_a: u128, numerator_b: u128, divisor: u128) -> Result<u128, ScaleError> {
    let divisor: Option<NonZero<U256>> = NonZero::new(widen(divisor)).into();
    let divisor = match divisor {
        Some(divisor) => divisor,
        None => return Err(ScaleError::DivisionByZero),
    };
    // The product of two u128 values always fits in 256 bits.
    let product = widen(numerator_a) * widen(numerator_b);
    let (quotient, _remainder) = product.div_rem(&divisor);
    narrow(quotient).ok_or(ScaleError::ValueOverflow)
}

/// Converts a base-unit amount to quote units at `price`: `floor(base_amount * price / base_scale)`.
///
/// A zero result is allowed; used where truncation-to-zero is a loop-termination condition rather
/// than an input error.
pub fn quote_units_floor(
    base_amount: u128,
    price: u128,
    base_scale: u128,
) -> Result<u128, ScaleError> {
    mul_div(base_amount, price, base_scale)
}

/// Converts a base-unit amount to quote units at `price`, rejecting a zero result.
///
/// # Errors
/// * `QuoteAmountTooSmall` - the amount is dust that would transfer zero quote units.
/// * `ValueOverflow` - the result does not fit in 128 bits.
/// * `DivisionByZero` - `base_scale` is zero.
pub fn quote_units(base_amount: u128, price: u128, base_scale: u128) -> Result<u128, ScaleError> {
    match quote_units_floor(base_amount, price, base_scale)? {
        0 => Err(ScaleError::QuoteAmountTooSmall),
        value => Ok(value),
    }
}

/// Converts a quote-unit amount to base units at `price`: `floor(quote_amount * base_scale / price)`.
///
/// A zero result is allowed; see [`quote_units_floor`].
pub fn base_units_floor(
    quote_amount: u128,
    price: u128,
    base_scale: u128,
) -> Result<u128, ScaleError> {
    mul_div(quote_amount, base_scale, price)
}

/// Converts a quote-unit amount to base units at `price`, rejecting a zero result.
///
/// # Errors
/// * `BaseAmountTooSmall` - the budget is dust that buys zero base units.
/// * `ValueOverflow` - the result does not fit in 128 bits.
/// * `DivisionByZero` - `price` is zero.
pub fn base_units(quote_amount: u128, price: u128, base_scale: u128) -> Result<u128, ScaleError> {
    match base_units_floor(quote_amount, price, base_scale)? {
        0 => Err(ScaleError::BaseAmountTooSmall),
        value => Ok(value),
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const D: u128 = 1_000_000_000_000_000_000; // 10^18

    #[test]
    fn test_unit_scale() {
        assert_eq!(unit_scale(0), Some(1));
        assert_eq!(unit_scale(18), Some(D));
        assert_eq!(unit_scale(38), Some(10u128.pow(38)));
        assert_eq!(unit_scale(39), None);
    }

    #[test]
    fn test_quote_units_whole_amounts() {
        // 10 whole base at a price of 3 whole quote per base.
        let base_amount = 10 * D;
        let price = 3 * D;
        assert_eq!(quote_units(base_amount, price, D), Ok(30 * D));
    }

    #[test]
    fn test_quote_units_floors_toward_zero() {
        // 1.5 base units at price 1: floor(3 * 1 / 2) = 1.
        assert_eq!(quote_units(3, 1, 2), Ok(1));
    }

    #[test]
    fn test_quote_units_rejects_dust() {
        // amount * price < scale truncates to zero.
        assert_eq!(quote_units(1, 1, D), Err(ScaleError::QuoteAmountTooSmall));
        assert_eq!(quote_units_floor(1, 1, D), Ok(0));
    }

    #[test]
    fn test_base_units_inverse() {
        // A 30-whole-quote budget at 3 quote per base buys 10 whole base.
        assert_eq!(base_units(30 * D, 3 * D, D), Ok(10 * D));
    }

    #[test]
    fn test_base_units_rejects_dust() {
        assert_eq!(base_units(1, 2 * D, D), Err(ScaleError::BaseAmountTooSmall));
        assert_eq!(base_units_floor(1, 2 * D, D), Ok(0));
    }

    #[test]
    fn test_base_units_division_by_zero() {
        assert_eq!(base_units(10, 0, D), Err(ScaleError::DivisionByZero));
    }

    #[test]
    fn test_widening_beyond_128_bits() {
        // base * price overflows u128 but the scaled result fits.
        let base_amount = 10u128.pow(30);
        let price = 4 * D;
        assert_eq!(quote_units(base_amount, price, D), Ok(4 * 10u128.pow(30)));
    }

    #[test]
    fn test_value_overflow_detected() {
        // base * price / 1 with both near the maximum cannot be represented.
        assert_eq!(
            quote_units(u128::MAX, u128::MAX, 1),
            Err(ScaleError::ValueOverflow)
        );
    }

    #[test]
    fn test_round_trip_is_monotone() {
        let price = 250 * D;
        let base = 7 * D;
        let quote = match quote_units(base, price, D) {
            Ok(quote) => quote,
            Err(e) => panic!("conversion failed: {}", e),
        };
        let back = match base_units(quote, price, D) {
            Ok(back) => back,
            Err(e) => panic!("conversion failed: {}", e),
        };
        assert_eq!(back, base);
    }
}
