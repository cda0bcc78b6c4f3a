use alloy::primitives::U256;

use super::full_math::{div_rounding_up, mul_div, mul_div_rounding_up};
use crate::{
    amm::consts::{Q96, RESOLUTION, U160_MAX},
    errors::ArithmeticError,
};

/// Amount of token0 between two sqrt prices for `liquidity`,
/// `liquidity * (sqrt_b - sqrt_a) / (sqrt_a * sqrt_b)`.
pub fn amount_0_delta(
    mut sqrt_ratio_a: U256,
    mut sqrt_ratio_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, ArithmeticError> {
    if sqrt_ratio_a > sqrt_ratio_b {
        (sqrt_ratio_a, sqrt_ratio_b) = (sqrt_ratio_b, sqrt_ratio_a);
    }

    if sqrt_ratio_a.is_zero() {
        return Err(ArithmeticError::SqrtPriceOutOfBounds);
    }

    let numerator_1 = U256::from(liquidity) << RESOLUTION;
    let numerator_2 = sqrt_ratio_b - sqrt_ratio_a;

    if round_up {
        div_rounding_up(
            mul_div_rounding_up(numerator_1, numerator_2, sqrt_ratio_b)?,
            sqrt_ratio_a,
        )
    } else {
        Ok(mul_div(numerator_1, numerator_2, sqrt_ratio_b)? / sqrt_ratio_a)
    }
}

/// Amount of token1 between two sqrt prices for `liquidity`, `liquidity * (sqrt_b - sqrt_a)`.
pub fn amount_1_delta(
    mut sqrt_ratio_a: U256,
    mut sqrt_ratio_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, ArithmeticError> {
    if sqrt_ratio_a > sqrt_ratio_b {
        (sqrt_ratio_a, sqrt_ratio_b) = (sqrt_ratio_b, sqrt_ratio_a);
    }

    let liquidity = U256::from(liquidity);
    let spread = sqrt_ratio_b - sqrt_ratio_a;

    if round_up {
        mul_div_rounding_up(liquidity, spread, Q96)
    } else {
        mul_div(liquidity, spread, Q96)
    }
}

/// Price after adding (`add`) or removing `amount` of token0, rounded up so the price
/// never moves further than the amount pays for.
pub fn next_sqrt_price_from_amount_0_rounding_up(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, ArithmeticError> {
    if amount.is_zero() {
        return Ok(sqrt_price);
    }

    let numerator_1 = U256::from(liquidity) << RESOLUTION;

    if add {
        if let Some(product) = amount.checked_mul(sqrt_price) {
            if let Some(denominator) = numerator_1.checked_add(product) {
                return mul_div_rounding_up(numerator_1, sqrt_price, denominator);
            }
        }

        let denominator = (numerator_1 / sqrt_price)
            .checked_add(amount)
            .ok_or(ArithmeticError::SqrtPriceOverflow)?;
        div_rounding_up(numerator_1, denominator)
    } else {
        let product = amount
            .checked_mul(sqrt_price)
            .ok_or(ArithmeticError::SqrtPriceOverflow)?;
        if numerator_1 <= product {
            return Err(ArithmeticError::SqrtPriceOverflow);
        }

        mul_div_rounding_up(numerator_1, sqrt_price, numerator_1 - product)
    }
}

/// Price after adding (`add`) or removing `amount` of token1, rounded down.
pub fn next_sqrt_price_from_amount_1_rounding_down(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, ArithmeticError> {
    let liquidity = U256::from(liquidity);

    if add {
        let quotient = mul_div(amount, Q96, liquidity)?;
        let next = sqrt_price
            .checked_add(quotient)
            .ok_or(ArithmeticError::SqrtPriceOverflow)?;
        if next > U160_MAX {
            return Err(ArithmeticError::SqrtPriceOverflow);
        }
        Ok(next)
    } else {
        let quotient = mul_div_rounding_up(amount, Q96, liquidity)?;
        if sqrt_price <= quotient {
            return Err(ArithmeticError::SqrtPriceOverflow);
        }
        Ok(sqrt_price - quotient)
    }
}

/// Price after swapping `amount_in` into the pool.
///
/// token0 in (`zero_for_one`) moves the price down, token1 in moves it up.
pub fn next_sqrt_price_from_input(
    sqrt_price: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, ArithmeticError> {
    if sqrt_price.is_zero() {
        return Err(ArithmeticError::SqrtPriceOutOfBounds);
    }
    if liquidity == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }

    if zero_for_one {
        next_sqrt_price_from_amount_0_rounding_up(sqrt_price, liquidity, amount_in, true)
    } else {
        next_sqrt_price_from_amount_1_rounding_down(sqrt_price, liquidity, amount_in, true)
    }
}
