use alloy::primitives::{U256, U512};

use crate::{amm::consts::U256_1, errors::ArithmeticError};

/// Computes `floor(a * b / denominator)` with a 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, ArithmeticError> {
    if denominator.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }

    let product = U512::from(a) * U512::from(b);
    narrow(product / U512::from(denominator))
}

/// Computes `ceil(a * b / denominator)` with a 512-bit intermediate product.
pub fn mul_div_rounding_up(
    a: U256,
    b: U256,
    denominator: U256,
) -> Result<U256, ArithmeticError> {
    if denominator.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }

    let product = U512::from(a) * U512::from(b);
    let (quotient, remainder) = product.div_rem(U512::from(denominator));
    let result = narrow(quotient)?;

    if remainder.is_zero() {
        Ok(result)
    } else {
        result
            .checked_add(U256_1)
            .ok_or(ArithmeticError::MulDivOverflow)
    }
}

pub fn div_rounding_up(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    if b.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }

    let (quotient, remainder) = a.div_rem(b);
    if remainder.is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + U256_1)
    }
}

fn narrow(value: U512) -> Result<U256, ArithmeticError> {
    let limbs = value.as_limbs();
    if limbs[4..].iter().any(|limb| *limb != 0) {
        return Err(ArithmeticError::MulDivOverflow);
    }

    Ok(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}
