use alloy::primitives::U256;

use super::{
    full_math::{mul_div, mul_div_rounding_up},
    sqrt_price_math::{amount_0_delta, amount_1_delta, next_sqrt_price_from_input},
};
use crate::{amm::consts::U256_FEE_ONE, errors::ArithmeticError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_price_next: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_amount: U256,
}

/// Computes one exact-input swap step within a single liquidity range.
///
/// The step either reaches `sqrt_price_target`, in which case the fee is charged on top of
/// the input consumed, or runs out of `amount_remaining` first, in which case everything
/// that was not converted into `amount_in` is the fee.
pub fn compute_swap_step(
    sqrt_price_current: U256,
    sqrt_price_target: U256,
    liquidity: u128,
    amount_remaining: U256,
    fee_pips: u32,
) -> Result<SwapStep, ArithmeticError> {
    let zero_for_one = sqrt_price_current >= sqrt_price_target;
    let fee = U256::from(fee_pips);

    let amount_remaining_less_fee = mul_div(amount_remaining, U256_FEE_ONE - fee, U256_FEE_ONE)?;

    let amount_in_to_target = if zero_for_one {
        amount_0_delta(sqrt_price_target, sqrt_price_current, liquidity, true)?
    } else {
        amount_1_delta(sqrt_price_current, sqrt_price_target, liquidity, true)?
    };

    let sqrt_price_next = if amount_remaining_less_fee >= amount_in_to_target {
        sqrt_price_target
    } else {
        next_sqrt_price_from_input(
            sqrt_price_current,
            liquidity,
            amount_remaining_less_fee,
            zero_for_one,
        )?
    };

    let reached_target = sqrt_price_next == sqrt_price_target;

    let (amount_in, amount_out) = if zero_for_one {
        let amount_in = if reached_target {
            amount_in_to_target
        } else {
            amount_0_delta(sqrt_price_next, sqrt_price_current, liquidity, true)?
        };
        (
            amount_in,
            amount_1_delta(sqrt_price_next, sqrt_price_current, liquidity, false)?,
        )
    } else {
        let amount_in = if reached_target {
            amount_in_to_target
        } else {
            amount_1_delta(sqrt_price_current, sqrt_price_next, liquidity, true)?
        };
        (
            amount_in,
            amount_0_delta(sqrt_price_current, sqrt_price_next, liquidity, false)?,
        )
    };

    let fee_amount = if reached_target {
        mul_div_rounding_up(amount_in, fee, U256_FEE_ONE - fee)?
    } else {
        amount_remaining - amount_in
    };

    Ok(SwapStep {
        sqrt_price_next,
        amount_in,
        amount_out,
        fee_amount,
    })
}
