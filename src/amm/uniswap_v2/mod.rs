use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    amm::AutomatedMarketMaker,
    errors::{AMMError, ArithmeticError, EventLogError},
};

sol! {
    /// Interface of the UniswapV2Pair
    #[derive(Debug, PartialEq, Eq)]
    contract IUniswapV2Pair {
        event Sync(uint112 reserve0, uint112 reserve1);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
        function factory() external view returns (address);
    }
}

/// Share of the input that is kept after the pool fee, as `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeFraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl FeeFraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        FeeFraction {
            numerator,
            denominator,
        }
    }
}

impl Default for FeeFraction {
    // 0.3%
    fn default() -> Self {
        FeeFraction::new(997, 1000)
    }
}

/// A constant product pool. Forks of the same design differ only in `fee`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniswapV2Pool {
    pub address: Address,
    pub token_a: Address,
    pub token_b: Address,
    pub reserve_0: u128,
    pub reserve_1: u128,
    pub fee: FeeFraction,
}

impl AutomatedMarketMaker for UniswapV2Pool {
    fn address(&self) -> Address {
        self.address
    }

    fn sync_events(&self) -> Vec<B256> {
        vec![IUniswapV2Pair::Sync::SIGNATURE_HASH]
    }

    #[instrument(skip(self, log), fields(address = %self.address), level = "debug")]
    fn sync(&mut self, log: &Log) -> Result<(), AMMError> {
        if log.address() != self.address {
            return Err(EventLogError::AddressMismatch {
                log: log.address(),
                pool: self.address,
            }
            .into());
        }

        let topic = log.topics().first().ok_or(EventLogError::MissingTopic)?;
        if *topic != IUniswapV2Pair::Sync::SIGNATURE_HASH {
            return Err(EventLogError::InvalidEventSignature.into());
        }

        let sync_event =
            IUniswapV2Pair::Sync::decode_log(&log.inner, true).map_err(EventLogError::from)?;
        self.reserve_0 = sync_event.reserve0.to::<u128>();
        self.reserve_1 = sync_event.reserve1.to::<u128>();
        tracing::debug!(self.reserve_0, self.reserve_1, "UniswapV2 sync event");

        Ok(())
    }

    fn tokens(&self) -> Vec<Address> {
        vec![self.token_a, self.token_b]
    }

    // Price of the base token quoted in the other token
    fn calculate_price(&self, base_token: Address) -> Result<f64, AMMError> {
        let (base, quote) = self.reserves_for(base_token)?;
        if base == 0 {
            return Err(ArithmeticError::DivisionByZero.into());
        }

        Ok(quote as f64 / base as f64)
    }

    fn simulate_swap(&self, token_in: Address, amount_in: U256) -> Result<U256, AMMError> {
        let (reserve_in, reserve_out) = self.reserves_for(token_in)?;

        self.get_amount_out(amount_in, U256::from(reserve_in), U256::from(reserve_out))
    }

    fn simulate_swap_mut(&mut self, token_in: Address, amount_in: U256) -> Result<U256, AMMError> {
        let amount_out = self.simulate_swap(token_in, amount_in)?;

        tracing::trace!(?amount_out);
        tracing::trace!(?self.reserve_0, ?self.reserve_1, "pool reserves before");

        let amount_out_u128 =
            u128::try_from(amount_out).map_err(|_| ArithmeticError::LiquidityUnderflow)?;
        let amount_in_u128 =
            u128::try_from(amount_in).map_err(|_| ArithmeticError::LiquidityOverflow)?;

        let (reserve_in, reserve_out) = if token_in == self.token_a {
            (self.reserve_0, self.reserve_1)
        } else {
            (self.reserve_1, self.reserve_0)
        };
        let reserve_in = reserve_in
            .checked_add(amount_in_u128)
            .ok_or(ArithmeticError::LiquidityOverflow)?;
        let reserve_out = reserve_out
            .checked_sub(amount_out_u128)
            .ok_or(ArithmeticError::LiquidityUnderflow)?;

        if token_in == self.token_a {
            self.set_reserves(reserve_in, reserve_out);
        } else {
            self.set_reserves(reserve_out, reserve_in);
        }

        tracing::trace!(?self.reserve_0, ?self.reserve_1, "pool reserves after");

        Ok(amount_out)
    }
}

impl UniswapV2Pool {
    pub fn new(
        address: Address,
        token_a: Address,
        token_b: Address,
        reserve_0: u128,
        reserve_1: u128,
        fee: FeeFraction,
    ) -> UniswapV2Pool {
        UniswapV2Pool {
            address,
            token_a,
            token_b,
            reserve_0,
            reserve_1,
            fee,
        }
    }

    /// Creates a pool known only by its identity, with empty reserves.
    pub fn new_empty(address: Address, token_a: Address, token_b: Address, fee: FeeFraction) -> Self {
        UniswapV2Pool::new(address, token_a, token_b, 0, 0, fee)
    }

    pub fn set_reserves(&mut self, reserve_0: u128, reserve_1: u128) {
        self.reserve_0 = reserve_0;
        self.reserve_1 = reserve_1;
    }

    /// Returns `(reserve_in, reserve_out)` for a swap of `token_in`.
    fn reserves_for(&self, token_in: Address) -> Result<(u128, u128), AMMError> {
        if token_in == self.token_a {
            Ok((self.reserve_0, self.reserve_1))
        } else if token_in == self.token_b {
            Ok((self.reserve_1, self.reserve_0))
        } else {
            Err(AMMError::IncompatibleToken(token_in))
        }
    }

    /// Calculates the amount received for a given `amount_in` `reserve_in` and `reserve_out`.
    pub fn get_amount_out(
        &self,
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> Result<U256, AMMError> {
        tracing::trace!(?amount_in, ?reserve_in, ?reserve_out);

        if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
            return Ok(U256::ZERO);
        }

        let amount_in_with_fee = amount_in
            .checked_mul(U256::from(self.fee.numerator))
            .ok_or(ArithmeticError::MulDivOverflow)?;
        let numerator = amount_in_with_fee
            .checked_mul(reserve_out)
            .ok_or(ArithmeticError::MulDivOverflow)?;
        let denominator = reserve_in
            .checked_mul(U256::from(self.fee.denominator))
            .and_then(|scaled| scaled.checked_add(amount_in_with_fee))
            .ok_or(ArithmeticError::MulDivOverflow)?;

        tracing::trace!(?amount_in_with_fee, ?numerator, ?denominator);

        numerator
            .checked_div(denominator)
            .ok_or(ArithmeticError::DivisionByZero.into())
    }

    /// Token1 per token0 after swapping `amount_in` of `token_in`, without mutating the pool.
    pub fn simulate_swap_price(&self, token_in: Address, amount_in: U256) -> Result<f64, AMMError> {
        let mut pool = self.clone();
        pool.simulate_swap_mut(token_in, amount_in)?;

        pool.calculate_price(pool.token_a)
    }
}
