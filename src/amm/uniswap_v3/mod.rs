pub mod backfill;
pub mod events;

use std::collections::BTreeMap;

use alloy::{
    primitives::{Address, B256, I256, U256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use num_bigfloat::BigFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    amm::{
        consts::{F64_2P192, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK, U256_1},
        math::{compute_swap_step, full_math::mul_div, sqrt_price_at_tick, tick_at_sqrt_price},
        AutomatedMarketMaker,
    },
    errors::{AMMError, ArithmeticError, EventLogError, StateError, SwapSimulationError},
};

use self::events::PoolEvent;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    contract IUniswapV3Pool {
        event Initialize(uint160 sqrtPriceX96, int24 tick);
        event Mint(address sender, address indexed owner, int24 indexed tickLower, int24 indexed tickUpper, uint128 amount, uint256 amount0, uint256 amount1);
        event Burn(address indexed owner, int24 indexed tickLower, int24 indexed tickUpper, uint128 amount, uint256 amount0, uint256 amount1);
        event Swap(address indexed sender, address indexed recipient, int256 amount0, int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick);
        event Flash(address indexed sender, address indexed recipient, uint256 amount0, uint256 amount1, uint256 paid0, uint256 paid1);
        event Collect(address indexed owner, address recipient, int24 indexed tickLower, int24 indexed tickUpper, uint128 amount0, uint128 amount1);

        function token0() external view returns (address);
        function token1() external view returns (address);
        function fee() external view returns (uint24);
        function tickSpacing() external view returns (int24);
        function liquidity() external view returns (uint128);
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked);
        function ticks(int24 tick) external view returns (uint128 liquidityGross, int128 liquidityNet, uint256 feeGrowthOutside0X128, uint256 feeGrowthOutside1X128, int56 tickCumulativeOutside, uint160 secondsPerLiquidityOutsideX128, uint32 secondsOutside, bool initialized);
        function tickBitmap(int16 wordPosition) external view returns (uint256);
    }
}

/// A concentrated liquidity pool replica.
///
/// `state` is `None` until the pool is either read from chain or sees an `Initialize` event.
/// `tick_bitmap` and `ticks` are sparse: a bitmap word that is absent has not been fetched,
/// unless `bitmap_defaults_to_zero` is set, which is the case for pools tracked from their
/// `Initialize` event onwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniswapV3Pool {
    pub address: Address,
    pub token_a: Address,
    pub token_b: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub state: Option<PoolState>,
    pub bitmap_defaults_to_zero: bool,
    pub tick_bitmap: BTreeMap<i16, U256>,
    pub ticks: BTreeMap<i32, TickInfo>,
}

/// The mutable snapshot of a pool.
///
/// `reserve_0` and `reserve_1` are accumulated additively from events and drift from the
/// pool's token balances over time. They are informational only; swap simulation never
/// reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub tick: i32,
    pub liquidity: u128,
    pub sqrt_price: U256,
    pub reserve_0: U256,
    pub reserve_1: U256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    pub liquidity_net: i128,
    pub liquidity_gross: u128,
}

impl TickInfo {
    pub fn new(liquidity_net: i128, liquidity_gross: u128) -> Self {
        TickInfo {
            liquidity_net,
            liquidity_gross,
        }
    }
}

/// Result of looking up a bitmap word in the sparse bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapWord {
    Known(U256),
    /// Not stored, but known to be zero because the pool was tracked from initialization.
    KnownAbsent,
    Unfetched,
}

impl BitmapWord {
    pub fn value(&self) -> Option<U256> {
        match self {
            BitmapWord::Known(word) => Some(*word),
            BitmapWord::KnownAbsent => Some(U256::ZERO),
            BitmapWord::Unfetched => None,
        }
    }
}

impl AutomatedMarketMaker for UniswapV3Pool {
    fn address(&self) -> Address {
        self.address
    }

    fn sync_events(&self) -> Vec<B256> {
        vec![
            IUniswapV3Pool::Initialize::SIGNATURE_HASH,
            IUniswapV3Pool::Mint::SIGNATURE_HASH,
            IUniswapV3Pool::Burn::SIGNATURE_HASH,
            IUniswapV3Pool::Swap::SIGNATURE_HASH,
            IUniswapV3Pool::Flash::SIGNATURE_HASH,
            IUniswapV3Pool::Collect::SIGNATURE_HASH,
        ]
    }

    fn sync(&mut self, log: &Log) -> Result<(), AMMError> {
        if log.address() != self.address {
            return Err(EventLogError::AddressMismatch {
                log: log.address(),
                pool: self.address,
            }
            .into());
        }

        let event = PoolEvent::decode(log)?;
        self.apply_event(&event)
    }

    fn tokens(&self) -> Vec<Address> {
        vec![self.token_a, self.token_b]
    }

    fn calculate_price(&self, base_token: Address) -> Result<f64, AMMError> {
        let state = self.state()?;

        let sqrt_price = BigFloat::parse(&state.sqrt_price.to_string())
            .ok_or(ArithmeticError::ParseFloatError)?;
        let price = sqrt_price
            .mul(&sqrt_price)
            .div(&BigFloat::from_f64(F64_2P192));

        if base_token == self.token_a {
            Ok(price.to_f64())
        } else if base_token == self.token_b {
            Ok(BigFloat::from(1).div(&price).to_f64())
        } else {
            Err(AMMError::IncompatibleToken(base_token))
        }
    }

    fn simulate_swap(&self, token_in: Address, amount_in: U256) -> Result<U256, AMMError> {
        let zero_for_one = self.zero_for_one(token_in)?;
        let current_state = self.walk_swap(zero_for_one, amount_in)?;

        tracing::trace!(amount_out = ?current_state.amount_calculated);

        Ok(current_state.amount_calculated)
    }

    fn simulate_swap_mut(&mut self, token_in: Address, amount_in: U256) -> Result<U256, AMMError> {
        let zero_for_one = self.zero_for_one(token_in)?;
        let current_state = self.walk_swap(zero_for_one, amount_in)?;
        let amount_consumed = amount_in - current_state.amount_specified_remaining;

        let state = self.state_mut()?;
        state.sqrt_price = current_state.sqrt_price;
        state.tick = current_state.tick;
        state.liquidity = current_state.liquidity;

        if zero_for_one {
            state.reserve_0 = state.reserve_0.saturating_add(amount_consumed);
            state.reserve_1 = state
                .reserve_1
                .saturating_sub(current_state.amount_calculated);
        } else {
            state.reserve_0 = state
                .reserve_0
                .saturating_sub(current_state.amount_calculated);
            state.reserve_1 = state.reserve_1.saturating_add(amount_consumed);
        }

        Ok(current_state.amount_calculated)
    }
}

impl UniswapV3Pool {
    /// Creates an uninitialized pool from its immutable parameters.
    pub fn new(
        address: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
        tick_spacing: i32,
    ) -> UniswapV3Pool {
        UniswapV3Pool {
            address,
            token_a,
            token_b,
            fee,
            tick_spacing,
            ..Default::default()
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Result<&PoolState, StateError> {
        self.state.as_ref().ok_or(StateError::UninitializedPool)
    }

    fn state_mut(&mut self) -> Result<&mut PoolState, StateError> {
        self.state.as_mut().ok_or(StateError::UninitializedPool)
    }

    /// Overwrites the mutable snapshot, used when reading the pool from chain.
    pub fn set_state(&mut self, state: PoolState) {
        self.state = Some(state);
    }

    pub fn set_bitmap_word(&mut self, word_pos: i16, word: U256) {
        self.tick_bitmap.insert(word_pos, word);
    }

    pub fn set_tick_info(&mut self, tick: i32, info: TickInfo) {
        self.ticks.insert(tick, info);
    }

    pub fn bitmap_word(&self, word_pos: i16) -> BitmapWord {
        match self.tick_bitmap.get(&word_pos) {
            Some(word) => BitmapWord::Known(*word),
            None if self.bitmap_defaults_to_zero => BitmapWord::KnownAbsent,
            None => BitmapWord::Unfetched,
        }
    }

    /// Word and bit position of an initializable tick.
    pub fn position(&self, tick: i32) -> Result<(i16, u8), StateError> {
        if self.tick_spacing <= 0 || tick % self.tick_spacing != 0 {
            return Err(StateError::TickNotOnSpacing {
                tick,
                tick_spacing: self.tick_spacing,
            });
        }

        Ok(word_and_bit(tick / self.tick_spacing))
    }

    /// Liquidity data of `tick`, `None` if the tick is known to be uninitialized.
    pub fn tick_info(&self, tick: i32) -> Result<Option<TickInfo>, StateError> {
        let (word_pos, bit_pos) = self.position(tick)?;
        let word = self
            .bitmap_word(word_pos)
            .value()
            .ok_or(StateError::UnfetchedBitmapWord(word_pos))?;

        if !word.bit(bit_pos as usize) {
            return Ok(None);
        }

        self.ticks
            .get(&tick)
            .copied()
            .map(Some)
            .ok_or(StateError::UnfetchedTick(tick))
    }

    /// Finds the next initialized tick at or below `tick` (`lte`) or strictly above it.
    ///
    /// Returns `None` once no loaded tick remains in that direction, which is where the
    /// replica's view of the book ends.
    pub fn next_initialized_tick(&self, tick: i32, lte: bool) -> Result<Option<i32>, StateError> {
        let has_tick_beyond = if lte {
            self.ticks.range(..=tick).next_back().is_some()
        } else {
            self.ticks.range(tick.saturating_add(1)..).next().is_some()
        };

        if !has_tick_beyond || self.tick_spacing <= 0 {
            return Ok(None);
        }

        let min_compressed = MIN_TICK.div_euclid(self.tick_spacing);
        let max_compressed = MAX_TICK.div_euclid(self.tick_spacing);

        let mut compressed = tick.div_euclid(self.tick_spacing);
        if !lte {
            compressed += 1;
        }

        while (min_compressed..=max_compressed).contains(&compressed) {
            let (word_pos, bit_pos) = word_and_bit(compressed);
            let word = self
                .bitmap_word(word_pos)
                .value()
                .ok_or(StateError::UnfetchedBitmapWord(word_pos))?;

            if lte {
                // bits at or below bit_pos
                let mask = if bit_pos == u8::MAX {
                    U256::MAX
                } else {
                    (U256_1 << (bit_pos as usize + 1)) - U256_1
                };
                let masked = word & mask;

                if !masked.is_zero() {
                    let msb = 255 - masked.leading_zeros() as i32;
                    return Ok(Some((word_pos as i32 * 256 + msb) * self.tick_spacing));
                }

                compressed = word_pos as i32 * 256 - 1;
            } else {
                // bits at or above bit_pos
                let masked = word & !((U256_1 << bit_pos as usize) - U256_1);

                if !masked.is_zero() {
                    let lsb = masked.trailing_zeros() as i32;
                    return Ok(Some((word_pos as i32 * 256 + lsb) * self.tick_spacing));
                }

                compressed = (word_pos as i32 + 1) * 256;
            }
        }

        Ok(None)
    }

    fn flip_tick(&mut self, tick: i32) -> Result<(), StateError> {
        let (word_pos, bit_pos) = self.position(tick)?;
        let word = self
            .bitmap_word(word_pos)
            .value()
            .ok_or(StateError::UnfetchedBitmapWord(word_pos))?;

        self.tick_bitmap
            .insert(word_pos, word ^ (U256_1 << bit_pos as usize));

        Ok(())
    }

    fn update_tick(
        &mut self,
        tick: i32,
        liquidity_delta: i128,
        upper: bool,
    ) -> Result<(), AMMError> {
        let info = self.tick_info(tick)?.unwrap_or_default();

        let liquidity_gross = add_liquidity_delta(info.liquidity_gross, liquidity_delta)?;

        // net liquidity is added when crossing the lower tick going up and removed at the upper
        let liquidity_net = if upper {
            info.liquidity_net.checked_sub(liquidity_delta)
        } else {
            info.liquidity_net.checked_add(liquidity_delta)
        }
        .ok_or(ArithmeticError::LiquidityOverflow)?;

        if liquidity_gross == 0 {
            self.ticks.remove(&tick);
        } else {
            self.ticks
                .insert(tick, TickInfo::new(liquidity_net, liquidity_gross));
        }

        if (liquidity_gross == 0) != (info.liquidity_gross == 0) {
            self.flip_tick(tick)?;
        }

        Ok(())
    }

    pub fn apply_event(&mut self, event: &PoolEvent) -> Result<(), AMMError> {
        debug!(?event, address = ?self.address, "UniswapV3 event");

        match *event {
            PoolEvent::Initialize { sqrt_price, tick } => {
                self.initialize(sqrt_price, tick);
                Ok(())
            }
            PoolEvent::Mint {
                tick_lower,
                tick_upper,
                amount,
                amount_0,
                amount_1,
            } => self.mint(tick_lower, tick_upper, amount, amount_0, amount_1),
            PoolEvent::Burn {
                tick_lower,
                tick_upper,
                amount,
                ..
            } => self.burn(tick_lower, tick_upper, amount),
            PoolEvent::Swap {
                amount_0,
                amount_1,
                sqrt_price,
                liquidity,
                tick,
            } => self.apply_swap(amount_0, amount_1, sqrt_price, liquidity, tick),
            PoolEvent::Flash { paid_0, paid_1 } => self.apply_flash(paid_0, paid_1),
            PoolEvent::Collect { amount_0, amount_1 } => self.apply_collect(amount_0, amount_1),
        }
    }

    /// Starts tracking the pool from its `Initialize` event.
    ///
    /// Liquidity and reserves start at zero and every bitmap word not yet written is
    /// known to be empty.
    pub fn initialize(&mut self, sqrt_price: U256, tick: i32) {
        self.state = Some(PoolState {
            tick,
            liquidity: 0,
            sqrt_price,
            reserve_0: U256::ZERO,
            reserve_1: U256::ZERO,
        });
        self.tick_bitmap.clear();
        self.ticks.clear();
        self.bitmap_defaults_to_zero = true;
    }

    pub fn mint(
        &mut self,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount_0: U256,
        amount_1: U256,
    ) -> Result<(), AMMError> {
        let state = *self.state()?;
        let liquidity_delta =
            i128::try_from(amount).map_err(|_| ArithmeticError::LiquidityOverflow)?;

        // everything that can fail is checked before anything is written
        let liquidity = if tick_lower <= state.tick && state.tick < tick_upper {
            state
                .liquidity
                .checked_add(amount)
                .ok_or(ArithmeticError::LiquidityOverflow)?
        } else {
            state.liquidity
        };
        for (tick, upper) in [(tick_lower, false), (tick_upper, true)] {
            let info = self.tick_info(tick)?.unwrap_or_default();
            add_liquidity_delta(info.liquidity_gross, liquidity_delta)?;
            if upper {
                info.liquidity_net.checked_sub(liquidity_delta)
            } else {
                info.liquidity_net.checked_add(liquidity_delta)
            }
            .ok_or(ArithmeticError::LiquidityOverflow)?;
        }

        self.update_tick(tick_lower, liquidity_delta, false)?;
        self.update_tick(tick_upper, liquidity_delta, true)?;

        let state = self.state_mut()?;
        state.liquidity = liquidity;
        state.reserve_0 = state.reserve_0.saturating_add(amount_0);
        state.reserve_1 = state.reserve_1.saturating_add(amount_1);

        Ok(())
    }

    /// Removes liquidity from a range. Token amounts owed are not taken out of the
    /// reserves here, the `Collect` event does that.
    pub fn burn(&mut self, tick_lower: i32, tick_upper: i32, amount: u128) -> Result<(), AMMError> {
        let state = *self.state()?;
        let liquidity_delta =
            i128::try_from(amount).map_err(|_| ArithmeticError::LiquidityOverflow)?;

        for tick in [tick_lower, tick_upper] {
            match self.tick_info(tick)? {
                Some(info) if info.liquidity_gross >= amount => {}
                Some(_) => return Err(ArithmeticError::LiquidityUnderflow.into()),
                None => return Err(StateError::UninitializedTick(tick).into()),
            }
        }

        let in_range = tick_lower <= state.tick && state.tick < tick_upper;
        if in_range && state.liquidity < amount {
            return Err(ArithmeticError::LiquidityUnderflow.into());
        }

        self.update_tick(tick_lower, -liquidity_delta, false)?;
        self.update_tick(tick_upper, -liquidity_delta, true)?;

        if in_range {
            self.state_mut()?.liquidity -= amount;
        }

        Ok(())
    }

    /// Applies a swap exactly as reported by the pool.
    pub fn apply_swap(
        &mut self,
        amount_0: I256,
        amount_1: I256,
        sqrt_price: U256,
        liquidity: u128,
        tick: i32,
    ) -> Result<(), AMMError> {
        let state = self.state_mut()?;
        state.reserve_0 = apply_signed_delta(state.reserve_0, amount_0);
        state.reserve_1 = apply_signed_delta(state.reserve_1, amount_1);
        state.sqrt_price = sqrt_price;
        state.liquidity = liquidity;
        state.tick = tick;

        Ok(())
    }

    pub fn apply_flash(&mut self, paid_0: U256, paid_1: U256) -> Result<(), AMMError> {
        let state = self.state_mut()?;
        state.reserve_0 = state.reserve_0.saturating_add(paid_0);
        state.reserve_1 = state.reserve_1.saturating_add(paid_1);

        Ok(())
    }

    pub fn apply_collect(&mut self, amount_0: u128, amount_1: u128) -> Result<(), AMMError> {
        let state = self.state_mut()?;
        state.reserve_0 = state.reserve_0.saturating_sub(U256::from(amount_0));
        state.reserve_1 = state.reserve_1.saturating_sub(U256::from(amount_1));

        Ok(())
    }

    /// Sqrt price the pool would end at after swapping `amount_in` of `token_in`.
    pub fn simulate_swap_price(&self, token_in: Address, amount_in: U256) -> Result<U256, AMMError> {
        let zero_for_one = self.zero_for_one(token_in)?;
        Ok(self.walk_swap(zero_for_one, amount_in)?.sqrt_price)
    }

    fn zero_for_one(&self, token_in: Address) -> Result<bool, AMMError> {
        if token_in == self.token_a {
            Ok(true)
        } else if token_in == self.token_b {
            Ok(false)
        } else {
            Err(AMMError::IncompatibleToken(token_in))
        }
    }

    fn walk_swap(&self, zero_for_one: bool, amount_in: U256) -> Result<CurrentState, AMMError> {
        let state = self.state()?;
        if amount_in.is_zero() {
            return Ok(CurrentState {
                sqrt_price: state.sqrt_price,
                amount_specified_remaining: U256::ZERO,
                amount_calculated: U256::ZERO,
                tick: state.tick,
                liquidity: state.liquidity,
            });
        }

        if state.liquidity == 0 {
            return Err(SwapSimulationError::NoLiquidity.into());
        }

        // Set sqrt_price_limit to the max or min sqrt price in the pool depending on zero_for_one
        let sqrt_price_limit = if zero_for_one {
            MIN_SQRT_RATIO + U256_1
        } else {
            MAX_SQRT_RATIO - U256_1
        };

        let mut current_state = CurrentState {
            sqrt_price: state.sqrt_price,
            amount_specified_remaining: amount_in,
            amount_calculated: U256::ZERO,
            tick: state.tick,
            liquidity: state.liquidity,
        };

        while !current_state.amount_specified_remaining.is_zero()
            && current_state.sqrt_price != sqrt_price_limit
        {
            let sqrt_price_start = current_state.sqrt_price;

            let tick_next = self.next_initialized_tick(current_state.tick, zero_for_one)?;

            // Past the last loaded tick the walk targets the price limit and stops after one step
            let sqrt_price_next = match tick_next {
                Some(tick) => sqrt_price_at_tick(tick.clamp(MIN_TICK, MAX_TICK))?,
                None => sqrt_price_limit,
            };

            let swap_target = if zero_for_one {
                sqrt_price_next.max(sqrt_price_limit)
            } else {
                sqrt_price_next.min(sqrt_price_limit)
            };

            let step = compute_swap_step(
                current_state.sqrt_price,
                swap_target,
                current_state.liquidity,
                current_state.amount_specified_remaining,
                self.fee,
            )?;

            current_state.sqrt_price = step.sqrt_price_next;
            current_state.amount_specified_remaining = current_state
                .amount_specified_remaining
                .saturating_sub(step.amount_in + step.fee_amount);
            current_state.amount_calculated += step.amount_out;

            match tick_next {
                Some(tick) if current_state.sqrt_price == sqrt_price_next => {
                    let mut liquidity_net = self
                        .tick_info(tick)?
                        .map(|info| info.liquidity_net)
                        .unwrap_or_default();

                    if zero_for_one {
                        liquidity_net = -liquidity_net;
                    }

                    current_state.liquidity =
                        add_liquidity_delta(current_state.liquidity, liquidity_net)
                            .map_err(|_| SwapSimulationError::LiquidityUnderflow)?;

                    current_state.tick = if zero_for_one { tick - 1 } else { tick };
                }
                None => {
                    current_state.tick = tick_at_sqrt_price(current_state.sqrt_price)?;
                    break;
                }
                _ if current_state.sqrt_price != sqrt_price_start => {
                    current_state.tick = tick_at_sqrt_price(current_state.sqrt_price)?;
                }
                _ => {}
            }
        }

        Ok(current_state)
    }

    /// Token amounts the active liquidity would hold at the current price.
    pub fn calculate_virtual_reserves(&self) -> Result<(U256, U256), AMMError> {
        let state = self.state()?;
        let liquidity = U256::from(state.liquidity);

        let reserve_0 = mul_div(liquidity << 96, U256_1, state.sqrt_price)?;
        let reserve_1 = mul_div(state.sqrt_price, liquidity, U256_1 << 96)?;

        Ok((reserve_0, reserve_1))
    }
}

#[derive(Debug, Clone, Copy)]
struct CurrentState {
    sqrt_price: U256,
    amount_specified_remaining: U256,
    amount_calculated: U256,
    tick: i32,
    liquidity: u128,
}

pub(crate) fn word_and_bit(compressed: i32) -> (i16, u8) {
    // compressed ticks are bounded by MAX_TICK, so the word always fits in an i16
    (
        compressed.div_euclid(256) as i16,
        compressed.rem_euclid(256) as u8,
    )
}

fn add_liquidity_delta(liquidity: u128, delta: i128) -> Result<u128, ArithmeticError> {
    if delta < 0 {
        liquidity
            .checked_sub(delta.unsigned_abs())
            .ok_or(ArithmeticError::LiquidityUnderflow)
    } else {
        liquidity
            .checked_add(delta as u128)
            .ok_or(ArithmeticError::LiquidityOverflow)
    }
}

fn apply_signed_delta(reserve: U256, delta: I256) -> U256 {
    if delta.is_negative() {
        reserve.saturating_sub(delta.unsigned_abs())
    } else {
        reserve.saturating_add(delta.into_raw())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amm::consts::Q96;
    use alloy::primitives::address;

    const TOKEN_A: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const TOKEN_B: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

    fn initialized_pool(tick_spacing: i32) -> UniswapV3Pool {
        let mut pool = UniswapV3Pool::new(
            address!("88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640"),
            TOKEN_A,
            TOKEN_B,
            3000,
            tick_spacing,
        );
        pool.initialize(Q96, 0);
        pool
    }

    /// Every tick key has its bit set and every set bit has a tick key.
    fn assert_bitmap_consistent(pool: &UniswapV3Pool) {
        for tick in pool.ticks.keys() {
            let (word_pos, bit_pos) = pool.position(*tick).unwrap();
            let word = pool.tick_bitmap.get(&word_pos).copied().unwrap_or_default();
            assert!(word.bit(bit_pos as usize), "bit for tick {tick} not set");
        }

        for (word_pos, word) in &pool.tick_bitmap {
            for bit in 0..256 {
                if word.bit(bit) {
                    let tick = (*word_pos as i32 * 256 + bit as i32) * pool.tick_spacing;
                    assert!(pool.ticks.contains_key(&tick), "tick {tick} missing");
                }
            }
        }
    }

    #[test]
    fn test_initialize_then_mint() {
        let mut pool = initialized_pool(60);
        let liquidity = 1_000_000_000_000_000_000_u128;

        pool.mint(-120, 120, liquidity, U256::from(5), U256::from(7))
            .unwrap();

        let state = pool.state().unwrap();
        assert_eq!(state.liquidity, liquidity);
        assert_eq!(state.reserve_0, U256::from(5));
        assert_eq!(state.reserve_1, U256::from(7));
        assert_eq!(pool.ticks.len(), 2);
        assert_eq!(
            pool.ticks[&-120],
            TickInfo::new(liquidity as i128, liquidity)
        );
        assert_eq!(
            pool.ticks[&120],
            TickInfo::new(-(liquidity as i128), liquidity)
        );
        assert_bitmap_consistent(&pool);
        assert_eq!(pool.tick_bitmap.values().map(|w| w.count_ones()).sum::<usize>(), 2);
    }

    #[test]
    fn test_mint_out_of_range_leaves_active_liquidity() {
        let mut pool = initialized_pool(10);
        pool.mint(100, 200, 500, U256::ZERO, U256::ZERO).unwrap();
        assert_eq!(pool.state().unwrap().liquidity, 0);

        // the upper bound is exclusive
        pool.mint(-100, 0, 500, U256::ZERO, U256::ZERO).unwrap();
        assert_eq!(pool.state().unwrap().liquidity, 0);

        // the lower bound is inclusive
        pool.mint(0, 100, 500, U256::ZERO, U256::ZERO).unwrap();
        assert_eq!(pool.state().unwrap().liquidity, 500);
        assert_bitmap_consistent(&pool);
    }

    #[test]
    fn test_mint_then_burn_restores_ticks() {
        let mut pool = initialized_pool(60);
        pool.mint(-600, 600, 1_000, U256::ZERO, U256::ZERO).unwrap();

        let ticks_before = pool.ticks.clone();
        let bitmap_before = pool.tick_bitmap.clone();
        let liquidity_before = pool.state().unwrap().liquidity;

        pool.mint(-120, 600, 250, U256::ZERO, U256::ZERO).unwrap();
        pool.burn(-120, 600, 250).unwrap();

        assert_eq!(pool.ticks, ticks_before);
        assert_eq!(pool.tick_bitmap, bitmap_before);
        assert_eq!(pool.state().unwrap().liquidity, liquidity_before);
        assert_bitmap_consistent(&pool);
    }

    #[test]
    fn test_burn_does_not_touch_reserves() {
        let mut pool = initialized_pool(60);
        pool.mint(-60, 60, 1_000, U256::from(10), U256::from(10))
            .unwrap();
        pool.burn(-60, 60, 1_000).unwrap();

        let state = pool.state().unwrap();
        assert_eq!(state.reserve_0, U256::from(10));
        assert_eq!(state.liquidity, 0);
        assert!(pool.ticks.is_empty());
        assert_bitmap_consistent(&pool);

        pool.apply_collect(4, 10).unwrap();
        let state = pool.state().unwrap();
        assert_eq!(state.reserve_0, U256::from(6));
        assert_eq!(state.reserve_1, U256::ZERO);
    }

    #[test]
    fn test_burn_uninitialized_tick() {
        let mut pool = initialized_pool(60);
        pool.mint(-60, 60, 1_000, U256::ZERO, U256::ZERO).unwrap();
        let before = pool.clone();

        let err = pool.burn(-60, 120, 1_000).unwrap_err();
        assert!(matches!(
            err,
            AMMError::StateError(StateError::UninitializedTick(120))
        ));
        // nothing was written
        assert_eq!(pool, before);
    }

    #[test]
    fn test_mutation_requires_initialization() {
        let mut pool = UniswapV3Pool::new(Address::ZERO, TOKEN_A, TOKEN_B, 500, 10);

        assert!(matches!(
            pool.mint(-10, 10, 1, U256::ZERO, U256::ZERO),
            Err(AMMError::StateError(StateError::UninitializedPool))
        ));
        assert!(matches!(
            pool.apply_flash(U256::from(1), U256::from(1)),
            Err(AMMError::StateError(StateError::UninitializedPool))
        ));
    }

    #[test]
    fn test_unfetched_word_is_distinct_from_empty_word() {
        let mut pool = UniswapV3Pool::new(Address::ZERO, TOKEN_A, TOKEN_B, 500, 10);
        pool.set_state(PoolState {
            tick: 0,
            liquidity: 1,
            sqrt_price: Q96,
            ..Default::default()
        });
        pool.set_bitmap_word(0, U256::ZERO);

        assert_eq!(pool.bitmap_word(0), BitmapWord::Known(U256::ZERO));
        assert_eq!(pool.bitmap_word(1), BitmapWord::Unfetched);
        assert_eq!(pool.tick_info(10), Ok(None));
        assert_eq!(
            pool.tick_info(2560),
            Err(StateError::UnfetchedBitmapWord(1))
        );

        // a set bit without tick data is a different fault
        pool.set_bitmap_word(-1, U256_1 << 255);
        assert_eq!(pool.tick_info(-10), Err(StateError::UnfetchedTick(-10)));
    }

    #[test]
    fn test_tick_not_on_spacing() {
        let mut pool = initialized_pool(60);
        assert!(matches!(
            pool.mint(-61, 60, 1, U256::ZERO, U256::ZERO),
            Err(AMMError::StateError(StateError::TickNotOnSpacing { tick: -61, .. }))
        ));
    }

    #[test]
    fn test_next_initialized_tick() {
        let mut pool = initialized_pool(60);
        pool.mint(-600, -120, 1, U256::ZERO, U256::ZERO).unwrap();
        pool.mint(60, 60 * 300, 1, U256::ZERO, U256::ZERO).unwrap();

        assert_eq!(pool.next_initialized_tick(0, true), Ok(Some(-120)));
        assert_eq!(pool.next_initialized_tick(-120, true), Ok(Some(-120)));
        assert_eq!(pool.next_initialized_tick(-121, true), Ok(Some(-600)));
        assert_eq!(pool.next_initialized_tick(-601, true), Ok(None));
        assert_eq!(pool.next_initialized_tick(0, false), Ok(Some(60)));
        // crosses into the next bitmap word
        assert_eq!(pool.next_initialized_tick(60, false), Ok(Some(18000)));
        assert_eq!(pool.next_initialized_tick(18000, false), Ok(None));
    }

    #[test]
    fn test_apply_swap_overwrites_state() {
        let mut pool = initialized_pool(60);
        pool.mint(-60, 60, 1_000, U256::from(100), U256::from(100))
            .unwrap();

        pool.apply_swap(
            I256::from_raw(U256::from(40)),
            -I256::from_raw(U256::from(30)),
            Q96 - U256::from(1_000),
            7,
            -1,
        )
        .unwrap();

        let state = pool.state().unwrap();
        assert_eq!(state.reserve_0, U256::from(140));
        assert_eq!(state.reserve_1, U256::from(70));
        assert_eq!(state.sqrt_price, Q96 - U256::from(1_000));
        assert_eq!(state.liquidity, 7);
        assert_eq!(state.tick, -1);
    }

    fn deep_pool() -> UniswapV3Pool {
        let mut pool = initialized_pool(60);
        let liquidity = 10_000_000_000_000_000_000_u128;
        pool.mint(-6000, 6000, liquidity, U256::ZERO, U256::ZERO)
            .unwrap();
        pool.mint(-600, 600, liquidity, U256::ZERO, U256::ZERO)
            .unwrap();
        pool
    }

    #[test]
    fn test_simulate_swap_does_not_mutate() {
        let pool = deep_pool();
        let snapshot = pool.clone();

        let amount_out = pool
            .simulate_swap(TOKEN_A, U256::from(1_000_000_000_000_000_000_u128))
            .unwrap();
        let price = pool
            .simulate_swap_price(TOKEN_B, U256::from(1_000_000_000_000_000_000_u128))
            .unwrap();

        assert!(amount_out > U256::ZERO);
        assert!(price > Q96);
        assert_eq!(pool, snapshot);
    }

    #[test]
    fn test_simulate_swap_crosses_ticks() {
        let pool = deep_pool();

        // crosses -600 and stops inside the outer range
        let amount_in = U256::from(1_000_000_000_000_000_000_u128);
        let amount_out = pool.simulate_swap(TOKEN_A, amount_in).unwrap();
        let sqrt_price = pool.simulate_swap_price(TOKEN_A, amount_in).unwrap();

        assert!(amount_out > U256::ZERO);
        assert!(sqrt_price < sqrt_price_at_tick(-600).unwrap());

        let mut committed = pool.clone();
        let committed_out = committed.simulate_swap_mut(TOKEN_A, amount_in).unwrap();
        let state = committed.state().unwrap();
        assert_eq!(committed_out, amount_out);
        assert_eq!(state.sqrt_price, sqrt_price);
        assert_eq!(state.liquidity, 10_000_000_000_000_000_000_u128);
        assert!(state.tick < -600);
    }

    #[test]
    fn test_simulate_swap_stops_at_end_of_loaded_ticks() {
        let pool = deep_pool();

        // far more than the book can absorb, the walk runs out of ticks and stops
        let amount_in = U256::from(u128::MAX);
        let sqrt_price = pool.simulate_swap_price(TOKEN_B, amount_in).unwrap();
        assert_eq!(sqrt_price, MAX_SQRT_RATIO - U256_1);
    }

    #[test]
    fn test_simulate_swap_no_liquidity() {
        let pool = initialized_pool(60);
        assert!(matches!(
            pool.simulate_swap(TOKEN_A, U256::from(1)),
            Err(AMMError::SwapSimulationError(SwapSimulationError::NoLiquidity))
        ));
    }

    #[test]
    fn test_simulate_swap_zero_input() {
        let pool = initialized_pool(60);

        assert_eq!(pool.simulate_swap(TOKEN_A, U256::ZERO).unwrap(), U256::ZERO);
        assert_eq!(pool.simulate_swap_price(TOKEN_B, U256::ZERO).unwrap(), Q96);
    }

    #[test]
    fn test_mint_liquidity_overflow_leaves_pool_untouched() {
        let mut pool = initialized_pool(60);
        pool.state.as_mut().unwrap().liquidity = u128::MAX - 10;
        let before = pool.clone();

        assert!(matches!(
            pool.mint(-60, 60, 100, U256::from(1), U256::from(1)),
            Err(AMMError::ArithmeticError(ArithmeticError::LiquidityOverflow))
        ));
        assert_eq!(pool, before);
        assert!(pool.ticks.is_empty());
        assert!(pool.tick_bitmap.is_empty());
    }

    #[test]
    fn test_simulate_swap_incompatible_token() {
        let pool = deep_pool();
        assert!(matches!(
            pool.simulate_swap(Address::ZERO, U256::from(1)),
            Err(AMMError::IncompatibleToken(_))
        ));
    }

    #[test]
    fn test_calculate_price_and_virtual_reserves() {
        let pool = deep_pool();

        assert!((pool.calculate_price(TOKEN_A).unwrap() - 1.0).abs() < 1e-12);
        assert!((pool.calculate_price(TOKEN_B).unwrap() - 1.0).abs() < 1e-12);

        let (reserve_0, reserve_1) = pool.calculate_virtual_reserves().unwrap();
        let liquidity = U256::from(pool.state().unwrap().liquidity);
        assert_eq!(reserve_0, liquidity);
        assert_eq!(reserve_1, liquidity);
    }
}
