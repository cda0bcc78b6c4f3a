use std::collections::HashMap;

use alloy::{
    primitives::{Address, I256, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};

use super::{IUniswapV3Pool, UniswapV3Pool};
use crate::{
    amm::AutomatedMarketMaker,
    errors::{AMMError, EventLogError},
};

/// A decoded pool log, reduced to the fields that change the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    Initialize {
        sqrt_price: U256,
        tick: i32,
    },
    Mint {
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount_0: U256,
        amount_1: U256,
    },
    Burn {
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount_0: U256,
        amount_1: U256,
    },
    Swap {
        amount_0: I256,
        amount_1: I256,
        sqrt_price: U256,
        liquidity: u128,
        tick: i32,
    },
    Flash {
        paid_0: U256,
        paid_1: U256,
    },
    Collect {
        amount_0: u128,
        amount_1: u128,
    },
}

impl PoolEvent {
    pub fn decode(log: &Log) -> Result<Self, EventLogError> {
        let topic = log.topics().first().ok_or(EventLogError::MissingTopic)?;

        let event = match *topic {
            IUniswapV3Pool::Initialize::SIGNATURE_HASH => {
                let event = IUniswapV3Pool::Initialize::decode_log(&log.inner, true)?;
                PoolEvent::Initialize {
                    sqrt_price: U256::from(event.sqrtPriceX96),
                    tick: event.tick.as_i32(),
                }
            }
            IUniswapV3Pool::Mint::SIGNATURE_HASH => {
                let event = IUniswapV3Pool::Mint::decode_log(&log.inner, true)?;
                PoolEvent::Mint {
                    tick_lower: event.tickLower.as_i32(),
                    tick_upper: event.tickUpper.as_i32(),
                    amount: event.amount,
                    amount_0: event.amount0,
                    amount_1: event.amount1,
                }
            }
            IUniswapV3Pool::Burn::SIGNATURE_HASH => {
                let event = IUniswapV3Pool::Burn::decode_log(&log.inner, true)?;
                PoolEvent::Burn {
                    tick_lower: event.tickLower.as_i32(),
                    tick_upper: event.tickUpper.as_i32(),
                    amount: event.amount,
                    amount_0: event.amount0,
                    amount_1: event.amount1,
                }
            }
            IUniswapV3Pool::Swap::SIGNATURE_HASH => {
                let event = IUniswapV3Pool::Swap::decode_log(&log.inner, true)?;
                PoolEvent::Swap {
                    amount_0: event.amount0,
                    amount_1: event.amount1,
                    sqrt_price: U256::from(event.sqrtPriceX96),
                    liquidity: event.liquidity,
                    tick: event.tick.as_i32(),
                }
            }
            IUniswapV3Pool::Flash::SIGNATURE_HASH => {
                let event = IUniswapV3Pool::Flash::decode_log(&log.inner, true)?;
                PoolEvent::Flash {
                    paid_0: event.paid0,
                    paid_1: event.paid1,
                }
            }
            IUniswapV3Pool::Collect::SIGNATURE_HASH => {
                let event = IUniswapV3Pool::Collect::decode_log(&log.inner, true)?;
                PoolEvent::Collect {
                    amount_0: event.amount0,
                    amount_1: event.amount1,
                }
            }
            _ => return Err(EventLogError::InvalidEventSignature),
        };

        Ok(event)
    }
}

/// Sorts logs into chain order, by block number then log index.
pub fn sort_logs(logs: &mut [Log]) -> Result<(), EventLogError> {
    if logs
        .iter()
        .any(|log| log.block_number.is_none() || log.log_index.is_none())
    {
        return Err(EventLogError::LogPositionNotFound);
    }

    logs.sort_by_key(|log| (log.block_number, log.log_index));
    Ok(())
}

/// Replays logs against a single pool in chain order.
///
/// Stops at the first log that cannot be applied. Logs already applied stay applied, so the
/// pool must be re-read after an error.
pub fn replay_logs(pool: &mut UniswapV3Pool, mut logs: Vec<Log>) -> Result<(), AMMError> {
    sort_logs(&mut logs)?;

    for log in logs.iter() {
        pool.sync(log).map_err(|err| replay_error(log, err))?;
    }

    Ok(())
}

/// Replays logs against the pools they were emitted by, in chain order.
///
/// A log from an address that is not tracked fails the whole batch.
pub fn replay_logs_into(
    pools: &mut HashMap<Address, UniswapV3Pool>,
    mut logs: Vec<Log>,
) -> Result<(), AMMError> {
    sort_logs(&mut logs)?;

    for log in logs.iter() {
        let pool = pools
            .get_mut(&log.address())
            .ok_or(EventLogError::UnknownPool(log.address()))?;

        pool.sync(log).map_err(|err| replay_error(log, err))?;
    }

    Ok(())
}

fn replay_error(log: &Log, source: AMMError) -> AMMError {
    AMMError::ReplayError {
        block_number: log.block_number.unwrap_or_default(),
        source: Box::new(source),
    }
}
