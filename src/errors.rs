use alloy::primitives::Address;
use thiserror::Error;

use crate::rpc::error::RpcError;

#[derive(Error, Debug)]
pub enum AMMError {
    #[error(transparent)]
    RpcError(#[from] RpcError),
    #[error(transparent)]
    ArithmeticError(#[from] ArithmeticError),
    #[error(transparent)]
    StateError(#[from] StateError),
    #[error(transparent)]
    SwapSimulationError(#[from] SwapSimulationError),
    #[error(transparent)]
    EventLogError(#[from] EventLogError),
    #[error(transparent)]
    CheckpointError(#[from] CheckpointError),
    #[error("Sol types error")]
    SolTypesError(#[from] alloy::sol_types::Error),
    #[error("IO error")]
    IOError(#[from] std::io::Error),
    #[error("Serde json error")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Pool {0} does not exist at the requested block")]
    PoolDoesNotExist(Address),
    #[error("Pool {0} has a nonzero protocol fee, which is not supported")]
    UnsupportedProtocolFee(Address),
    #[error("Factory {0} is not present in the factory registry")]
    UnknownFactory(Address),
    #[error("Token {0} is not part of the pool")]
    IncompatibleToken(Address),
    #[error("Failed to apply log at block {block_number}: {source}")]
    ReplayError {
        block_number: u64,
        #[source]
        source: Box<AMMError>,
    },
    #[error(transparent)]
    EyreError(#[from] eyre::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Mul div overflow")]
    MulDivOverflow,
    #[error("Sqrt price overflow")]
    SqrtPriceOverflow,
    #[error("Sqrt price out of bounds")]
    SqrtPriceOutOfBounds,
    #[error("Tick {0} is outside the protocol bounds")]
    TickOutOfBounds(i32),
    #[error("Liquidity overflow")]
    LiquidityOverflow,
    #[error("Liquidity underflow")]
    LiquidityUnderflow,
    #[error("Could not represent value as a float")]
    ParseFloatError,
}

/// Faults caused by reading pool state that was never loaded or is not yet valid.
///
/// `UnfetchedBitmapWord` and `UnfetchedTick` mean the replica is missing data and the pool
/// must be re-read. A word that was fetched and is zero is not an error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("Pool has not been initialized")]
    UninitializedPool,
    #[error("Bitmap word {0} has not been fetched")]
    UnfetchedBitmapWord(i16),
    #[error("Tick {0} is marked initialized in the bitmap but was never fetched")]
    UnfetchedTick(i32),
    #[error("Tick {0} has no liquidity")]
    UninitializedTick(i32),
    #[error("Tick {tick} is not a multiple of the tick spacing {tick_spacing}")]
    TickNotOnSpacing { tick: i32, tick_spacing: i32 },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SwapSimulationError {
    #[error("Pool has no active liquidity")]
    NoLiquidity,
    #[error("Liquidity underflow")]
    LiquidityUnderflow,
}

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("Invalid event signature")]
    InvalidEventSignature,
    #[error("Log for {log} applied to pool {pool}")]
    AddressMismatch { log: Address, pool: Address },
    #[error("Log from {0} does not belong to any tracked pool")]
    UnknownPool(Address),
    #[error("Log block number or log index not found")]
    LogPositionNotFound,
    #[error("Log has no topics")]
    MissingTopic,
    #[error("Sol types error")]
    SolTypesError(#[from] alloy::sol_types::Error),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error")]
    IOError(#[from] std::io::Error),
    #[error("Serde json error")]
    SerdeJsonError(#[from] serde_json::error::Error),
    #[error("System time error")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}
