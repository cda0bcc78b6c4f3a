//! Exact fixed-point math for concentrated liquidity pools.
//!
//! Every function here is pure integer arithmetic over `U256`, with `U512` intermediates
//! wherever a product can exceed 256 bits.

pub mod full_math;
pub mod sqrt_price_math;
pub mod swap_math;
pub mod tick_math;

pub use sqrt_price_math::{amount_0_delta, amount_1_delta, next_sqrt_price_from_input};
pub use swap_math::{compute_swap_step, SwapStep};
pub use tick_math::{sqrt_price_at_tick, tick_at_sqrt_price};
