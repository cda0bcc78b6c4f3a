use alloy::primitives::U256;

// commonly used U256s
pub const U256_1: U256 = U256::from_limbs([1, 0, 0, 0]);
pub const U256_0XFFFFFFFF: U256 = U256::from_limbs([4294967295, 0, 0, 0]);

pub const U256_FEE_ONE: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);

// Uniswap V3 specific
pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([4295128739, 0, 0, 0]);
pub const MAX_SQRT_RATIO: U256 =
    U256::from_limbs([6743328256752651558, 17280870778742802505, 4294805859, 0]);
pub const Q96: U256 = U256::from_limbs([0, 4294967296, 0, 0]);
pub const RESOLUTION: usize = 96;
pub const U160_MAX: U256 = U256::from_limbs([u64::MAX, u64::MAX, 4294967295, 0]);

// Others
pub const F64_2P192: f64 = 6277101735386680763835789423207666416102355444464034512896.0; // 2^192
