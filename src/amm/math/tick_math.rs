use alloy::primitives::U256;

use crate::{
    amm::consts::{MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK, U256_0XFFFFFFFF, U256_1},
    errors::ArithmeticError,
};

// sqrt(1.0001^-(2^i)) in Q128.128 for i in 1..=19, bit 0 is handled by the seed ratio
const SQRT_RATIO_MULTIPLIERS: [u128; 19] = [
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

const SEED_RATIO_ODD: u128 = 0xfffcb933bd6fad37aa2d162d1a594001;

/// Returns `sqrt(1.0001^tick) * 2^96`, rounded up.
pub fn sqrt_price_at_tick(tick: i32) -> Result<U256, ArithmeticError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(ArithmeticError::TickOutOfBounds(tick));
    }

    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(SEED_RATIO_ODD)
    } else {
        U256_1 << 128
    };

    for (i, multiplier) in SQRT_RATIO_MULTIPLIERS.iter().enumerate() {
        if abs_tick & (0x2 << i) != 0 {
            ratio = (ratio * U256::from(*multiplier)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 down to Q64.96, rounding up so the inverse lookup stays consistent
    let sqrt_price = ratio >> 32;
    if (ratio & U256_0XFFFFFFFF).is_zero() {
        Ok(sqrt_price)
    } else {
        Ok(sqrt_price + U256_1)
    }
}

/// Returns the greatest tick whose sqrt price is less than or equal to `sqrt_price`.
///
/// Searches the monotonic tick to price mapping directly, which keeps the result exactly
/// consistent with [`sqrt_price_at_tick`].
pub fn tick_at_sqrt_price(sqrt_price: U256) -> Result<i32, ArithmeticError> {
    if sqrt_price < MIN_SQRT_RATIO || sqrt_price >= MAX_SQRT_RATIO {
        return Err(ArithmeticError::SqrtPriceOutOfBounds);
    }

    let (mut low, mut high) = (MIN_TICK, MAX_TICK);
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if sqrt_price_at_tick(mid)? <= sqrt_price {
            low = mid;
        } else {
            high = mid - 1;
        }
    }

    Ok(low)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amm::consts::Q96;

    #[test]
    fn test_sqrt_price_at_tick_known_values() {
        assert_eq!(sqrt_price_at_tick(0).unwrap(), Q96);
        assert_eq!(sqrt_price_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(sqrt_price_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
        assert_eq!(
            sqrt_price_at_tick(1).unwrap(),
            U256::from(79232123823359799118286999568_u128)
        );
        assert_eq!(
            sqrt_price_at_tick(-1).unwrap(),
            U256::from(79224201403219477170569942574_u128)
        );
    }

    #[test]
    fn test_sqrt_price_at_tick_out_of_bounds() {
        assert_eq!(
            sqrt_price_at_tick(MAX_TICK + 1),
            Err(ArithmeticError::TickOutOfBounds(MAX_TICK + 1))
        );
        assert_eq!(
            sqrt_price_at_tick(MIN_TICK - 1),
            Err(ArithmeticError::TickOutOfBounds(MIN_TICK - 1))
        );
    }

    #[test]
    fn test_sqrt_price_is_monotonic() {
        let mut previous = sqrt_price_at_tick(MIN_TICK).unwrap();
        let mut tick = MIN_TICK + 1;
        while tick <= MAX_TICK {
            let current = sqrt_price_at_tick(tick).unwrap();
            assert!(current > previous, "not increasing at tick {tick}");
            previous = current;
            tick += 4793;
        }
    }

    #[test]
    fn test_tick_round_trip() {
        for tick in [MIN_TICK, -276325, -60, -1, 0, 1, 60, 202919, MAX_TICK - 1] {
            let sqrt_price = sqrt_price_at_tick(tick).unwrap();
            assert_eq!(tick_at_sqrt_price(sqrt_price).unwrap(), tick);
            // a price strictly inside the tick maps back to the same tick
            assert_eq!(tick_at_sqrt_price(sqrt_price + U256_1).unwrap(), tick);
        }
    }

    #[test]
    fn test_tick_at_sqrt_price_bounds() {
        assert_eq!(
            tick_at_sqrt_price(MIN_SQRT_RATIO - U256_1),
            Err(ArithmeticError::SqrtPriceOutOfBounds)
        );
        assert_eq!(
            tick_at_sqrt_price(MAX_SQRT_RATIO),
            Err(ArithmeticError::SqrtPriceOutOfBounds)
        );
        assert_eq!(tick_at_sqrt_price(Q96 - U256_1).unwrap(), -1);
    }
}
