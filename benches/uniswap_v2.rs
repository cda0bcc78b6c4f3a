use alloy::primitives::{address, Address, U256};
use amm_replica::amm::{
    uniswap_v2::{FeeFraction, UniswapV2Pool},
    AutomatedMarketMaker,
};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;

const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
const TOKEN: Address = address!("fc0d6cf33e38bce7ca7d89c0e292274031b7157a");

fn simulate_swap(c: &mut Criterion) {
    let pool = UniswapV2Pool::new(
        address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc"),
        WETH,
        TOKEN,
        20_000_000_u128,
        20_000_000_u128,
        FeeFraction::default(),
    );

    let mut rng = rand::thread_rng();
    c.bench_function("uniswap_v2_simulate_swap", |b| {
        b.iter_with_setup(
            || U256::from(rng.gen_range(1_000..=1e24 as u128)),
            |amount| {
                let _ = pool.simulate_swap(WETH, amount).unwrap();
            },
        );
    });
}

criterion_group!(uniswap_v2, simulate_swap);
criterion_main!(uniswap_v2);
