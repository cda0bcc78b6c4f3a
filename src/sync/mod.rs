//! Chain reads that assemble pools, and log-driven refreshes of pools already held.

pub mod checkpoint;

use std::collections::HashMap;

use alloy::{
    primitives::{Address, Bytes, U256},
    rpc::types::{BlockNumberOrTag, Filter, Log},
    sol_types::SolCall,
};
use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};

use crate::{
    amm::{
        factory::{FactoryRegistry, PoolVariant},
        uniswap_v2::{IUniswapV2Pair, UniswapV2Pool},
        uniswap_v3::{
            backfill::backfill_ticks,
            events::{replay_logs_into, sort_logs},
            IUniswapV3Pool, PoolState, UniswapV3Pool,
        },
        AutomatedMarketMaker, IErc20, AMM,
    },
    config::SyncConfig,
    errors::AMMError,
    rpc::{logs::get_logs_bisecting, requests::CallRequest, RpcClient, RpcError, Transport},
};

/// Reads a constant product pool at `block`. The pool's factory must be in `registry`.
#[instrument(skip(client, registry), level = "debug")]
pub async fn get_uniswap_v2_pool<T: Transport>(
    client: &RpcClient<T>,
    registry: &FactoryRegistry,
    address: Address,
    block: BlockNumberOrTag,
) -> Result<UniswapV2Pool, AMMError> {
    let requests = [
        CallRequest::new(address, IUniswapV2Pair::token0Call {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV2Pair::token1Call {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV2Pair::getReservesCall {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV2Pair::factoryCall {}.abi_encode(), block),
    ];

    let [token_0, token_1, reserves, factory] = batch_results(client, &requests).await?;
    let token_0 = decode_return::<IUniswapV2Pair::token0Call>(address, token_0)?._0;
    let token_1 = decode_return::<IUniswapV2Pair::token1Call>(address, token_1)?._0;
    let reserves = decode_return::<IUniswapV2Pair::getReservesCall>(address, reserves)?;
    let factory = decode_return::<IUniswapV2Pair::factoryCall>(address, factory)?._0;

    let PoolVariant::ConstantProduct { fee } = registry.variant(factory)? else {
        return Err(AMMError::UnknownFactory(factory));
    };

    let pool = UniswapV2Pool::new(
        address,
        token_0,
        token_1,
        reserves.reserve0.to::<u128>(),
        reserves.reserve1.to::<u128>(),
        fee,
    );
    info!(?address, pool.reserve_0, pool.reserve_1, "read UniswapV2 pool");

    Ok(pool)
}

/// Reads a concentrated liquidity pool at `block`, including about `number_of_ticks`
/// initialized ticks around its current tick.
///
/// Bitmap words and ticks outside the backfilled window stay unfetched.
#[instrument(skip(client), level = "debug")]
pub async fn get_uniswap_v3_pool<T: Transport>(
    client: &RpcClient<T>,
    address: Address,
    number_of_ticks: usize,
    block: BlockNumberOrTag,
) -> Result<UniswapV3Pool, AMMError> {
    let requests = [
        CallRequest::new(address, IUniswapV3Pool::token0Call {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV3Pool::token1Call {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV3Pool::tickSpacingCall {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV3Pool::feeCall {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV3Pool::liquidityCall {}.abi_encode(), block),
        CallRequest::new(address, IUniswapV3Pool::slot0Call {}.abi_encode(), block),
    ];

    let [token_0, token_1, tick_spacing, fee, liquidity, slot_0] =
        batch_results(client, &requests).await?;
    let token_0 = decode_return::<IUniswapV3Pool::token0Call>(address, token_0)?._0;
    let token_1 = decode_return::<IUniswapV3Pool::token1Call>(address, token_1)?._0;
    let tick_spacing =
        decode_return::<IUniswapV3Pool::tickSpacingCall>(address, tick_spacing)?._0;
    let fee = decode_return::<IUniswapV3Pool::feeCall>(address, fee)?._0;
    let liquidity = decode_return::<IUniswapV3Pool::liquidityCall>(address, liquidity)?._0;
    let slot_0 = decode_return::<IUniswapV3Pool::slot0Call>(address, slot_0)?;

    if slot_0.feeProtocol != 0 {
        return Err(AMMError::UnsupportedProtocolFee(address));
    }

    let mut pool = UniswapV3Pool::new(
        address,
        token_0,
        token_1,
        fee.to::<u32>(),
        tick_spacing.as_i32(),
    );
    let tick = slot_0.tick.as_i32();

    let tick_data = backfill_ticks(
        client,
        address,
        tick,
        pool.tick_spacing,
        number_of_ticks,
        block,
    )
    .await?;

    let balance_requests = [token_0, token_1].map(|token| {
        CallRequest::new(
            token,
            IErc20::balanceOfCall { account: address }.abi_encode(),
            block,
        )
    });
    let [balance_0, balance_1] = batch_results(client, &balance_requests).await?;
    let reserve_0 = decode_return::<IErc20::balanceOfCall>(token_0, balance_0)?._0;
    let reserve_1 = decode_return::<IErc20::balanceOfCall>(token_1, balance_1)?._0;

    pool.set_state(PoolState {
        tick,
        liquidity,
        sqrt_price: slot_0.sqrtPriceX96.to::<U256>(),
        reserve_0,
        reserve_1,
    });
    pool.tick_bitmap = tick_data.bitmap;
    pool.ticks = tick_data.ticks;

    info!(
        ?address,
        tick,
        liquidity,
        ticks = pool.ticks.len(),
        "read UniswapV3 pool"
    );

    Ok(pool)
}

/// Refreshes the reserves of constant product pools with one batched `getReserves` read.
#[instrument(skip_all, fields(pools = pools.len()), level = "debug")]
pub async fn update_v2_pools_from_chain<T: Transport>(
    client: &RpcClient<T>,
    pools: &mut [UniswapV2Pool],
    block: BlockNumberOrTag,
) -> Result<(), AMMError> {
    let requests = pools
        .iter()
        .map(|pool| {
            CallRequest::new(
                pool.address,
                IUniswapV2Pair::getReservesCall {}.abi_encode(),
                block,
            )
        })
        .collect::<Vec<_>>();

    let results = client.send_batch(&requests).await?;

    for (pool, result) in pools.iter_mut().zip(results) {
        let reserves = decode_return::<IUniswapV2Pair::getReservesCall>(pool.address, result)?;
        pool.set_reserves(reserves.reserve0.to::<u128>(), reserves.reserve1.to::<u128>());
    }

    Ok(())
}

/// Advances concentrated liquidity pools over `[from_block, to_block]` by replaying their
/// logs in chain order.
///
/// One log query per event kind is issued concurrently. Nothing is applied if any query fails.
#[instrument(skip(client, pools, config), fields(pools = pools.len()), level = "debug")]
pub async fn update_v3_pools_from_logs<T: Transport>(
    client: &RpcClient<T>,
    pools: &mut HashMap<Address, UniswapV3Pool>,
    from_block: u64,
    to_block: u64,
    config: &SyncConfig,
) -> Result<(), AMMError> {
    let Some(template) = pools.values().next() else {
        return Ok(());
    };

    let addresses = pools.keys().copied().collect::<Vec<_>>();
    let filters = template
        .sync_events()
        .into_iter()
        .map(|signature| {
            Filter::new()
                .address(addresses.clone())
                .event_signature(signature)
        })
        .collect::<Vec<_>>();

    let logs = try_join_all(
        filters
            .iter()
            .map(|filter| get_logs(client, filter, from_block, to_block, config)),
    )
    .await?
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    debug!(logs = logs.len(), "replaying pool logs");
    replay_logs_into(pools, logs)
}

/// Fetches logs over `[from_block, to_block]`.
///
/// Spans above the configured threshold go straight to the range-splitting fetcher. Shorter
/// spans are queried once and only split if the provider rejects them as too large.
pub async fn get_logs<T: Transport>(
    client: &RpcClient<T>,
    filter: &Filter,
    from_block: u64,
    to_block: u64,
    config: &SyncConfig,
) -> Result<Vec<Log>, RpcError> {
    if to_block < from_block {
        return Ok(vec![]);
    }

    if to_block - from_block + 1 > config.smart_log_threshold {
        return get_logs_bisecting(client, filter, from_block, to_block).await;
    }

    match client
        .get_logs(filter.clone().from_block(from_block).to_block(to_block))
        .await
    {
        Err(RpcError::RangeTooLarge { .. }) if to_block > from_block => {
            get_logs_bisecting(client, filter, from_block, to_block).await
        }
        result => result,
    }
}

/// Finds every pool created by the registry's factories in `[from_block, to_block]`, in
/// creation order.
///
/// Pools are returned with only their identity known.
#[instrument(skip(client, registry, config), level = "debug")]
pub async fn discover_pools<T: Transport>(
    client: &RpcClient<T>,
    registry: &FactoryRegistry,
    from_block: u64,
    to_block: u64,
    config: &SyncConfig,
) -> Result<Vec<AMM>, AMMError> {
    let step = config.factory_log_threshold.max(1);
    let mut queries = vec![];

    for entry in registry.entries() {
        let filter = Filter::new()
            .address(entry.address)
            .event_signature(entry.variant.creation_event());

        let mut chunk_start = from_block.max(entry.creation_block);
        while chunk_start <= to_block {
            let chunk_end = chunk_start.saturating_add(step - 1).min(to_block);
            queries.push((filter.clone(), chunk_start, chunk_end));
            if chunk_end == to_block {
                break;
            }
            chunk_start = chunk_end + 1;
        }
    }

    let mut logs = try_join_all(
        queries
            .iter()
            .map(|(filter, from, to)| get_logs(client, filter, *from, *to, config)),
    )
    .await?
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();
    sort_logs(&mut logs)?;

    let amms = logs
        .iter()
        .map(|log| registry.create_pool(log))
        .collect::<Result<Vec<_>, _>>()?;
    info!(pools = amms.len(), "discovered pools");

    Ok(amms)
}

/// Reads the state of discovered pools at `block`.
///
/// Concentrated liquidity pools that no longer exist or charge a protocol fee are dropped.
#[instrument(skip(client, amms, config), fields(amms = amms.len()), level = "debug")]
pub async fn populate_amms<T: Transport>(
    client: &RpcClient<T>,
    amms: Vec<AMM>,
    config: &SyncConfig,
    block: BlockNumberOrTag,
) -> Result<Vec<AMM>, AMMError> {
    let mut v2_pools = vec![];
    let mut v3_addresses = vec![];
    for amm in amms {
        match amm {
            AMM::UniswapV2Pool(pool) => v2_pools.push(pool),
            AMM::UniswapV3Pool(pool) => v3_addresses.push(pool.address),
        }
    }

    update_v2_pools_from_chain(client, &mut v2_pools, block).await?;

    let v3_results = try_join_all(v3_addresses.into_iter().map(|address| async move {
        match get_uniswap_v3_pool(client, address, config.number_of_ticks, block).await {
            Ok(pool) => Ok(Some(pool)),
            Err(AMMError::PoolDoesNotExist(_)) | Err(AMMError::UnsupportedProtocolFee(_)) => {
                warn!(?address, "skipping pool");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }))
    .await?;

    Ok(v2_pools
        .into_iter()
        .map(AMM::from)
        .chain(v3_results.into_iter().flatten().map(AMM::from))
        .collect())
}

/// Discovers and reads every pool of the registry's factories.
///
/// Returns the pools with the block they were read at. Log-driven updates must start at the
/// block after it so that no event is missed or applied twice.
///
/// ```no_run
/// use amm_replica::{
///     amm::factory::FactoryRegistry,
///     config::SyncConfig,
///     rpc::{HttpTransport, RpcClient},
///     sync::sync_amms,
/// };
///
/// #[tokio::main]
/// async fn main() -> eyre::Result<()> {
///     tracing_subscriber::fmt::init();
///     let rpc_endpoint = std::env::var("ETHEREUM_RPC_ENDPOINT")?;
///     let client = RpcClient::new(HttpTransport::new(&rpc_endpoint)?);
///     let registry = FactoryRegistry::from_path("config/factories.mainnet.json")?;
///
///     let (amms, block_number) = sync_amms(&client, &registry, &SyncConfig::default()).await?;
///     println!("{} pools at block {block_number}", amms.len());
///
///     Ok(())
/// }
/// ```
#[instrument(skip_all, level = "debug")]
pub async fn sync_amms<T: Transport>(
    client: &RpcClient<T>,
    registry: &FactoryRegistry,
    config: &SyncConfig,
) -> Result<(Vec<AMM>, u64), AMMError> {
    let block_number = client.block_number().await?;

    let amms = discover_pools(client, registry, 0, block_number, config).await?;
    let amms = populate_amms(client, amms, config, BlockNumberOrTag::Number(block_number)).await?;
    info!(block_number, amms = amms.len(), "synced pools");

    Ok((amms, block_number))
}

async fn batch_results<T: Transport, const N: usize>(
    client: &RpcClient<T>,
    requests: &[CallRequest; N],
) -> Result<[Result<Option<Bytes>, RpcError>; N], AMMError> {
    let results = client.send_batch(requests).await?;
    let count = results.len();

    results.try_into().map_err(|_| {
        RpcError::BatchCorrelation(format!("expected {N} results, received {count}")).into()
    })
}

fn decode_return<C: SolCall>(
    contract: Address,
    result: Result<Option<Bytes>, RpcError>,
) -> Result<C::Return, AMMError> {
    let data = result?.ok_or(AMMError::PoolDoesNotExist(contract))?;

    Ok(C::abi_decode_returns(&data, true)?)
}
