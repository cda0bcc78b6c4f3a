use std::{
    collections::HashMap,
    fs::read_to_string,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::{primitives::Address, rpc::types::BlockNumberOrTag};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    amm::{
        factory::{FactoryEntry, FactoryRegistry},
        uniswap_v3::UniswapV3Pool,
        AMM,
    },
    config::SyncConfig,
    errors::{AMMError, CheckpointError},
    rpc::{RpcClient, Transport},
};

use super::{discover_pools, populate_amms, update_v2_pools_from_chain, update_v3_pools_from_logs};

/// Pools as they stood at `block_number`, with the factories they were discovered from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: u64,
    pub block_number: u64,
    pub factories: Vec<FactoryEntry>,
    pub amms: Vec<AMM>,
}

impl Checkpoint {
    pub fn new(
        timestamp: u64,
        block_number: u64,
        factories: Vec<FactoryEntry>,
        amms: Vec<AMM>,
    ) -> Checkpoint {
        Checkpoint {
            timestamp,
            block_number,
            factories,
            amms,
        }
    }
}

/// Brings a checkpoint up to the current block and rewrites it.
///
/// Constant product pools are re-read, concentrated liquidity pools are advanced by replaying
/// their logs since the checkpoint, and pools created since then are discovered and read.
pub async fn sync_amms_from_checkpoint<T: Transport>(
    client: &RpcClient<T>,
    path_to_checkpoint: impl AsRef<Path>,
    config: &SyncConfig,
) -> Result<(Vec<AMM>, u64), AMMError> {
    let path = path_to_checkpoint.as_ref();
    let checkpoint: Checkpoint = serde_json::from_str(&read_to_string(path)?)?;
    let registry = FactoryRegistry::new(checkpoint.factories.clone());

    let current_block = client.block_number().await?;
    info!(
        from_block = checkpoint.block_number,
        current_block, "syncing pools from checkpoint"
    );

    if current_block <= checkpoint.block_number {
        return Ok((checkpoint.amms, checkpoint.block_number));
    }

    let block = BlockNumberOrTag::Number(current_block);
    let from_block = checkpoint.block_number + 1;

    let mut v2_pools = vec![];
    let mut v3_pools: HashMap<Address, UniswapV3Pool> = HashMap::new();
    for amm in checkpoint.amms {
        match amm {
            AMM::UniswapV2Pool(pool) => v2_pools.push(pool),
            AMM::UniswapV3Pool(pool) => {
                v3_pools.insert(pool.address, pool);
            }
        }
    }

    update_v2_pools_from_chain(client, &mut v2_pools, block).await?;
    update_v3_pools_from_logs(client, &mut v3_pools, from_block, current_block, config).await?;

    let new_amms = discover_pools(client, &registry, from_block, current_block, config).await?;
    let new_amms = populate_amms(client, new_amms, config, block).await?;

    let amms = v2_pools
        .into_iter()
        .map(AMM::from)
        .chain(v3_pools.into_values().map(AMM::from))
        .chain(new_amms)
        .collect::<Vec<_>>();

    construct_checkpoint(checkpoint.factories, &amms, current_block, path)?;

    Ok((amms, current_block))
}

pub fn construct_checkpoint(
    factories: Vec<FactoryEntry>,
    amms: &[AMM],
    latest_block: u64,
    checkpoint_path: impl AsRef<Path>,
) -> Result<(), CheckpointError> {
    let checkpoint = Checkpoint::new(
        SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
        latest_block,
        factories,
        amms.to_vec(),
    );

    std::fs::write(checkpoint_path, serde_json::to_string_pretty(&checkpoint)?)?;

    Ok(())
}

pub fn deconstruct_checkpoint(
    checkpoint_path: impl AsRef<Path>,
) -> Result<(Vec<AMM>, u64), CheckpointError> {
    let checkpoint: Checkpoint = serde_json::from_str(read_to_string(checkpoint_path)?.as_str())?;
    Ok((checkpoint.amms, checkpoint.block_number))
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use alloy::primitives::U256;
    use serde_json::json;

    use super::*;
    use crate::{
        amm::{
            consts::Q96,
            uniswap_v2::{FeeFraction, UniswapV2Pool},
            uniswap_v3::TickInfo,
        },
        rpc::mock::MockTransport,
    };

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("amm-replica-{}-{name}.json", std::process::id()))
    }

    fn v3_pool() -> UniswapV3Pool {
        let mut pool = UniswapV3Pool::new(
            Address::repeat_byte(9),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            3000,
            60,
        );
        pool.initialize(Q96, -120);
        pool.mint(-600, 600, 1_000_000, U256::from(10), U256::from(20))
            .unwrap();
        pool
    }

    fn v2_pool() -> UniswapV2Pool {
        UniswapV2Pool::new(
            Address::repeat_byte(8),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            1_000,
            2_000,
            FeeFraction::new(998, 1000),
        )
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let path = temp_path("round-trip");
        let v3 = v3_pool();
        let v2 = v2_pool();

        construct_checkpoint(vec![], &[v2.clone().into(), v3.clone().into()], 17_000_000, &path)
            .unwrap();
        let (amms, block_number) = deconstruct_checkpoint(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(block_number, 17_000_000);
        match (&amms[0], &amms[1]) {
            (AMM::UniswapV2Pool(read_v2), AMM::UniswapV3Pool(read_v3)) => {
                assert_eq!(read_v2, &v2);
                assert_eq!(read_v3, &v3);
                assert_eq!(read_v3.ticks.get(&-600), Some(&TickInfo::new(1_000_000, 1_000_000)));
            }
            other => panic!("unexpected pools {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sync_from_checkpoint_refreshes_reserves() {
        let path = temp_path("sync");
        construct_checkpoint(vec![], &[v2_pool().into()], 100, &path).unwrap();

        let client = RpcClient::new(MockTransport::new(|method, _| match method {
            "eth_blockNumber" => Ok(json!("0x6e")),
            "eth_call" => {
                let returns = (U256::from(5_000), U256::from(6_000), U256::from(1));
                Ok(json!(alloy::primitives::Bytes::from(
                    alloy::sol_types::SolValue::abi_encode_params(&returns)
                )))
            }
            other => panic!("unexpected method {other}"),
        }));

        let (amms, block_number) =
            sync_amms_from_checkpoint(&client, &path, &SyncConfig::default())
                .await
                .unwrap();
        let (_, written_block) = deconstruct_checkpoint(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(block_number, 110);
        assert_eq!(written_block, 110);
        match &amms[0] {
            AMM::UniswapV2Pool(pool) => assert_eq!((pool.reserve_0, pool.reserve_1), (5_000, 6_000)),
            other => panic!("unexpected pool {other:?}"),
        }
    }
}
