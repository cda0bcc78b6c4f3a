//! Factory address to pool variant table, used to turn creation logs into pools.

use std::{collections::HashMap, fs, path::Path};

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use serde::{Deserialize, Serialize};

use crate::{
    amm::{
        uniswap_v2::{FeeFraction, UniswapV2Pool},
        uniswap_v3::UniswapV3Pool,
        AMM,
    },
    errors::{AMMError, EventLogError},
};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    contract IUniswapV2Factory {
        event PairCreated(address indexed token0, address indexed token1, address pair, uint256 index);
    }
}

sol! {
    #[derive(Debug, PartialEq, Eq)]
    contract IUniswapV3Factory {
        event PoolCreated(address indexed token0, address indexed token1, uint24 indexed fee, int24 tickSpacing, address pool);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolVariant {
    ConstantProduct { fee: FeeFraction },
    ConcentratedLiquidity,
}

impl PoolVariant {
    /// Event a factory of this variant emits when it deploys a pool.
    pub fn creation_event(&self) -> B256 {
        match self {
            PoolVariant::ConstantProduct { .. } => IUniswapV2Factory::PairCreated::SIGNATURE_HASH,
            PoolVariant::ConcentratedLiquidity => IUniswapV3Factory::PoolCreated::SIGNATURE_HASH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryEntry {
    pub name: String,
    pub address: Address,
    #[serde(default)]
    pub creation_block: u64,
    pub variant: PoolVariant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryRegistry {
    factories: HashMap<Address, FactoryEntry>,
}

impl FactoryRegistry {
    pub fn new(entries: impl IntoIterator<Item = FactoryEntry>) -> Self {
        FactoryRegistry {
            factories: entries
                .into_iter()
                .map(|entry| (entry.address, entry))
                .collect(),
        }
    }

    /// Parses a JSON array of factory entries.
    pub fn from_json(json: &str) -> Result<Self, AMMError> {
        let entries: Vec<FactoryEntry> = serde_json::from_str(json)?;
        Ok(FactoryRegistry::new(entries))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AMMError> {
        FactoryRegistry::from_json(&fs::read_to_string(path)?)
    }

    pub fn get(&self, factory: Address) -> Option<&FactoryEntry> {
        self.factories.get(&factory)
    }

    pub fn variant(&self, factory: Address) -> Result<PoolVariant, AMMError> {
        self.get(factory)
            .map(|entry| entry.variant)
            .ok_or(AMMError::UnknownFactory(factory))
    }

    pub fn entries(&self) -> impl Iterator<Item = &FactoryEntry> {
        self.factories.values()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds a pool with only its identity known from a factory creation log.
    pub fn create_pool(&self, log: &Log) -> Result<AMM, AMMError> {
        let factory = log.address();
        let variant = self.variant(factory)?;

        let topic = log.topics().first().ok_or(EventLogError::MissingTopic)?;
        if *topic != variant.creation_event() {
            return Err(EventLogError::InvalidEventSignature.into());
        }

        match variant {
            PoolVariant::ConstantProduct { fee } => {
                let event = IUniswapV2Factory::PairCreated::decode_log(&log.inner, true)
                    .map_err(EventLogError::from)?;

                Ok(UniswapV2Pool::new_empty(event.pair, event.token0, event.token1, fee).into())
            }
            PoolVariant::ConcentratedLiquidity => {
                let event = IUniswapV3Factory::PoolCreated::decode_log(&log.inner, true)
                    .map_err(EventLogError::from)?;

                Ok(UniswapV3Pool::new(
                    event.pool,
                    event.token0,
                    event.token1,
                    event.fee.to::<u32>(),
                    event.tickSpacing.as_i32(),
                )
                .into())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amm::{uniswap_v3::events::test::pool_log, AutomatedMarketMaker};
    use alloy::primitives::{
        address,
        aliases::{I24, U24},
        U256,
    };

    const UNISWAP_V2_FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
    const UNISWAP_V3_FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");

    fn registry() -> FactoryRegistry {
        FactoryRegistry::from_json(include_str!("../../config/factories.mainnet.json")).unwrap()
    }

    #[test]
    fn test_registry_from_config() {
        let registry = registry();

        assert_eq!(
            registry.variant(UNISWAP_V2_FACTORY).unwrap(),
            PoolVariant::ConstantProduct { fee: FeeFraction::default() }
        );
        assert_eq!(
            registry.variant(UNISWAP_V3_FACTORY).unwrap(),
            PoolVariant::ConcentratedLiquidity
        );
        assert!(matches!(
            registry.variant(Address::ZERO),
            Err(AMMError::UnknownFactory(_))
        ));
    }

    #[test]
    fn test_create_pool_from_pair_created() {
        let pair = Address::repeat_byte(3);
        let log = pool_log(
            UNISWAP_V2_FACTORY,
            &IUniswapV2Factory::PairCreated {
                token0: Address::repeat_byte(1),
                token1: Address::repeat_byte(2),
                pair,
                index: U256::from(1),
            },
            10000835,
            0,
        );

        let amm = registry().create_pool(&log).unwrap();

        match amm {
            AMM::UniswapV2Pool(pool) => {
                assert_eq!(pool.address, pair);
                assert_eq!(pool.fee, FeeFraction::default());
                assert_eq!((pool.reserve_0, pool.reserve_1), (0, 0));
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_create_pool_from_pool_created() {
        let pool_address = Address::repeat_byte(4);
        let log = pool_log(
            UNISWAP_V3_FACTORY,
            &IUniswapV3Factory::PoolCreated {
                token0: Address::repeat_byte(1),
                token1: Address::repeat_byte(2),
                fee: U24::from(500),
                tickSpacing: I24::try_from(10).unwrap(),
                pool: pool_address,
            },
            12369739,
            0,
        );

        let amm = registry().create_pool(&log).unwrap();

        assert_eq!(amm.address(), pool_address);
        match amm {
            AMM::UniswapV3Pool(pool) => {
                assert_eq!(pool.fee, 500);
                assert_eq!(pool.tick_spacing, 10);
                assert!(!pool.is_initialized());
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_create_pool_wrong_event_for_factory() {
        let log = pool_log(
            UNISWAP_V3_FACTORY,
            &IUniswapV2Factory::PairCreated {
                token0: Address::repeat_byte(1),
                token1: Address::repeat_byte(2),
                pair: Address::repeat_byte(3),
                index: U256::from(1),
            },
            1,
            0,
        );

        assert!(matches!(
            registry().create_pool(&log),
            Err(AMMError::EventLogError(EventLogError::InvalidEventSignature))
        ));
    }
}
