pub mod consts;
pub mod factory;
pub mod math;
pub mod uniswap_v2;
pub mod uniswap_v3;

use std::hash::{Hash, Hasher};

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
    sol,
};
use serde::{Deserialize, Serialize};

use crate::errors::AMMError;

use self::{uniswap_v2::UniswapV2Pool, uniswap_v3::UniswapV3Pool};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    contract IErc20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

pub trait AutomatedMarketMaker {
    /// Returns the address of the AMM.
    fn address(&self) -> Address;

    /// Event signatures that change the AMM's state.
    fn sync_events(&self) -> Vec<B256>;

    /// Applies a single log emitted by the AMM.
    fn sync(&mut self, log: &Log) -> Result<(), AMMError>;

    /// Returns a vector of tokens in the AMM.
    fn tokens(&self) -> Vec<Address>;

    /// Calculates a f64 representation of base token price in the AMM.
    fn calculate_price(&self, base_token: Address) -> Result<f64, AMMError>;

    /// Locally simulates a swap in the AMM.
    /// Returns the amount received for `amount_in` of `token_in`.
    fn simulate_swap(&self, token_in: Address, amount_in: U256) -> Result<U256, AMMError>;

    /// Locally simulates a swap in the AMM.
    /// Mutates the AMM state to the state of the AMM after swapping.
    /// Returns the amount received for `amount_in` of `token_in`.
    fn simulate_swap_mut(&mut self, token_in: Address, amount_in: U256) -> Result<U256, AMMError>;
}

macro_rules! amm {
    ($($pool_type:ident),+ $(,)?) => {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub enum AMM {
            $($pool_type($pool_type),)+
        }

        impl AutomatedMarketMaker for AMM {
            fn address(&self) -> Address {
                match self {
                    $(AMM::$pool_type(pool) => pool.address(),)+
                }
            }

            fn sync_events(&self) -> Vec<B256> {
                match self {
                    $(AMM::$pool_type(pool) => pool.sync_events(),)+
                }
            }

            fn sync(&mut self, log: &Log) -> Result<(), AMMError> {
                match self {
                    $(AMM::$pool_type(pool) => pool.sync(log),)+
                }
            }

            fn tokens(&self) -> Vec<Address> {
                match self {
                    $(AMM::$pool_type(pool) => pool.tokens(),)+
                }
            }

            fn calculate_price(&self, base_token: Address) -> Result<f64, AMMError> {
                match self {
                    $(AMM::$pool_type(pool) => pool.calculate_price(base_token),)+
                }
            }

            fn simulate_swap(&self, token_in: Address, amount_in: U256) -> Result<U256, AMMError> {
                match self {
                    $(AMM::$pool_type(pool) => pool.simulate_swap(token_in, amount_in),)+
                }
            }

            fn simulate_swap_mut(&mut self, token_in: Address, amount_in: U256) -> Result<U256, AMMError> {
                match self {
                    $(AMM::$pool_type(pool) => pool.simulate_swap_mut(token_in, amount_in),)+
                }
            }
        }

        impl Hash for AMM {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.address().hash(state);
            }
        }

        impl PartialEq for AMM {
            fn eq(&self, other: &Self) -> bool {
                self.address() == other.address()
            }
        }

        impl Eq for AMM {}

        $(
            impl From<$pool_type> for AMM {
                fn from(pool: $pool_type) -> Self {
                    AMM::$pool_type(pool)
                }
            }
        )+
    };
}

amm!(UniswapV2Pool, UniswapV3Pool);

#[cfg(test)]
mod test {
    use super::*;
    use crate::amm::uniswap_v2::FeeFraction;
    use alloy::primitives::address;

    #[test]
    fn test_amm_serde_names_variant() {
        let amm = AMM::from(UniswapV2Pool::new(
            address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc"),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            10,
            20,
            FeeFraction::default(),
        ));

        let json = serde_json::to_value(&amm).unwrap();
        assert!(json.get("UniswapV2Pool").is_some());

        let decoded: AMM = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, amm);
        assert_eq!(decoded.tokens(), amm.tokens());
    }

    #[test]
    fn test_amm_equality_by_address() {
        let address = Address::repeat_byte(7);
        let v2 = AMM::from(UniswapV2Pool::new_empty(
            address,
            Address::ZERO,
            Address::ZERO,
            FeeFraction::default(),
        ));
        let v3 = AMM::from(UniswapV3Pool::new(address, Address::ZERO, Address::ZERO, 500, 10));

        assert_eq!(v2, v3);
    }
}
