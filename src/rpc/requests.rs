use alloy::{
    primitives::{Address, Bytes, B256, U128, U256, U64},
    rpc::types::{BlockNumberOrTag, Filter, Log},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{hex_quantity, RpcError, RpcRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockNumberRequest;

impl RpcRequest for BlockNumberRequest {
    type Response = u64;

    fn method(&self) -> &'static str {
        "eth_blockNumber"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([]))
    }

    fn decode_response(&self, result: Value) -> Result<u64, RpcError> {
        Ok(serde_json::from_value::<U64>(result)?.to::<u64>())
    }
}

/// The subset of a block header the replica cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: U64,
    pub timestamp: U64,
    #[serde(default)]
    pub base_fee_per_gas: Option<U256>,
}

#[derive(Debug, Clone, Copy)]
pub struct GetBlockByHashRequest {
    pub hash: B256,
}

impl RpcRequest for GetBlockByHashRequest {
    type Response = Option<BlockHeader>;

    fn method(&self) -> &'static str {
        "eth_getBlockByHash"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([self.hash, false]))
    }

    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError> {
        Ok(serde_json::from_value(result)?)
    }
}

/// `eth_call` against a contract at a block.
///
/// A `null` or empty result means there is no contract at `to`.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub block: BlockNumberOrTag,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>, block: BlockNumberOrTag) -> Self {
        CallRequest {
            to,
            data: data.into(),
            block,
        }
    }
}

impl RpcRequest for CallRequest {
    type Response = Option<Bytes>;

    fn method(&self) -> &'static str {
        "eth_call"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([{ "to": self.to, "data": self.data }, self.block]))
    }

    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError> {
        let data: Option<Bytes> = serde_json::from_value(result)?;
        Ok(data.filter(|data| !data.is_empty()))
    }
}

#[derive(Debug, Clone)]
pub struct GetLogsRequest {
    pub filter: Filter,
}

impl RpcRequest for GetLogsRequest {
    type Response = Vec<Log>;

    fn method(&self) -> &'static str {
        "eth_getLogs"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([self.filter]))
    }

    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError> {
        Ok(serde_json::from_value(result)?)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetStorageAtRequest {
    pub address: Address,
    pub slot: U256,
    pub block: BlockNumberOrTag,
}

impl RpcRequest for GetStorageAtRequest {
    type Response = B256;

    fn method(&self) -> &'static str {
        "eth_getStorageAt"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([self.address, self.slot, self.block]))
    }

    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError> {
        Ok(serde_json::from_value(result)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GasPriceRequest;

impl RpcRequest for GasPriceRequest {
    type Response = u128;

    fn method(&self) -> &'static str {
        "eth_gasPrice"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([]))
    }

    fn decode_response(&self, result: Value) -> Result<u128, RpcError> {
        Ok(serde_json::from_value::<U128>(result)?.to::<u128>())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHistory {
    pub oldest_block: U64,
    pub base_fee_per_gas: Vec<U128>,
    #[serde(default)]
    pub gas_used_ratio: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct FeeHistoryRequest {
    pub block_count: u64,
    pub newest_block: BlockNumberOrTag,
    pub reward_percentiles: Vec<f64>,
}

impl RpcRequest for FeeHistoryRequest {
    type Response = FeeHistory;

    fn method(&self) -> &'static str {
        "eth_feeHistory"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([
            hex_quantity(self.block_count),
            self.newest_block,
            self.reward_percentiles
        ]))
    }

    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError> {
        Ok(serde_json::from_value(result)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NewBlockFilterRequest;

impl RpcRequest for NewBlockFilterRequest {
    type Response = U256;

    fn method(&self) -> &'static str {
        "eth_newBlockFilter"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([]))
    }

    fn decode_response(&self, result: Value) -> Result<U256, RpcError> {
        Ok(serde_json::from_value(result)?)
    }
}

/// Polls a block filter, returning the hashes of blocks seen since the last poll.
#[derive(Debug, Clone, Copy)]
pub struct GetFilterChangesRequest {
    pub filter_id: U256,
}

impl RpcRequest for GetFilterChangesRequest {
    type Response = Vec<B256>;

    fn method(&self) -> &'static str {
        "eth_getFilterChanges"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([self.filter_id]))
    }

    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError> {
        Ok(serde_json::from_value(result)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    NewHeads,
    NewPendingTransactions,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::NewHeads => "newHeads",
            SubscriptionKind::NewPendingTransactions => "newPendingTransactions",
        }
    }
}

/// `eth_subscribe`, only meaningful on a transport that delivers notifications.
/// Resolves to the subscription id.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeRequest {
    pub kind: SubscriptionKind,
}

impl RpcRequest for SubscribeRequest {
    type Response = String;

    fn method(&self) -> &'static str {
        "eth_subscribe"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(json!([self.kind.as_str()]))
    }

    fn decode_response(&self, result: Value) -> Result<String, RpcError> {
        Ok(serde_json::from_value(result)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: U64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    pub gas_used: U256,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Copy)]
pub enum ReceiptsBlock {
    Number(u64),
    Hash(B256),
}

/// Provider extension returning every receipt of a block in one call.
///
/// Receipts of contract creations are dropped.
#[derive(Debug, Clone, Copy)]
pub struct TransactionReceiptsRequest {
    pub block: ReceiptsBlock,
}

#[derive(Deserialize)]
struct ReceiptsResponse {
    receipts: Vec<TransactionReceipt>,
}

impl RpcRequest for TransactionReceiptsRequest {
    type Response = Vec<TransactionReceipt>;

    fn method(&self) -> &'static str {
        "alchemy_getTransactionReceipts"
    }

    fn params(&self) -> Result<Value, RpcError> {
        Ok(match self.block {
            ReceiptsBlock::Number(number) => json!([{ "blockNumber": hex_quantity(number) }]),
            ReceiptsBlock::Hash(hash) => json!([{ "blockHash": hash }]),
        })
    }

    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError> {
        let response: ReceiptsResponse = serde_json::from_value(result)?;
        Ok(response
            .receipts
            .into_iter()
            .filter(|receipt| receipt.contract_address.is_none())
            .collect())
    }
}
