use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::{BlockNumberOrTag, Filter, Log},
};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::trace;

use super::{
    error::ErrorPayload,
    requests::{
        BlockHeader, BlockNumberRequest, FeeHistory, FeeHistoryRequest, GasPriceRequest,
        GetBlockByHashRequest, GetFilterChangesRequest, GetLogsRequest, GetStorageAtRequest,
        NewBlockFilterRequest, ReceiptsBlock, TransactionReceipt, TransactionReceiptsRequest,
    },
    RpcError, RpcRequest,
};
use crate::config::{RpcConfig, DEFAULT_MAX_BATCH_SIZE, DEFAULT_REQUEST_ID_CEILING};

/// Moves one serialized JSON-RPC payload (a request object or a batch array) and returns the
/// raw response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: Value) -> Result<Value, RpcError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Ok(HttpTransport {
            client: reqwest::Client::new(),
            url: parse_url(url)?,
        })
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self, RpcError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        Ok(HttpTransport {
            client: builder.build()?,
            url: parse_url(&config.url)?,
        })
    }
}

fn parse_url(url: &str) -> Result<reqwest::Url, RpcError> {
    reqwest::Url::parse(url).map_err(|e| RpcError::InvalidUrl(e.to_string()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: Value) -> Result<Value, RpcError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

impl ResponsePayload {
    fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC client over a [`Transport`].
///
/// Ids are drawn from a shared counter that wraps to zero at the configured ceiling. A batch
/// always receives a contiguous block of ids so its responses can be matched back by id.
#[derive(Debug)]
pub struct RpcClient<T> {
    transport: T,
    next_id: AtomicU64,
    id_ceiling: u64,
    max_batch_size: usize,
    permits: Option<Semaphore>,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        RpcClient {
            transport,
            next_id: AtomicU64::new(0),
            id_ceiling: DEFAULT_REQUEST_ID_CEILING,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            permits: None,
        }
    }

    pub fn with_config(transport: T, config: &RpcConfig) -> Self {
        let id_ceiling = config.request_id_ceiling.max(1);
        // a batch's contiguous ids must stay below the ceiling
        let max_batch_size = config
            .max_batch_size
            .clamp(1, usize::try_from(id_ceiling).unwrap_or(usize::MAX));

        RpcClient {
            transport,
            next_id: AtomicU64::new(0),
            id_ceiling,
            max_batch_size,
            permits: config.max_concurrent_requests.map(Semaphore::new),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reserves `count` consecutive ids and returns the first one.
    fn allocate_ids(&self, count: u64) -> u64 {
        let start = |id: u64| {
            if id.saturating_add(count) > self.id_ceiling {
                0
            } else {
                id
            }
        };

        let previous = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                Some(start(id) + count)
            })
            .unwrap_or_else(|id| id);

        start(previous)
    }

    async fn acquire(&self) -> Result<Option<SemaphorePermit<'_>>, RpcError> {
        match &self.permits {
            Some(semaphore) => semaphore
                .acquire()
                .await
                .map(Some)
                .map_err(|_| RpcError::TransportClosed),
            None => Ok(None),
        }
    }

    pub async fn send<R: RpcRequest>(&self, request: &R) -> Result<R::Response, RpcError> {
        let id = self.allocate_ids(1);
        let payload = request_payload(request, id)?;
        trace!(id, method = request.method(), "sending request");

        let response = {
            let _permit = self.acquire().await?;
            self.transport.send(payload).await?
        };

        let response: ResponsePayload = serde_json::from_value(response)?;
        if let Some(received) = response.id {
            if received != id {
                return Err(RpcError::IdMismatch {
                    expected: id,
                    received: Some(received),
                });
            }
        }

        request.decode_response(response.into_result()?)
    }

    /// Sends `requests` as JSON-RPC batches and returns one result per request, in request order.
    ///
    /// Per-request errors are returned in place. A response set that cannot be matched to the
    /// requests one-to-one by id fails the whole call.
    pub async fn send_batch<R: RpcRequest>(
        &self,
        requests: &[R],
    ) -> Result<Vec<Result<R::Response, RpcError>>, RpcError> {
        let chunks = try_join_all(
            requests
                .chunks(self.max_batch_size)
                .map(|chunk| self.send_chunk(chunk)),
        )
        .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    async fn send_chunk<R: RpcRequest>(
        &self,
        requests: &[R],
    ) -> Result<Vec<Result<R::Response, RpcError>>, RpcError> {
        if requests.is_empty() {
            return Ok(vec![]);
        }

        let first_id = self.allocate_ids(requests.len() as u64);
        let payload = requests
            .iter()
            .enumerate()
            .map(|(i, request)| request_payload(request, first_id + i as u64))
            .collect::<Result<Vec<_>, _>>()?;
        trace!(first_id, len = requests.len(), "sending batch");

        let response = {
            let _permit = self.acquire().await?;
            self.transport.send(Value::Array(payload)).await?
        };

        // A provider rejecting the batch as a whole answers with a single error object
        let responses = match response {
            Value::Array(responses) => responses,
            other => {
                let payload: ResponsePayload = serde_json::from_value(other)?;
                return match payload.error {
                    Some(error) => Err(error.into()),
                    None => Err(RpcError::MalformedResponse(
                        "expected an array in response to a batch".to_string(),
                    )),
                };
            }
        };

        if responses.len() != requests.len() {
            return Err(RpcError::BatchCorrelation(format!(
                "sent {} requests, received {} responses",
                requests.len(),
                responses.len()
            )));
        }

        let mut by_id = HashMap::with_capacity(responses.len());
        for response in responses {
            let response: ResponsePayload = serde_json::from_value(response)?;
            let id = response.id.ok_or_else(|| {
                RpcError::BatchCorrelation("response without an id".to_string())
            })?;

            if by_id.insert(id, response).is_some() {
                return Err(RpcError::BatchCorrelation(format!("duplicate response id {id}")));
            }
        }

        requests
            .iter()
            .enumerate()
            .map(|(i, request)| {
                let id = first_id + i as u64;
                let response = by_id.remove(&id).ok_or_else(|| {
                    RpcError::BatchCorrelation(format!("no response for request id {id}"))
                })?;

                Ok(response
                    .into_result()
                    .and_then(|result| request.decode_response(result)))
            })
            .collect()
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        self.send(&BlockNumberRequest).await
    }

    pub async fn get_block_by_hash(&self, hash: B256) -> Result<Option<BlockHeader>, RpcError> {
        self.send(&GetBlockByHashRequest { hash }).await
    }

    pub async fn get_logs(&self, filter: Filter) -> Result<Vec<Log>, RpcError> {
        self.send(&GetLogsRequest { filter }).await
    }

    pub async fn get_storage_at(
        &self,
        address: Address,
        slot: U256,
        block: BlockNumberOrTag,
    ) -> Result<B256, RpcError> {
        self.send(&GetStorageAtRequest {
            address,
            slot,
            block,
        })
        .await
    }

    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        self.send(&GasPriceRequest).await
    }

    pub async fn fee_history(
        &self,
        block_count: u64,
        newest_block: BlockNumberOrTag,
    ) -> Result<FeeHistory, RpcError> {
        self.send(&FeeHistoryRequest {
            block_count,
            newest_block,
            reward_percentiles: vec![],
        })
        .await
    }

    pub async fn new_block_filter(&self) -> Result<U256, RpcError> {
        self.send(&NewBlockFilterRequest).await
    }

    pub async fn get_filter_changes(&self, filter_id: U256) -> Result<Vec<B256>, RpcError> {
        self.send(&GetFilterChangesRequest { filter_id }).await
    }

    pub async fn get_transaction_receipts(
        &self,
        block: ReceiptsBlock,
    ) -> Result<Vec<TransactionReceipt>, RpcError> {
        self.send(&TransactionReceiptsRequest { block }).await
    }
}

fn request_payload<R: RpcRequest>(request: &R, id: u64) -> Result<Value, RpcError> {
    Ok(json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": request.method(),
        "params": request.params()?,
    }))
}
