use alloy::rpc::types::{Filter, Log};
use futures::{
    future::{try_join_all, BoxFuture},
    FutureExt,
};
use tracing::{debug, warn};

use super::{RpcClient, RpcError, Transport};

/// Fetches the logs matching `filter` over `[from_block, to_block]`, splitting the range and
/// retrying the parts concurrently whenever the provider rejects it as too large.
///
/// Logs from different parts are concatenated without reordering.
pub fn get_logs_bisecting<'a, T: Transport>(
    client: &'a RpcClient<T>,
    filter: &'a Filter,
    from_block: u64,
    to_block: u64,
) -> BoxFuture<'a, Result<Vec<Log>, RpcError>> {
    async move {
        let ranged = filter.clone().from_block(from_block).to_block(to_block);

        match client.get_logs(ranged).await {
            Ok(logs) => {
                debug!(from_block, to_block, logs = logs.len(), "fetched logs");
                Ok(logs)
            }
            Err(RpcError::RangeTooLarge { lower, upper, .. }) if to_block > from_block => {
                let ranges = split_range(from_block, to_block, upper.saturating_sub(lower));
                warn!(
                    from_block,
                    to_block,
                    parts = ranges.len(),
                    "log range too large, splitting"
                );

                let parts = try_join_all(
                    ranges
                        .into_iter()
                        .map(|(from, to)| get_logs_bisecting(client, filter, from, to)),
                )
                .await?;

                Ok(parts.into_iter().flatten().collect())
            }
            Err(err) => Err(err),
        }
    }
    .boxed()
}

/// Splits the inclusive range `[from_block, to_block]` into contiguous inclusive parts of at
/// most half the provider's accepted spread.
///
/// Every part is strictly shorter than the input when the input spans more than one block.
pub fn split_range(from_block: u64, to_block: u64, spread: u64) -> Vec<(u64, u64)> {
    let len = to_block - from_block + 1;
    let chunk = (spread / 2).max(1).min(len.div_ceil(2));

    let mut ranges = vec![];
    let mut start = from_block;
    loop {
        let end = start.saturating_add(chunk - 1).min(to_block);
        ranges.push((start, end));
        if end == to_block {
            break;
        }
        start = end + 1;
    }

    ranges
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use super::*;
    use crate::rpc::{error::ErrorPayload, mock::MockTransport};

    fn block_param(params: &Value, key: &str) -> u64 {
        let hex = params[0][key].as_str().unwrap().trim_start_matches("0x");
        u64::from_str_radix(hex, 16).unwrap()
    }

    #[test]
    fn test_split_range() {
        assert_eq!(
            split_range(0, 99, 40),
            vec![(0, 19), (20, 39), (40, 59), (60, 79), (80, 99)]
        );
        // spread wider than the range still halves it
        assert_eq!(split_range(10, 14, 1_000), vec![(10, 12), (13, 14)]);
        assert_eq!(split_range(5, 6, 0), vec![(5, 5), (6, 6)]);
    }

    #[tokio::test]
    async fn test_bisection_covers_range_exactly() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let served = Arc::new(Mutex::new(vec![]));
        let recorder = served.clone();

        let client = RpcClient::new(MockTransport::new(move |method, params| {
            assert_eq!(method, "eth_getLogs");
            let from = block_param(params, "fromBlock");
            let to = block_param(params, "toBlock");

            if to - from + 1 > 100_000 {
                let message = format!(
                    "query returned more than 10000 results. Try with this block range [{:#x}, {:#x}].",
                    from,
                    from + 1_000_000
                );
                return Err(ErrorPayload {
                    code: -32005,
                    message,
                    data: None,
                });
            }

            recorder.lock().unwrap().push((from, to));
            let log: Log = Log {
                block_number: Some(from),
                ..Default::default()
            };
            Ok(json!([log]))
        }));

        let filter = Filter::new();
        let logs = get_logs_bisecting(&client, &filter, 11_000_000, 15_000_000)
            .await
            .unwrap();

        let mut ranges = served.lock().unwrap().clone();
        ranges.sort_unstable();

        assert_eq!(ranges.first().map(|r| r.0), Some(11_000_000));
        assert_eq!(ranges.last().map(|r| r.1), Some(15_000_000));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
        assert_eq!(logs.len(), ranges.len());
    }

    #[tokio::test]
    async fn test_single_block_range_error_propagates() {
        let client = RpcClient::new(MockTransport::new(|_, _| {
            Err(ErrorPayload {
                code: -32005,
                message: "query returned more than 10000 results. Try with this block range [0x1, 0x1].".to_string(),
                data: None,
            })
        }));

        let filter = Filter::new();
        let err = get_logs_bisecting(&client, &filter, 7, 7).await.unwrap_err();

        assert!(matches!(err, RpcError::RangeTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let client = RpcClient::new(MockTransport::new(|_, _| {
            Err(ErrorPayload {
                code: -32000,
                message: "header not found".to_string(),
                data: None,
            })
        }));

        let filter = Filter::new();
        let err = get_logs_bisecting(&client, &filter, 1, 1_000)
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::NodeError { .. }));
        assert_eq!(client.transport().requests().len(), 1);
    }
}
