use serde::{Deserialize, Serialize};

pub const DEFAULT_REQUEST_ID_CEILING: u64 = 10_000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_NUMBER_OF_TICKS: usize = 20;
pub const DEFAULT_SMART_LOG_THRESHOLD: u64 = 100;
pub const DEFAULT_FACTORY_LOG_THRESHOLD: u64 = 2_000;

/// Connection settings for a JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    /// Request ids wrap to zero once they would reach this value.
    #[serde(default = "default_request_id_ceiling")]
    pub request_id_ceiling: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Caps the number of requests in flight at once. `None` leaves it unbounded.
    #[serde(default)]
    pub max_concurrent_requests: Option<usize>,
    /// Batches larger than this are split into several HTTP round trips.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        RpcConfig {
            url: url.into(),
            request_id_ceiling: DEFAULT_REQUEST_ID_CEILING,
            timeout_ms: None,
            max_concurrent_requests: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Tuning knobs for pool loading and log synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How many initialized ticks to load around the current tick of a V3 pool.
    #[serde(default = "default_number_of_ticks")]
    pub number_of_ticks: usize,
    /// Block spans above this use the range-splitting log fetcher.
    #[serde(default = "default_smart_log_threshold")]
    pub smart_log_threshold: u64,
    /// Block span of each factory log query during pool discovery.
    #[serde(default = "default_factory_log_threshold")]
    pub factory_log_threshold: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            number_of_ticks: DEFAULT_NUMBER_OF_TICKS,
            smart_log_threshold: DEFAULT_SMART_LOG_THRESHOLD,
            factory_log_threshold: DEFAULT_FACTORY_LOG_THRESHOLD,
        }
    }
}

fn default_request_id_ceiling() -> u64 {
    DEFAULT_REQUEST_ID_CEILING
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_number_of_ticks() -> usize {
    DEFAULT_NUMBER_OF_TICKS
}

fn default_smart_log_threshold() -> u64 {
    DEFAULT_SMART_LOG_THRESHOLD
}

fn default_factory_log_threshold() -> u64 {
    DEFAULT_FACTORY_LOG_THRESHOLD
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rpc_config_defaults() {
        let config: RpcConfig =
            serde_json::from_str(r#"{ "url": "http://localhost:8545" }"#).unwrap();

        assert_eq!(config, RpcConfig::new("http://localhost:8545"));
    }

    #[test]
    fn test_sync_config_partial() {
        let config: SyncConfig = serde_json::from_str(r#"{ "number_of_ticks": 50 }"#).unwrap();

        assert_eq!(config.number_of_ticks, 50);
        assert_eq!(config.smart_log_threshold, DEFAULT_SMART_LOG_THRESHOLD);
        assert_eq!(config.factory_log_threshold, DEFAULT_FACTORY_LOG_THRESHOLD);
    }
}
