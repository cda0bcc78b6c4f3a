use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const REVERT_CODE: i64 = 3;
pub const NODE_ERROR_CODE: i64 = -32000;
pub const RANGE_TOO_LARGE_CODE: i64 = -32005;

lazy_static! {
    // providers suggest a block range that fits their limit, e.g. "... [0x1e8480, 0x1ea0b3]"
    static ref SUGGESTED_RANGE: Regex =
        Regex::new(r"\[\s*(0x[0-9a-fA-F]+)\s*,\s*(0x[0-9a-fA-F]+)\s*\]").expect("valid regex");
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Http transport error")]
    HttpError(#[from] reqwest::Error),
    #[error("Serde json error")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Execution reverted: {message}")]
    Revert { message: String, data: Option<Value> },
    #[error("Node error: {message}")]
    NodeError { message: String },
    #[error("Query exceeds the provider's limit, suggested range [{lower}, {upper}]")]
    RangeTooLarge {
        lower: u64,
        upper: u64,
        message: String,
    },
    #[error("RPC error {code}: {message}")]
    Other {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("Batch response could not be matched to its requests: {0}")]
    BatchCorrelation(String),
    #[error("Response id {received:?} does not match request id {expected}")]
    IdMismatch {
        expected: u64,
        received: Option<u64>,
    },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("Transport closed")]
    TransportClosed,
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<ErrorPayload> for RpcError {
    fn from(payload: ErrorPayload) -> Self {
        match payload.code {
            REVERT_CODE => RpcError::Revert {
                message: payload.message,
                data: payload.data,
            },
            NODE_ERROR_CODE => RpcError::NodeError {
                message: payload.message,
            },
            RANGE_TOO_LARGE_CODE => match parse_suggested_range(&payload.message) {
                Some((lower, upper)) => RpcError::RangeTooLarge {
                    lower,
                    upper,
                    message: payload.message,
                },
                None => RpcError::Other {
                    code: payload.code,
                    message: payload.message,
                    data: payload.data,
                },
            },
            code => RpcError::Other {
                code,
                message: payload.message,
                data: payload.data,
            },
        }
    }
}

/// Extracts the `[lower, upper]` hex block range from a range-too-large message.
pub fn parse_suggested_range(message: &str) -> Option<(u64, u64)> {
    let captures = SUGGESTED_RANGE.captures(message)?;
    let lower = u64::from_str_radix(captures[1].trim_start_matches("0x"), 16).ok()?;
    let upper = u64::from_str_radix(captures[2].trim_start_matches("0x"), 16).ok()?;

    Some((lower, upper))
}

#[cfg(test)]
mod test {
    use super::*;

    fn payload(code: i64, message: &str) -> ErrorPayload {
        ErrorPayload {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn test_classify_revert() {
        let err = RpcError::from(payload(3, "execution reverted: STF"));
        assert!(matches!(err, RpcError::Revert { ref message, .. } if message == "execution reverted: STF"));
    }

    #[test]
    fn test_classify_node_error() {
        let err = RpcError::from(payload(-32000, "header not found"));
        assert!(matches!(err, RpcError::NodeError { .. }));
    }

    #[test]
    fn test_classify_range_too_large() {
        let infura = "query returned more than 10000 results. Try with this block range [0xA7D8C0, 0xA7F06B].";
        let err = RpcError::from(payload(-32005, infura));
        assert!(matches!(
            err,
            RpcError::RangeTooLarge {
                lower: 11000000,
                upper: 11006059,
                ..
            }
        ));

        let alchemy = "Log response size exceeded. this block range should work: [0x1e8480, 0x1ea0b3]";
        assert_eq!(parse_suggested_range(alchemy), Some((2000000, 2007219)));
    }

    #[test]
    fn test_classify_range_too_large_without_range() {
        let err = RpcError::from(payload(-32005, "limit exceeded"));
        assert!(matches!(err, RpcError::Other { code: -32005, .. }));
    }

    #[test]
    fn test_classify_other() {
        let err = RpcError::from(payload(-32601, "the method foo does not exist"));
        assert!(matches!(err, RpcError::Other { code: -32601, .. }));
    }
}
