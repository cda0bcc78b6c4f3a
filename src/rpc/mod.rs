//! JSON-RPC plumbing: request types, transports, id correlation, and log range splitting.

pub mod error;
pub mod logs;
#[cfg(test)]
pub(crate) mod mock;
pub mod requests;
pub mod transport;

use serde_json::Value;

pub use error::RpcError;
pub use transport::{HttpTransport, RpcClient, Transport};

/// A JSON-RPC method together with its parameters and the decoding of its result.
pub trait RpcRequest: Send + Sync {
    type Response: Send;

    fn method(&self) -> &'static str;

    fn params(&self) -> Result<Value, RpcError>;

    /// Decodes the `result` member of a successful response.
    fn decode_response(&self, result: Value) -> Result<Self::Response, RpcError>;
}

/// Formats an integer as a JSON-RPC hex quantity.
pub fn hex_quantity(value: u64) -> String {
    format!("{value:#x}")
}
