use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{error::ErrorPayload, RpcError, Transport};

type Handler = Box<dyn Fn(&Value) -> Value + Send + Sync>;

/// In-memory transport answering requests from a closure, recording every payload it receives.
pub(crate) struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<Value>>,
}

impl MockTransport {
    /// Answers each request object by method and params, wrapping the result in a response
    /// envelope that echoes the request id. Batches are answered element by element.
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Value, ErrorPayload> + Send + Sync + 'static,
    {
        let respond = move |request: &Value| {
            let method = request["method"].as_str().unwrap_or_default();
            match handler(method, &request["params"]) {
                Ok(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
                Err(error) => json!({ "jsonrpc": "2.0", "id": request["id"], "error": error }),
            }
        };

        Self::raw(move |payload| match payload {
            Value::Array(requests) => Value::Array(requests.iter().map(&respond).collect()),
            request => respond(request),
        })
    }

    /// Answers each payload verbatim with the closure's output.
    pub(crate) fn raw<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        MockTransport {
            handler: Box::new(handler),
            requests: Mutex::new(vec![]),
        }
    }

    pub(crate) fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, payload: Value) -> Result<Value, RpcError> {
        self.requests.lock().unwrap().push(payload.clone());
        Ok((self.handler)(&payload))
    }
}
