//! Canned Graph responses for checker and engine tests

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::client::GraphApi;
use crate::GraphError;

/// In-memory [`GraphApi`] serving canned responses by path prefix.
///
/// Routes are matched in registration order; the first prefix that matches
/// the requested path wins. Unmatched paths return a 404-shaped error.
#[derive(Default)]
pub struct MockGraph {
    routes: RwLock<Vec<(String, Result<Value, GraphError>)>>,
    calls: Mutex<Vec<String>>,
}

impl MockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` for paths starting with `prefix`.
    pub fn with(self, prefix: &str, value: Value) -> Self {
        self.routes.write().push((prefix.to_string(), Ok(value)));
        self
    }

    /// Fail paths starting with `prefix` with `error`.
    pub fn failing(self, prefix: &str, error: GraphError) -> Self {
        self.routes.write().push((prefix.to_string(), Err(error)));
        self
    }

    /// Paths requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn get(&self, path: &str) -> Result<Value, GraphError> {
        self.calls.lock().push(path.to_string());
        let routes = self.routes.read();
        for (prefix, result) in routes.iter() {
            if path.starts_with(prefix.as_str()) {
                return result.clone();
            }
        }
        Err(GraphError::Status { status: 404, body: format!("no mock route for {path}") })
    }
}
