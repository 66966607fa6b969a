//! In-memory REST collaborator for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatsync_shared::ApiError;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;

use crate::api_client::RequestHandler;

/// Answers requests from a path → body table and records every call.
/// Unknown paths answer 404.
#[derive(Default)]
pub(crate) struct MockApi {
    responses: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<(Method, String, Option<Value>)>>,
}

impl MockApi {
    pub(crate) fn with(path: &str, body: Value) -> Arc<Self> {
        let api = Self::default();
        api.respond(path, body);
        Arc::new(api)
    }

    pub(crate) fn respond(&self, path: &str, body: Value) {
        self.responses.lock().insert(path.to_string(), body);
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn requests(&self) -> Vec<(Method, String, Option<Value>)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RequestHandler for MockApi {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        self.requests.lock().push((method, path.to_string(), body));
        tokio::task::yield_now().await;
        self.responses
            .lock()
            .get(path)
            .cloned()
            .ok_or(ApiError::Http {
                status: 404,
                body: "NotFound".into(),
            })
    }
}
