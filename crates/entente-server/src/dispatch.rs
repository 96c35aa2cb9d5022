//! The task-dispatcher seam.
//!
//! Outbound notification calls are scheduled through an external queue
//! service that guarantees eventual delivery; its retry semantics are out
//! of scope here.  [`HttpTaskDispatcher`] is the synchronous development
//! implementation: it POSTs the payload straight at the worker endpoint
//! and reports the result.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Schedule `payload` for delivery to the worker at `relative_uri`.
    /// `queue` names the logical queue, for dispatchers that shard by it.
    async fn queue_task(
        &self,
        payload: Value,
        queue: &str,
        relative_uri: &str,
    ) -> anyhow::Result<()>;
}

pub struct HttpTaskDispatcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskDispatcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TaskDispatcher for HttpTaskDispatcher {
    async fn queue_task(
        &self,
        payload: Value,
        queue: &str,
        relative_uri: &str,
    ) -> anyhow::Result<()> {
        debug!(queue, uri = relative_uri, "dispatching task");
        let url = format!("{}{}", self.base_url, relative_uri);
        let response = self.client.post(url).json(&payload).send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "worker {} returned {}",
                relative_uri,
                response.status().as_u16()
            );
        }
        Ok(())
    }
}
