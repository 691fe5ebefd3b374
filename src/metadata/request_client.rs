use std::{sync::Arc, time::Duration};

use anyhow::Context;
use reqwest::{Client, Request, Response};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, Semaphore};

/// Rate limited HTTP request client.
///
/// Note that cloned instances of this struct will "share" rate limit
#[derive(Debug, Clone)]
pub struct LimitedRequestClient {
    request_tx: mpsc::Sender<(Request, oneshot::Sender<reqwest::Result<Response>>)>,
}

impl LimitedRequestClient {
    /// Create new limited client.
    ///
    /// Number argument is the allowed "concurrency", [Duration] argument is rate.
    ///
    /// For example arguments (10, 1 second) mean that rate limit is 10 requests per second
    pub fn new(client: Client, limit_number: usize, limit_duration: Duration) -> Self {
        let (tx, mut rx) =
            mpsc::channel::<(Request, oneshot::Sender<reqwest::Result<Response>>)>(100);
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(limit_number));
            while let Some((req, resp_tx)) = rx.recv().await {
                let semaphore = semaphore.clone();
                let client = client.clone();
                tokio::spawn(async move {
                    let Ok(permit) = semaphore.acquire().await else {
                        return;
                    };
                    let response = client.execute(req).await;
                    if resp_tx.send(response).is_err() {
                        tracing::error!("Failed to send response: channel closed");
                    }
                    tokio::time::sleep(limit_duration).await;
                    drop(permit);
                });
            }
        });
        Self { request_tx: tx }
    }

    /// Performs the request and returns the response without looking at its
    /// status, so callers can react to 401s themselves.
    pub async fn request_raw(&self, req: Request) -> anyhow::Result<Response> {
        let (tx, rx) = oneshot::channel();
        let url = req.url().to_string();
        self.request_tx
            .send((req, tx))
            .await
            .context("Failed to queue request")?;
        let response = rx
            .await
            .map_err(|_| anyhow::anyhow!("failed to receive response: channel closed"))?
            .map_err(|e| {
                tracing::error!("Request to {} failed: {}", url, e);
                anyhow::anyhow!("Request failed: {}", e)
            })?;
        tracing::trace!(status = response.status().as_u16(), url, "Got response");
        Ok(response)
    }

    pub async fn request<T>(&self, req: Request) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
    {
        let url = req.url().to_string();
        let response = self.request_raw(req).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to deserialize response body from {url}"))
    }
}
