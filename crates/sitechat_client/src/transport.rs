use std::future::Future;
use std::time::Duration;

use client_logging::{client_debug, client_warn};
use futures_util::StreamExt;
use rand::Rng;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::map_reqwest_error;
use crate::sse::{scrape_events, ScrapeEventStream};
use crate::{ClientError, ClientSettings, RetryPolicy};

/// Runs `attempt` until it succeeds, fails permanently, or attempts run out.
///
/// Each attempt gets `policy.timeout`; an elapsed deadline fails with
/// [`ClientError::Timeout`] immediately. Only [`ClientError::Network`] is
/// retried, after `base_delay * 2^attempt` plus random jitter.
pub async fn request_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut index = 0;
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            outcome = tokio::time::timeout(policy.timeout, attempt(index)) => outcome,
        };

        match outcome {
            Err(_elapsed) => {
                client_warn!("Attempt {} timed out after {:?}", index + 1, policy.timeout);
                return Err(ClientError::Timeout);
            }
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if err.is_retryable() && index + 1 < max_attempts => {
                let delay = policy.backoff(index) + jitter(policy.max_jitter);
                client_debug!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    index + 1,
                    max_attempts,
                    err,
                    delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                index += 1;
            }
            Ok(Err(err)) => return Err(err),
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Turns a non-2xx response into [`ClientError::Api`], keeping the `detail` text.
pub(crate) async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
        .and_then(|body| body.detail);
    Err(ClientError::Api {
        status: status.as_u16(),
        detail,
    })
}

/// JSON-over-HTTP plumbing shared by every backend call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    settings: ClientSettings,
    cancel: CancellationToken,
}

impl HttpTransport {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        Url::parse(&settings.base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {err}", settings.base_url)))?;
        // No client-wide timeout: it would also cut long crawl streams.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ClientError::Network(err.to_string()))?;
        Ok(Self {
            client,
            settings,
            cancel: CancellationToken::new(),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Cancels every in-flight and future request made through this transport.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.settings.base_url)
            .map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.settings.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get_json<T>(&self, segments: &[&str]) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        self.execute(|| self.client.get(url.clone())).await
    }

    pub async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        self.execute(|| self.client.post(url.clone()).json(body)).await
    }

    /// POST without a body whose response content is ignored.
    pub async fn post_ack(&self, segments: &[&str]) -> Result<(), ClientError> {
        let url = self.endpoint(segments)?;
        self.execute_discarding(|| self.client.post(url.clone())).await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<(), ClientError> {
        let url = self.endpoint(segments)?;
        self.execute_discarding(|| self.client.delete(url.clone())).await
    }

    /// Opens a line-delimited `data:` stream. Only opening is retried or bounded.
    pub async fn open_stream<B>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<ScrapeEventStream, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let policy = RetryPolicy {
            timeout: self.settings.stream_open_timeout,
            ..self.settings.retry.clone()
        };
        let response = request_with_retry(&policy, &self.cancel, |_| {
            let request = self
                .client
                .post(url.clone())
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(body);
            async move {
                let response = request.send().await.map_err(map_reqwest_error)?;
                check_status(response).await
            }
        })
        .await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error));
        Ok(scrape_events(body))
    }

    async fn execute<T, F>(&self, build: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        request_with_retry(&self.settings.retry, &self.cancel, |_| {
            let request = build();
            async move {
                let response = request.send().await.map_err(map_reqwest_error)?;
                let response = check_status(response).await?;
                let bytes = response.bytes().await.map_err(map_reqwest_error)?;
                serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
            }
        })
        .await
    }

    async fn execute_discarding<F>(&self, build: F) -> Result<(), ClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        request_with_retry(&self.settings.retry, &self.cancel, |_| {
            let request = build();
            async move {
                let response = request.send().await.map_err(map_reqwest_error)?;
                check_status(response).await?;
                Ok(())
            }
        })
        .await
    }
}
