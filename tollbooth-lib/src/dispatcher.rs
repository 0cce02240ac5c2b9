//! Entry point for sending requests under rate limits.
//!
//! The [`Dispatcher`] resolves every request to its [`Bucket`], sends it
//! once the bucket and the global limiter allow it, retries transient
//! failures and classifies the final response.

use dashmap::DashMap;
use http::StatusCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time;

use crate::events::Event;
use crate::ratelimit::{Bucket, GlobalLimiter, HandlerConfig, HashTable, Shared};
use crate::retry::RetryExt;
use crate::types::{ApiError, ApiErrorPayload, HttpError, Result};
use crate::{ErrorKind, Request, ResponseBody, Route};

/// Buckets by `hash:major_parameter`
type BucketMap = DashMap<String, Arc<Bucket>>;

/// Sends requests through their rate limit buckets.
///
/// Cloning is cheap; clones share buckets, hashes and the global limiter.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    buckets: Arc<BucketMap>,
}

impl Dispatcher {
    /// Create a dispatcher that sends requests with `client`
    #[must_use]
    pub fn new(client: reqwest::Client, config: HandlerConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(client, config)),
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Timing and retry settings
    #[must_use]
    pub fn config(&self) -> &HandlerConfig {
        &self.shared.config
    }

    /// The limiter shared by all buckets
    #[must_use]
    pub fn global(&self) -> &GlobalLimiter {
        &self.shared.global
    }

    /// Bucket hashes learned from the server so far
    #[must_use]
    pub fn hashes(&self) -> &HashTable {
        &self.shared.hashes
    }

    /// Number of buckets created so far
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Look up a bucket by its id (`hash:major_parameter`)
    #[must_use]
    pub fn bucket(&self, id: &str) -> Option<Arc<Bucket>> {
        self.buckets.get(id).map(|bucket| Arc::clone(bucket.value()))
    }

    /// Receive the events of this dispatcher from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    /// Send `request`, waiting for rate limits and retrying transient
    /// failures.
    ///
    /// Returns the body of a successful (2xx or 3xx) response, or `None`
    /// for any status outside the handled ranges.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Http`] if server errors or timeouts persist after
    ///   all retries, or a client error response cannot be parsed
    /// - [`ErrorKind::Api`] for client errors (4xx other than 429)
    /// - [`ErrorKind::NetworkRequest`] for transport failures
    /// - [`ErrorKind::DecodeResponseBody`] if a JSON response is invalid
    pub async fn queue_request(&self, request: Request) -> Result<Option<ResponseBody>> {
        let route = Route::extract(&request.endpoint, request.method);
        let hash = self.shared.hashes.get_or_default(&route);
        let bucket = self.get_or_create_bucket(&hash, &route.major_parameter);

        self.make_request(&route, &bucket, &request).await
    }

    fn get_or_create_bucket(&self, hash: &str, major_parameter: &str) -> Arc<Bucket> {
        let id = format!("{hash}:{major_parameter}");
        let bucket = self
            .buckets
            .entry(id)
            .or_insert_with(|| Arc::new(Bucket::new(hash, major_parameter, self.shared.clone())));
        Arc::clone(bucket.value())
    }

    async fn make_request(
        &self,
        route: &Route,
        bucket: &Bucket,
        request: &Request,
    ) -> Result<Option<ResponseBody>> {
        let mut retries = self.shared.config.retries;

        loop {
            let consumed = match bucket.consume(request).await {
                Ok(consumed) => consumed,
                Err(e) if e.should_retry() && retries > 0 => {
                    retries -= 1;
                    self.shared.events.debug(format!(
                        "({}) {e}, {retries} retries left",
                        bucket.id
                    ));
                    continue;
                }
                Err(ErrorKind::Timeout(after)) => {
                    return Err(HttpError::timeout(after, request.method, &request.endpoint).into());
                }
                Err(e) => return Err(e),
            };

            let status = consumed.status();
            if bucket.handle(route, consumed.headers(), status) {
                drop(consumed);
                self.shared
                    .events
                    .debug(format!("({}) Rate limited, replaying request", bucket.id));
                continue;
            }
            let deadline = consumed.deadline();
            let response = consumed.into_response();

            if status.is_success() || status.is_redirection() {
                match time::timeout_at(deadline, ResponseBody::from_response(response)).await {
                    Ok(body) => return body.map(Some),
                    Err(_) => {
                        self.spend_on_timeout(&mut retries, bucket, request)?;
                        continue;
                    }
                }
            }

            if status.should_retry() {
                if retries > 0 {
                    retries -= 1;
                    self.shared.events.debug(format!(
                        "({}) Server responded with {status}, {retries} retries left",
                        bucket.id
                    ));
                    continue;
                }
                return Err(
                    HttpError::from_status(status, request.method, &request.endpoint).into(),
                );
            }

            if status.is_client_error() {
                match time::timeout_at(deadline, client_error(status, request, response)).await {
                    Ok(e) => return Err(e),
                    Err(_) => {
                        self.spend_on_timeout(&mut retries, bucket, request)?;
                        continue;
                    }
                }
            }

            return Ok(None);
        }
    }

    /// Take one retry for a body that did not arrive in time, or give up
    fn spend_on_timeout(
        &self,
        retries: &mut u64,
        bucket: &Bucket,
        request: &Request,
    ) -> Result<()> {
        let timeout = self.shared.config.timeout;
        if *retries == 0 {
            return Err(HttpError::timeout(timeout, request.method, &request.endpoint).into());
        }
        *retries -= 1;
        self.shared.events.debug(format!(
            "({}) {}, {retries} retries left",
            bucket.id,
            ErrorKind::Timeout(timeout)
        ));
        Ok(())
    }
}

/// Turn a 4xx response into an error, preferring the payload the API sent
async fn client_error(
    status: StatusCode,
    request: &Request,
    response: reqwest::Response,
) -> ErrorKind {
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return ErrorKind::ReadResponseBody(e),
    };

    if bytes.is_empty() {
        return HttpError::from_status(status, request.method, &request.endpoint).into();
    }

    match serde_json::from_slice::<ApiErrorPayload>(&bytes) {
        Ok(payload) => ApiError::new(payload, status, request.method, request.url.clone()).into(),
        Err(e) => {
            log::warn!(
                "Malformed error response for {} {}: {e}",
                request.method,
                request.endpoint
            );
            HttpError::from_status(status, request.method, &request.endpoint)
                .with_message(format!("Malformed error response: {e}"))
                .into()
        }
    }
}
