use http::{HeaderMap, StatusCode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::Shared;
use super::headers::RateLimitHeaders;
use crate::events::{Event, RateLimitInfo};
use crate::types::Result;
use crate::{ErrorKind, Request, Route};

/// Quota reported by the server for one bucket
#[derive(Debug, Clone, Copy)]
struct BucketState {
    /// `None` until the first response arrived
    remaining: Option<u64>,
    /// `None` means unbounded
    limit: Option<u64>,
    resets_at: Instant,
}

/// Rate limit state of one (hash, major parameter) pair.
///
/// Requests through a bucket are strictly serialized in arrival order:
/// the bucket lock is taken before waiting for any limit and released
/// only after the response headers have been applied.
#[derive(Debug)]
pub struct Bucket {
    /// `hash:major_parameter`
    pub id: String,
    /// Server-assigned (or synthetic) bucket hash
    pub hash: String,
    /// Channel, guild or webhook id, or `global`
    pub major_parameter: String,

    state: Mutex<BucketState>,
    lock: tokio::sync::Mutex<()>,
    shared: Arc<Shared>,
}

/// A response obtained through a [`Bucket`].
///
/// The bucket stays locked for as long as this value lives, so the
/// response headers can be applied before the next request is sent.
#[derive(Debug)]
pub struct Consumed<'a> {
    response: reqwest::Response,
    deadline: Instant,
    _permit: tokio::sync::MutexGuard<'a, ()>,
}

impl Consumed<'_> {
    /// Status of the response
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Headers of the response
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// End of the attempt's timeout. Reading the body must finish before it.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Release the bucket and return the response
    #[must_use]
    pub fn into_response(self) -> reqwest::Response {
        self.response
    }
}

impl Bucket {
    pub(crate) fn new(hash: &str, major_parameter: &str, shared: Arc<Shared>) -> Self {
        Self {
            id: format!("{hash}:{major_parameter}"),
            hash: hash.to_string(),
            major_parameter: major_parameter.to_string(),
            state: Mutex::new(BucketState {
                remaining: None,
                limit: None,
                resets_at: Instant::now(),
            }),
            lock: tokio::sync::Mutex::new(()),
            shared,
        }
    }

    /// Whether the quota is used up and the reset still lies ahead
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.time_until_reset().is_some()
    }

    /// Whether no request is in flight and the bucket is not limited
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.lock.try_lock().is_ok() && !self.is_limited()
    }

    /// Requests left until the reset, `None` if unknown
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.state().remaining
    }

    /// Quota of this bucket, `None` if unbounded or unknown
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.state().limit
    }

    /// Time a request has to wait before it may be sent, if limited
    fn time_until_reset(&self) -> Option<Duration> {
        let state = self.state();
        let now = Instant::now();
        (state.remaining == Some(0) && now < state.resets_at).then(|| state.resets_at - now)
    }

    /// Send one attempt of `request` once neither the global limit nor this
    /// bucket's own quota forbid it.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Timeout`] if no response arrived within the configured timeout.
    ///   The same deadline applies to reading the body, see [`Consumed::deadline`].
    /// - [`ErrorKind::NetworkRequest`] for any other transport failure
    /// - any error of building the request, e.g. [`ErrorKind::MultipartUnavailable`]
    pub async fn consume(&self, request: &Request) -> Result<Consumed<'_>> {
        let permit = self.lock.lock().await;

        self.shared.global.wait().await;

        if let Some(duration) = self.time_until_reset() {
            self.shared.events.debug(format!("({}) Waiting {}ms", self.id, duration.as_millis()));
            self.shared.events.publish(Event::RateLimited(RateLimitInfo {
                method: request.method,
                endpoint: request.endpoint.clone(),
                duration,
                hash: self.hash.clone(),
                limit: self.limit(),
                major_parameter: self.major_parameter.clone(),
            }));
            tokio::time::sleep(duration).await;
        }

        let attempt = request.to_reqwest(&self.shared.client)?;
        let timeout = self.shared.config.timeout;
        let start = Instant::now();
        let deadline = start + timeout;
        let result = tokio::time::timeout_at(deadline, self.shared.client.execute(attempt)).await;
        self.shared.events.debug(format!(
            "({}) Request took {}ms",
            self.id,
            start.elapsed().as_millis()
        ));

        match result {
            Err(_) => Err(ErrorKind::Timeout(timeout)),
            Ok(Err(e)) if e.is_timeout() => Err(ErrorKind::Timeout(timeout)),
            Ok(Err(e)) => Err(ErrorKind::NetworkRequest(e)),
            Ok(Ok(response)) => Ok(Consumed {
                response,
                deadline,
                _permit: permit,
            }),
        }
    }

    /// Apply the rate limit headers of a response to this bucket, the hash
    /// table and the global limiter.
    ///
    /// Returns `true` if the server rate limited the request and it should
    /// be sent again.
    pub fn handle(&self, route: &Route, headers: &HeaderMap, status: StatusCode) -> bool {
        let headers = RateLimitHeaders::parse(headers);
        let offset = self.shared.config.offset;
        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
        let now = Instant::now();

        {
            let mut state = self.state();
            state.limit = headers.limit;
            state.remaining = Some(headers.remaining.unwrap_or(1));
            state.resets_at = headers
                .reset_after
                .map_or(now, |reset_after| now + reset_after + offset);

            if rate_limited
                && !headers.global
                && headers.reset_after.is_none()
                && let Some(retry_after) = headers.retry_after
            {
                state.remaining = Some(0);
                state.resets_at = now + retry_after + offset;
            }
        }

        if let Some(hash) = &headers.bucket
            && hash != &self.hash
            && self.shared.hashes.update(route, hash)
        {
            self.shared.events.debug(format!(
                "({}) Bucket hash has been updated: old={}, new={hash}",
                self.id, self.hash
            ));
        }

        if headers.global {
            let duration = headers.retry_after.unwrap_or_default() + offset;
            self.shared.global.limit(duration);
            self.shared.events.publish(Event::GlobalRateLimited { duration });
        }

        rate_limited
    }

    fn state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use crate::ratelimit::HandlerConfig;
    use http::{HeaderName, HeaderValue};
    use test_utils::{mock_server, ratelimit_response};
    use url::Url;

    fn shared(config: HandlerConfig) -> Arc<Shared> {
        Arc::new(Shared::new(reqwest::Client::new(), config))
    }

    fn bucket(config: HandlerConfig) -> Bucket {
        Bucket::new("abcd", "111111111111111111", shared(config))
    }

    fn route() -> Route {
        Route::extract("/channels/111111111111111111", Method::Get)
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    fn request(server: &wiremock::MockServer) -> Request {
        let url = Url::parse(&format!("{}/api/v9/channels/111111111111111111", server.uri())).unwrap();
        Request::new(Method::Get, "/channels/111111111111111111", url)
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_bucket_is_unlimited() {
        let bucket = bucket(HandlerConfig::default());
        assert_eq!(bucket.id, "abcd:111111111111111111");
        assert_eq!(bucket.remaining(), None);
        assert_eq!(bucket.limit(), None);
        assert!(!bucket.is_limited());
        assert!(bucket.is_inactive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limited_until_reset() {
        let bucket = bucket(HandlerConfig::default());
        let retry = bucket.handle(
            &route(),
            &headers(&[
                ("x-ratelimit-limit", "5"),
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset-after", "1"),
            ]),
            StatusCode::OK,
        );

        assert!(!retry);
        assert_eq!(bucket.limit(), Some(5));
        assert_eq!(bucket.remaining(), Some(0));
        assert!(bucket.is_limited());

        // Reset after plus the default offset of 50ms
        tokio::time::advance(Duration::from_millis(1049)).await;
        assert!(bucket.is_limited());
        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!bucket.is_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_headers_reset_state() {
        let bucket = bucket(HandlerConfig::default());
        bucket.handle(
            &route(),
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset-after", "5")]),
            StatusCode::OK,
        );
        assert!(bucket.is_limited());

        bucket.handle(&route(), &HeaderMap::new(), StatusCode::OK);
        assert_eq!(bucket.remaining(), Some(1));
        assert_eq!(bucket.limit(), None);
        assert!(!bucket.is_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_status_requests_replay() {
        let bucket = bucket(HandlerConfig::default());
        assert!(bucket.handle(&route(), &HeaderMap::new(), StatusCode::TOO_MANY_REQUESTS));
        assert!(!bucket.handle(&route(), &HeaderMap::new(), StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_without_reset_limits_bucket() {
        let bucket = bucket(HandlerConfig::default());
        bucket.handle(
            &route(),
            &headers(&[("retry-after", "0.5")]),
            StatusCode::TOO_MANY_REQUESTS,
        );
        assert_eq!(bucket.remaining(), Some(0));
        assert!(bucket.is_limited());
        assert!(!bucket.shared.global.is_active());

        tokio::time::advance(Duration::from_millis(551)).await;
        assert!(!bucket.is_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_change_updates_table() {
        let bucket = bucket(HandlerConfig::default());
        let route = route();

        bucket.handle(&route, &headers(&[("x-ratelimit-bucket", "abcd")]), StatusCode::OK);
        assert!(bucket.shared.hashes.is_empty());

        bucket.handle(&route, &headers(&[("x-ratelimit-bucket", "efgh")]), StatusCode::OK);
        assert_eq!(bucket.shared.hashes.get_or_default(&route), "efgh");
        // In-flight bucket keeps its identity
        assert_eq!(bucket.hash, "abcd");
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_flag_installs_global_limit() {
        let bucket = bucket(HandlerConfig::default());
        let mut events = bucket.shared.events.subscribe();

        let retry = bucket.handle(
            &route(),
            &headers(&[("x-ratelimit-global", "true"), ("retry-after", "2")]),
            StatusCode::TOO_MANY_REQUESTS,
        );

        assert!(retry);
        assert_eq!(
            bucket.shared.global.remaining(),
            Some(Duration::from_millis(2050))
        );
        assert_eq!(
            events.recv().await.unwrap(),
            Event::GlobalRateLimited {
                duration: Duration::from_millis(2050)
            }
        );
    }

    #[tokio::test]
    async fn test_consume_waits_for_reset() {
        let mock_server = mock_server!(200);
        let config = HandlerConfig {
            offset: Duration::ZERO,
            ..HandlerConfig::default()
        };
        let bucket = bucket(config);
        bucket.handle(
            &route(),
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset-after", "0.5")]),
            StatusCode::OK,
        );

        let mut events = bucket.shared.events.subscribe();
        let start = std::time::Instant::now();
        let consumed = bucket.consume(&request(&mock_server)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(consumed.status(), StatusCode::OK);

        let limited = loop {
            if let Event::RateLimited(info) = events.recv().await.unwrap() {
                break info;
            }
        };
        assert_eq!(limited.hash, "abcd");
        assert_eq!(limited.endpoint, "/channels/111111111111111111");
    }

    #[tokio::test]
    async fn test_consume_with_quota_left_is_immediate() {
        let mock_server = mock_server!(200);
        let bucket = bucket(HandlerConfig::default());
        bucket.handle(
            &route(),
            &headers(&[("x-ratelimit-remaining", "3"), ("x-ratelimit-reset-after", "10")]),
            StatusCode::OK,
        );

        let start = std::time::Instant::now();
        bucket.consume(&request(&mock_server)).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_consume_times_out() {
        let mock_server = mock_server!(200, set_delay(Duration::from_millis(500)));
        let config = HandlerConfig {
            timeout: Duration::from_millis(100),
            ..HandlerConfig::default()
        };
        let bucket = bucket(config);

        let result = bucket.consume(&request(&mock_server)).await;
        assert!(matches!(result, Err(ErrorKind::Timeout(t)) if t == Duration::from_millis(100)));
        // The lock is released on error
        assert!(bucket.is_inactive());
    }

    #[tokio::test]
    async fn test_consumed_holds_bucket_lock() {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(ratelimit_response!(200, remaining = 4, reset_after = 1))
            .mount(&mock_server)
            .await;
        let bucket = bucket(HandlerConfig::default());

        let consumed = bucket.consume(&request(&mock_server)).await.unwrap();
        assert!(!bucket.is_inactive());
        assert!(!bucket.handle(&route(), consumed.headers(), consumed.status()));
        let response = consumed.into_response();
        assert!(bucket.is_inactive());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(bucket.remaining(), Some(4));
    }
}
