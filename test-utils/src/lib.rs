//! `test-utils` is used for testing in both `tollbooth-lib` and `tollbooth`.
//! This crate does not depend on `tollbooth-lib` or `tollbooth`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock API server, which responds with a predefined status to
/// every request, whatever its method or path
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new($status);
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any()).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// A response template carrying bucket rate limit headers.
///
/// `reset_after` is given in (fractional) seconds, like the API does.
#[macro_export]
macro_rules! ratelimit_response {
    ($status:expr, remaining = $remaining:expr, reset_after = $reset_after:expr $(, bucket = $bucket:expr)? $(,)?) => {{
        let template = wiremock::ResponseTemplate::new($status)
            .insert_header("X-RateLimit-Limit", "5")
            .insert_header("X-RateLimit-Remaining", $remaining.to_string().as_str())
            .insert_header("X-RateLimit-Reset-After", $reset_after.to_string().as_str());
        $(let template = template.insert_header("X-RateLimit-Bucket", $bucket);)?
        template
    }};
}

/// A 429 response for the global rate limit, with `retry_after` in seconds
#[macro_export]
macro_rules! global_ratelimit_response {
    ($retry_after:expr $(,)?) => {{
        wiremock::ResponseTemplate::new(429)
            .insert_header("X-RateLimit-Global", "true")
            .insert_header("Retry-After", $retry_after.to_string().as_str())
            .set_body_json(serde_json::json!({
                "message": "You are being rate limited.",
                "retry_after": $retry_after,
                "global": true,
            }))
    }};
}

/// API base URL served by the given mock server
///
/// # Panic
///
/// This panics on error, so it should only be used for testing
#[macro_export]
macro_rules! api_url {
    ($mock_server:expr) => {{
        url::Url::parse(&format!("{}/api", $mock_server.uri())).expect("Expected valid API URL")
    }};
}
