//! Parse the rate limit headers attached to every API response.
//!
//! All headers are optional. A value that cannot be parsed is treated as if
//! the header was absent.

use http::{HeaderMap, HeaderValue};
use std::time::{Duration, SystemTime};
use thiserror::Error;

const LIMIT: &str = "x-ratelimit-limit";
const REMAINING: &str = "x-ratelimit-remaining";
const RESET_AFTER: &str = "x-ratelimit-reset-after";
const BUCKET: &str = "x-ratelimit-bucket";
const GLOBAL: &str = "x-ratelimit-global";
const RETRY_AFTER: &str = "retry-after";

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Rate limit information reported by the server for one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RateLimitHeaders {
    pub(crate) limit: Option<u64>,
    pub(crate) remaining: Option<u64>,
    pub(crate) reset_after: Option<Duration>,
    pub(crate) bucket: Option<String>,
    pub(crate) retry_after: Option<Duration>,
    pub(crate) global: bool,
}

impl RateLimitHeaders {
    pub(crate) fn parse(headers: &HeaderMap) -> Self {
        Self {
            limit: parse_header_value(headers, LIMIT),
            remaining: parse_header_value(headers, REMAINING),
            reset_after: headers
                .get(RESET_AFTER)
                .and_then(|value| parse_seconds(value).ok()),
            bucket: headers
                .get(BUCKET)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(ToString::to_string),
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|value| parse_retry_after(value).ok()),
            // Any non-empty value marks the limit as global
            global: headers.get(GLOBAL).is_some_and(|value| !value.is_empty()),
        }
    }
}

/// Parse a possibly fractional number of seconds, e.g. `"1.250"`.
fn parse_seconds(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?;

    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| RetryAfterParseError::ValueError(value.into()))
}

/// Parse the "Retry-After" header.
///
/// The API sends fractional seconds; the HTTP-date form of
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
/// is accepted as well.
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    parse_seconds(value).or_else(|err| {
        let Ok(value) = value.to_str() else {
            return Err(err);
        };
        httpdate::parse_http_date(value)
            .map(|s| {
                s.duration_since(SystemTime::now())
                    // if date is in the past, we can use ZERO
                    .unwrap_or(Duration::ZERO)
            })
            .map_err(|_| RetryAfterParseError::ValueError(value.into()))
    })
}

/// Helper method to parse numeric header values
fn parse_header_value(headers: &HeaderMap, header_name: &str) -> Option<u64> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderMap, HeaderName, HeaderValue};
    use pretty_assertions::assert_eq;

    use super::{RateLimitHeaders, RetryAfterParseError, parse_retry_after};

    #[test]
    fn test_retry_after() {
        assert_eq!(parse_retry_after(&value("1")), Ok(Duration::from_secs(1)));
        assert_eq!(
            parse_retry_after(&value("0.25")),
            Ok(Duration::from_millis(250))
        );
        assert_eq!(
            parse_retry_after(&value("-1")),
            Err(RetryAfterParseError::ValueError("-1".into()))
        );

        assert_eq!(
            parse_retry_after(&value("Fri, 15 May 2015 15:34:21 GMT")),
            Ok(Duration::ZERO)
        );

        let result = parse_retry_after(&value("Fri, 15 May 4099 15:34:21 GMT"));
        let is_in_future = matches!(result, Ok(d) if d.as_secs() > 0);
        assert!(is_in_future);
    }

    #[test]
    fn test_parse_all_headers() {
        let headers = headers(&[
            ("X-RateLimit-Limit", "5"),
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Reset-After", "1.5"),
            ("X-RateLimit-Bucket", "abcd1234"),
            ("Retry-After", "2"),
            ("X-RateLimit-Global", "True"),
        ]);

        assert_eq!(
            RateLimitHeaders::parse(&headers),
            RateLimitHeaders {
                limit: Some(5),
                remaining: Some(0),
                reset_after: Some(Duration::from_millis(1500)),
                bucket: Some("abcd1234".into()),
                retry_after: Some(Duration::from_secs(2)),
                global: true,
            }
        );
    }

    #[test]
    fn test_any_global_value_is_global() {
        for flag in ["true", "1", "yes"] {
            let parsed = RateLimitHeaders::parse(&headers(&[("X-RateLimit-Global", flag)]));
            assert!(parsed.global, "`{flag}` should mark the limit as global");
        }
    }

    #[test]
    fn test_missing_headers() {
        assert_eq!(
            RateLimitHeaders::parse(&HeaderMap::new()),
            RateLimitHeaders::default()
        );
    }

    #[test]
    fn test_unparsable_headers_are_absent() {
        let headers = headers(&[
            ("X-RateLimit-Limit", "many"),
            ("X-RateLimit-Remaining", "-3"),
            ("X-RateLimit-Reset-After", "soon"),
            ("X-RateLimit-Bucket", ""),
            ("X-RateLimit-Global", ""),
        ]);

        assert_eq!(
            RateLimitHeaders::parse(&headers),
            RateLimitHeaders::default()
        );
    }

    fn value(v: &str) -> HeaderValue {
        HeaderValue::from_str(v).unwrap()
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, v) in pairs {
            map.insert(HeaderName::from_bytes(name.as_bytes()).unwrap(), value(v));
        }
        map
    }
}
