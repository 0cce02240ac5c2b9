use http::StatusCode;

use crate::ErrorKind;

/// An extension trait to help determine if a failed attempt
/// may be repeated at the cost of one retry.
///
/// Rate limited responses are not covered here: they are replayed by the
/// dispatcher without counting against the retry budget.
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    fn should_retry(&self) -> bool {
        self.is_server_error()
    }
}

impl RetryExt for reqwest::Error {
    fn should_retry(&self) -> bool {
        self.is_timeout()
    }
}

impl RetryExt for ErrorKind {
    fn should_retry(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::NetworkRequest(e) => e.should_retry(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::StatusCode;

    use super::RetryExt;
    use crate::ErrorKind;

    #[test]
    fn test_should_retry() {
        assert!(StatusCode::INTERNAL_SERVER_ERROR.should_retry());
        assert!(StatusCode::BAD_GATEWAY.should_retry());
        assert!(!StatusCode::TOO_MANY_REQUESTS.should_retry());
        assert!(!StatusCode::FORBIDDEN.should_retry());
        assert!(!StatusCode::OK.should_retry());
    }

    #[test]
    fn test_error_should_retry() {
        assert!(ErrorKind::Timeout(Duration::from_secs(1)).should_retry());
        assert!(!ErrorKind::MissingToken("GET /users/@me".into()).should_retry());
        assert!(!ErrorKind::MultipartUnavailable.should_retry());
    }
}
