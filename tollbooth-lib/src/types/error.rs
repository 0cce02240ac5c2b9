use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

use super::api_error::{ApiError, HttpError};
use http::StatusCode;

/// Possible errors when talking to the REST API through `tollbooth_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Network error while sending a request, other than a timeout
    #[error("Network error while trying to connect to an endpoint via reqwest")]
    NetworkRequest(#[source] reqwest::Error),

    /// Cannot read the body of the received response
    #[error("Error reading response body: {0}")]
    ReadResponseBody(#[source] reqwest::Error),

    /// A response declared as JSON could not be decoded
    #[error("Cannot decode response body: {0}")]
    DecodeResponseBody(#[source] serde_json::Error),

    /// The request client cannot be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// A single attempt did not complete within the configured timeout.
    ///
    /// The dispatcher retries these and turns the final one into
    /// [`ErrorKind::Http`], so callers normally never see this variant.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Server errors that persisted after all retries, malformed client
    /// error bodies and exhausted timeouts
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A well-formed error reported by the API
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An authorized request was made before a token was set
    #[error("Cannot authorize request {0} without a token")]
    MissingToken(String),

    /// Files were attached but multipart support was not compiled in
    #[error("Attaching files requires the `multipart` feature of tollbooth-lib")]
    MultipartUnavailable,

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The request URL could not be built from the API base and endpoint
    #[error("Cannot build request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ErrorKind {
    /// Return the underlying `reqwest` error, if any.
    #[must_use]
    pub const fn reqwest_error(&self) -> Option<&reqwest::Error> {
        match self {
            Self::NetworkRequest(e) | Self::ReadResponseBody(e) | Self::BuildRequestClient(e) => {
                Some(e)
            }
            _ => None,
        }
    }

    /// The HTTP status the server answered with, if the error came from a
    /// response.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) => e.status,
            Self::Api(e) => Some(e.status),
            _ => None,
        }
    }

    /// Configuration errors are fatal and surface before anything is sent.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingToken(_) | Self::MultipartUnavailable | Self::BuildRequestClient(_)
        )
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NetworkRequest(e1), Self::NetworkRequest(e2))
            | (Self::ReadResponseBody(e1), Self::ReadResponseBody(e2))
            | (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::DecodeResponseBody(e1), Self::DecodeResponseBody(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::Timeout(d1), Self::Timeout(d2)) => d1 == d2,
            (Self::Http(e1), Self::Http(e2)) => e1 == e2,
            (Self::Api(e1), Self::Api(e2)) => e1 == e2,
            (Self::MissingToken(e1), Self::MissingToken(e2)) => e1 == e2,
            (Self::InvalidUrl(e1), Self::InvalidUrl(e2)) => e1 == e2,
            (Self::InvalidHeader(_), Self::InvalidHeader(_))
            | (Self::MultipartUnavailable, Self::MultipartUnavailable) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
