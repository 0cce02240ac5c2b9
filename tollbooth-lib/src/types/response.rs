use http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;

use crate::{ErrorKind, Result};

/// Parsed body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The server declared `application/json`
    Json(serde_json::Value),
    /// Any other content type, or an empty body
    Bytes(Vec<u8>),
}

impl ResponseBody {
    /// Read the body of `response`, decoding it when it is declared as JSON.
    pub(crate) async fn from_response(response: reqwest::Response) -> Result<Self> {
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        let bytes = response
            .bytes()
            .await
            .map_err(ErrorKind::ReadResponseBody)?;

        if is_json && !bytes.is_empty() {
            let value = serde_json::from_slice(&bytes).map_err(ErrorKind::DecodeResponseBody)?;
            Ok(Self::Json(value))
        } else {
            Ok(Self::Bytes(bytes.to_vec()))
        }
    }

    /// Deserialize the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Json(value) => serde_json::from_value(value),
            Self::Bytes(bytes) => serde_json::from_slice(&bytes),
        }
        .map_err(ErrorKind::DecodeResponseBody)
    }

    /// Borrow the decoded JSON value, if the body was JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Bytes(_) => None,
        }
    }

    /// Size of the body in bytes, or `None` for decoded JSON.
    #[must_use]
    pub fn byte_len(&self) -> Option<usize> {
        match self {
            Self::Json(_) => None,
            Self::Bytes(bytes) => Some(bytes.len()),
        }
    }
}
