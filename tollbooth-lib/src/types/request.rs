use http::HeaderMap;
use url::Url;

use super::file::File;
use crate::{ErrorKind, Method, Result};

/// Payload of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A JSON document, already serialized
    Json(Vec<u8>),
    /// Files, plus an optional JSON document sent as the `payload_json` part
    Multipart {
        /// Attachments, one part each
        files: Vec<File>,
        /// Serialized JSON sent alongside the files
        payload_json: Option<String>,
    },
}

/// A single logical API call.
///
/// Everything the dispatcher needs is computed up front, so a request can be
/// replayed as often as the retry policy requires.
#[derive(Debug, Clone)]
pub struct Request {
    /// Path relative to the versioned API root, always starting with `/`
    pub endpoint: String,
    /// HTTP method
    pub method: Method,
    /// Headers sent with every attempt
    pub headers: HeaderMap,
    /// Optional payload
    pub body: Option<Body>,
    /// Fully qualified URL of the endpoint
    pub url: Url,
}

impl Request {
    /// Create a request without headers or body.
    #[must_use]
    pub fn new(method: Method, endpoint: &str, url: Url) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            method,
            headers: HeaderMap::new(),
            body: None,
            url,
        }
    }

    /// Replace the headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Build one attempt of this request for `client`.
    pub(crate) fn to_reqwest(&self, client: &reqwest::Client) -> Result<reqwest::Request> {
        let mut builder = client
            .request(self.method.into(), self.url.clone())
            .headers(self.headers.clone());

        match &self.body {
            Some(Body::Json(bytes)) => builder = builder.body(bytes.clone()),
            Some(Body::Multipart {
                files,
                payload_json,
            }) => builder = attach_multipart(builder, files, payload_json.as_deref())?,
            None => {}
        }

        builder.build().map_err(ErrorKind::NetworkRequest)
    }
}

/// Make sure an endpoint starts with exactly one leading slash.
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_start_matches('/'))
}

#[cfg(feature = "multipart")]
fn attach_multipart(
    builder: reqwest::RequestBuilder,
    files: &[File],
    payload_json: Option<&str>,
) -> Result<reqwest::RequestBuilder> {
    use reqwest::multipart::{Form, Part};

    let mut form = Form::new();
    for file in files {
        let part = Part::bytes(file.data.clone()).file_name(file.name.clone());
        form = form.part(file.name.clone(), part);
    }
    if let Some(payload) = payload_json {
        form = form.text("payload_json", payload.to_string());
    }

    Ok(builder.multipart(form))
}

#[cfg(not(feature = "multipart"))]
fn attach_multipart(
    _builder: reqwest::RequestBuilder,
    _files: &[File],
    _payload_json: Option<&str>,
) -> Result<reqwest::RequestBuilder> {
    Err(ErrorKind::MultipartUnavailable)
}
