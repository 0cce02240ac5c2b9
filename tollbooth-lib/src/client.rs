//! Convenience layer on top of the [`Dispatcher`].
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` turns an endpoint and a set of [`RequestOptions`] into a
//! [`Request`] and queues it. `ClientBuilder` exposes a finer level of
//! granularity for building a `Client`.
#![allow(clippy::module_name_repetitions)]

use std::fmt::{self, Display};

use http::header::{self, HeaderMap, HeaderValue};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::EnumString;
use typed_builder::TypedBuilder;
use url::Url;

use crate::ratelimit::HandlerConfig;
use crate::types::normalize_endpoint;
use crate::{Body, Dispatcher, ErrorKind, File, Method, Request, ResponseBody, Result};

/// Default base URL of the API, `https://discord.com/api`.
pub const DEFAULT_API_URL: &str = "https://discord.com/api";
/// Default API version, 9.
pub const DEFAULT_API_VERSION: u8 = 9;
/// Default user agent, `tollbooth/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("tollbooth/", env!("CARGO_PKG_VERSION"));

const RATELIMIT_PRECISION: &str = "x-ratelimit-precision";
const AUDIT_LOG_REASON: &str = "x-audit-log-reason";

/// Characters escaped in the audit log reason.
/// Leaves the same characters readable as JavaScript's `encodeURIComponent`.
const REASON_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Scheme prepended to the token in the `Authorization` header
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TokenPrefix {
    /// `Bot <token>`
    #[default]
    Bot,
    /// `Bearer <token>`, for OAuth2 access tokens
    Bearer,
    /// The token is sent as is
    None,
}

impl TokenPrefix {
    const fn as_header_prefix(self) -> &'static str {
        match self {
            Self::Bot => "Bot ",
            Self::Bearer => "Bearer ",
            Self::None => "",
        }
    }
}

/// Value of a query parameter. Lists are sent comma separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// A single value
    Single(String),
    /// Several values joined by `,`
    List(Vec<String>),
}

impl Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => f.write_str(value),
            Self::List(values) => f.write_str(&values.join(",")),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<u64> for QueryValue {
    fn from(value: u64) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Single(value.to_string())
    }
}

impl<T: Into<String>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Everything about a call besides its method and endpoint
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
pub struct RequestOptions {
    /// Send the `Authorization` header. Requires a token.
    #[builder(default = true)]
    pub authorize: bool,
    /// Reason shown in the guild's audit log
    #[builder(setter(strip_option))]
    pub audit_log_reason: Option<String>,
    /// Query parameters in order
    pub query: Vec<(String, QueryValue)>,
    /// JSON payload; sent as `payload_json` when files are attached
    #[builder(setter(strip_option))]
    pub body: Option<serde_json::Value>,
    /// Files, sent as a multipart form
    pub files: Vec<File>,
    /// Additional headers
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`Client`].
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Base URL of the API, without version
    #[builder(default_code = "String::from(DEFAULT_API_URL)")]
    api_url: String,
    /// API version, inserted as `/v{version}` after the base URL
    #[builder(default = DEFAULT_API_VERSION)]
    api_version: u8,
    /// User-agent sent with every request.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,
    /// Scheme of the `Authorization` header
    token_prefix: TokenPrefix,
    /// Token for authorized requests. Can be set later with [`Client::set_token`].
    token: Option<SecretString>,
    /// Timeout, retries and offset of the dispatcher
    handler: HandlerConfig,
    /// Headers sent with every request
    custom_headers: HeaderMap,
}

impl Default for ClientBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent is invalid.
    /// - The API URL is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let Self {
            api_url,
            api_version,
            user_agent,
            token_prefix,
            token,
            handler,
            custom_headers: mut headers,
        } = self;

        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(ErrorKind::InvalidHeader)?,
        );
        headers.insert(RATELIMIT_PRECISION, HeaderValue::from_static("millisecond"));

        let reqwest_client = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;

        let base_url = format!("{}/v{api_version}", api_url.trim_end_matches('/'));
        // Fail early on a broken base URL
        Url::parse(&base_url)?;

        Ok(Client {
            dispatcher: Dispatcher::new(reqwest_client, handler),
            base_url,
            token,
            token_prefix,
        })
    }
}

/// Sends requests to the API.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Dispatcher,
    /// API URL including the version, without trailing slash
    base_url: String,
    token: Option<SecretString>,
    token_prefix: TokenPrefix,
}

impl Client {
    /// The dispatcher requests are queued on
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Replace the token used for authorized requests
    pub fn set_token(&mut self, token: SecretString) {
        self.token = Some(token);
    }

    /// Send a request and wait for its response body.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be built (see [`Client::build_request`])
    /// or the dispatcher gives up on it (see [`Dispatcher::queue_request`]).
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Option<ResponseBody>> {
        let request = self.build_request(method, endpoint, options)?;
        self.dispatcher.queue_request(request).await
    }

    /// Send a `GET` request
    ///
    /// # Errors
    ///
    /// See [`Client::request`]
    pub async fn get(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Option<ResponseBody>> {
        self.request(Method::Get, endpoint, options).await
    }

    /// Send a `POST` request
    ///
    /// # Errors
    ///
    /// See [`Client::request`]
    pub async fn post(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Option<ResponseBody>> {
        self.request(Method::Post, endpoint, options).await
    }

    /// Send a `PUT` request
    ///
    /// # Errors
    ///
    /// See [`Client::request`]
    pub async fn put(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Option<ResponseBody>> {
        self.request(Method::Put, endpoint, options).await
    }

    /// Send a `PATCH` request
    ///
    /// # Errors
    ///
    /// See [`Client::request`]
    pub async fn patch(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Option<ResponseBody>> {
        self.request(Method::Patch, endpoint, options).await
    }

    /// Send a `DELETE` request
    ///
    /// # Errors
    ///
    /// See [`Client::request`]
    pub async fn delete(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Option<ResponseBody>> {
        self.request(Method::Delete, endpoint, options).await
    }

    /// Turn an endpoint and its options into a [`Request`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - the request should be authorized but no token was set
    /// - files are attached without the `multipart` feature
    /// - the URL or a header value is invalid
    pub fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Request> {
        let RequestOptions {
            authorize,
            audit_log_reason,
            query,
            body,
            files,
            mut headers,
        } = options;
        let endpoint = normalize_endpoint(endpoint);

        if !files.is_empty() && !cfg!(feature = "multipart") {
            return Err(ErrorKind::MultipartUnavailable);
        }

        let mut url = Url::parse(&format!("{}{endpoint}", self.base_url))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query {
                pairs.append_pair(key, &value.to_string());
            }
        }

        if authorize {
            let token = self
                .token
                .as_ref()
                .ok_or_else(|| ErrorKind::MissingToken(format!("{method} {endpoint}")))?;
            let mut value = HeaderValue::from_str(&format!(
                "{}{}",
                self.token_prefix.as_header_prefix(),
                token.expose_secret()
            ))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        if let Some(reason) = audit_log_reason {
            let encoded = utf8_percent_encode(&reason, REASON_ENCODE_SET).to_string();
            headers.insert(AUDIT_LOG_REASON, HeaderValue::from_str(&encoded)?);
        }

        let body = if files.is_empty() {
            body.and_then(|json| match serde_json::to_vec(&json) {
                Ok(bytes) => {
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    );
                    Some(Body::Json(bytes))
                }
                Err(e) => {
                    log::warn!("Cannot serialize body of {method} {endpoint}, sending none: {e}");
                    None
                }
            })
        } else {
            let payload_json = body.and_then(|json| match serde_json::to_string(&json) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    log::warn!("Cannot serialize payload of {method} {endpoint}, sending none: {e}");
                    None
                }
            });
            Some(Body::Multipart {
                files,
                payload_json,
            })
        };

        let mut request = Request::new(method, &endpoint, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        Ok(request)
    }
}
