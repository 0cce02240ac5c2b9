//! `tollbooth` is a client for rate limited REST APIs.
//!
//! Requests are routed through per-route buckets whose quotas are learned
//! from the rate limit headers of every response. A request waits while its
//! bucket or the global limit is exhausted, is replayed when the server
//! answers 429 and retried on timeouts and server errors.
//!
//! ```no_run
//! use secrecy::SecretString;
//! use tollbooth_lib::{ClientBuilder, RequestOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .token(Some(SecretString::from("my-token")))
//!       .build()
//!       .client()?;
//!   let me = client.get("/users/@me", RequestOptions::default()).await?;
//!   println!("{me:?}");
//!   Ok(())
//! }
//! ```
//!
//! The [`Dispatcher`] can also be used directly with hand-built requests:
//!
//! ```no_run
//! use tollbooth_lib::{Dispatcher, HandlerConfig, Method, Request, Result};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let dispatcher = Dispatcher::new(reqwest::Client::new(), HandlerConfig::default());
//!   let url = Url::parse("https://discord.com/api/v9/gateway")?;
//!   let body = dispatcher.queue_request(Request::new(Method::Get, "/gateway", url)).await?;
//!   println!("{body:?}");
//!   Ok(())
//! }
//! ```

mod client;
mod dispatcher;
mod retry;
mod route;
mod types;

pub mod events;
pub mod ratelimit;

pub use client::{
    Client, ClientBuilder, DEFAULT_API_URL, DEFAULT_API_VERSION, DEFAULT_USER_AGENT, QueryValue,
    RequestOptions, TokenPrefix,
};
pub use dispatcher::Dispatcher;
pub use events::{Event, RateLimitInfo};
pub use ratelimit::{Bucket, GlobalLimiter, HandlerConfig, HashTable};
pub use route::{GLOBAL_MAJOR_PARAMETER, Route, snowflake_timestamp};
pub use types::*;
