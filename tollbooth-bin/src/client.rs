use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use http::HeaderMap;
use tollbooth_lib::{Client, ClientBuilder, HandlerConfig};

/// Creates a client according to the command-line config
pub(crate) fn create(cfg: &Config) -> Result<Client> {
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    let handler = HandlerConfig {
        timeout: cfg.timeout,
        retries: cfg.retries,
        offset: cfg.offset,
    };

    ClientBuilder::builder()
        .api_url(cfg.api_url.clone())
        .api_version(cfg.api_version)
        .user_agent(cfg.user_agent.clone())
        .token_prefix(cfg.token_prefix)
        .token(cfg.token.clone())
        .handler(handler)
        .custom_headers(headers)
        .build()
        .client()
        .context("Failed to create request client")
}
