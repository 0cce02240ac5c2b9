//! Per-bucket and global rate limiting.
//!
//! The server assigns every route a bucket and reports its quota in the
//! headers of each response. This module keeps track of those quotas and
//! holds requests back until they can be sent.
//!
//! # Architecture
//!
//! - [`Bucket`]: Quota of one (hash, major parameter) pair; serializes its requests
//! - [`GlobalLimiter`]: Deadline shared by all buckets of a dispatcher
//! - [`HashTable`]: Maps routes to the bucket hash reported by the server
//! - [`HandlerConfig`]: Timeout, retry and offset settings

mod bucket;
mod config;
mod global;
mod hashes;
mod headers;

pub use bucket::{Bucket, Consumed};
pub use config::{DEFAULT_OFFSET, DEFAULT_RETRIES, DEFAULT_TIMEOUT, HandlerConfig};
pub use global::GlobalLimiter;
pub use hashes::HashTable;

use crate::events::Events;

/// State every bucket of one dispatcher refers to
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) client: reqwest::Client,
    pub(crate) config: HandlerConfig,
    pub(crate) global: GlobalLimiter,
    pub(crate) hashes: HashTable,
    pub(crate) events: Events,
}

impl Shared {
    pub(crate) fn new(client: reqwest::Client, config: HandlerConfig) -> Self {
        Self {
            client,
            config,
            global: GlobalLimiter::new(),
            hashes: HashTable::new(),
            events: Events::default(),
        }
    }
}
