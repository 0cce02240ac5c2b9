//! Mapping of endpoints to rate limit routes.
//!
//! The API does not rate limit individual URLs but *routes*: structurally
//! identical endpoints share one quota, except for the major parameter
//! (channel, guild or webhook id), which gets a quota of its own.
//!
//! ```
//! use tollbooth_lib::{Method, Route};
//!
//! let a = Route::extract("/channels/111111111111111111/messages/222222222222222222", Method::Get);
//! let b = Route::extract("/channels/333333333333333333/messages/444444444444444444", Method::Get);
//!
//! assert_eq!(a.bucket, "/channels/:id/messages/:id");
//! assert_eq!(a.bucket, b.bucket);
//! assert_ne!(a.major_parameter, b.major_parameter);
//! ```

use std::fmt::{self, Display};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::Method;

/// Major parameter used when the endpoint has no major resource.
pub const GLOBAL_MAJOR_PARAMETER: &str = "global";

/// Suffix of the bucket template for deleting messages older than
/// [`OLD_MESSAGE_AGE`].
pub const DELETE_OLD_SUFFIX: &str = ";delete-old";

/// Messages older than this are deleted through a separate bucket.
pub const OLD_MESSAGE_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 14);

/// First millisecond of the snowflake epoch (2015-01-01T00:00:00Z).
const SNOWFLAKE_EPOCH_MS: u64 = 1_420_070_400_000;

const MESSAGE_ROUTE: &str = "/channels/:id/messages/:id";

static MAJOR_PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:channels|guilds|webhooks)/([0-9]{16,19})").unwrap());

static SNOWFLAKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{16,19}").unwrap());

static REACTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/reactions/(.+)").unwrap());

static TRAILING_SNOWFLAKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{16,19}$").unwrap());

/// The rate limit identity of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Endpoint template with ids replaced by `:id`
    pub bucket: String,
    /// Id of the channel, guild or webhook the endpoint addresses, or
    /// [`GLOBAL_MAJOR_PARAMETER`]
    pub major_parameter: String,
    /// Method of the request
    pub method: Method,
}

impl Route {
    /// Compute the route of `endpoint` when requested with `method`.
    #[must_use]
    pub fn extract(endpoint: &str, method: Method) -> Self {
        Self::extract_at(endpoint, method, SystemTime::now())
    }

    /// Like [`Route::extract`], judging message age relative to `now`.
    #[must_use]
    pub fn extract_at(endpoint: &str, method: Method, now: SystemTime) -> Self {
        let major_parameter = MAJOR_PARAMETER
            .captures(endpoint)
            .and_then(|captures| captures.get(1))
            .map_or_else(|| GLOBAL_MAJOR_PARAMETER.to_string(), |m| m.as_str().to_string());

        let bucket = SNOWFLAKE.replace_all(endpoint, ":id");
        let mut bucket = REACTION
            .replace(&bucket, "/reactions/:reaction")
            .into_owned();

        if method == Method::Delete && bucket == MESSAGE_ROUTE && is_old_message(endpoint, now) {
            bucket.push_str(DELETE_OLD_SUFFIX);
        }

        Self {
            bucket,
            major_parameter,
            method,
        }
    }

    /// Key of this route in the hash table, e.g. `GET:/channels/:id`.
    #[must_use]
    pub fn hash_key(&self) -> String {
        format!("{}:{}", self.method, self.bucket)
    }

    /// Hash used until the server has told us the real one.
    #[must_use]
    pub fn synthetic_hash(&self) -> String {
        format!("Global({}-{})", self.method, self.bucket)
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.method, self.bucket, self.major_parameter)
    }
}

/// Whether the trailing id of `endpoint` was created more than
/// [`OLD_MESSAGE_AGE`] before `now`. Anything that is not a valid id is
/// treated as recent.
fn is_old_message(endpoint: &str, now: SystemTime) -> bool {
    TRAILING_SNOWFLAKE
        .find(endpoint)
        .and_then(|m| snowflake_timestamp(m.as_str()))
        .and_then(|created| now.duration_since(created).ok())
        .is_some_and(|age| age > OLD_MESSAGE_AGE)
}

/// Creation time embedded in a snowflake id.
#[must_use]
pub fn snowflake_timestamp(id: &str) -> Option<SystemTime> {
    let id = id.parse::<u64>().ok()?;
    let millis = (id >> 22).checked_add(SNOWFLAKE_EPOCH_MS)?;
    UNIX_EPOCH.checked_add(Duration::from_millis(millis))
}
