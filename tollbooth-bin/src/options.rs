use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::Parser;
use const_format::{concatcp, formatcp};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::{fs, path::PathBuf, time::Duration};
use tollbooth_lib::ratelimit::{DEFAULT_OFFSET, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
use tollbooth_lib::{
    DEFAULT_API_URL, DEFAULT_API_VERSION, DEFAULT_USER_AGENT, File, Method, QueryValue,
    RequestOptions, TokenPrefix,
};

pub(crate) const TOLLBOOTH_CONFIG_FILE: &str = "tollbooth.toml";

// this exists because clap requires `&str` type values for defaults
// whereas serde expects owned `String` types
const API_VERSION_STR: &str = concatcp!(DEFAULT_API_VERSION);
const RETRIES_STR: &str = concatcp!(DEFAULT_RETRIES);
const TIMEOUT_STR: &str = "15s";
const OFFSET_STR: &str = "50ms";
const TOKEN_PREFIX_STR: &str = "bot";
// We use a custom help message here because we want to show the default
// value of the config file, but also be able to check if the user has
// provided a custom value. If they didn't, we won't throw an error if
// the file doesn't exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    TOLLBOOTH_CONFIG_FILE,
);

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    api_url: String = DEFAULT_API_URL.to_string();
    api_version: u8 = DEFAULT_API_VERSION;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    timeout: Duration = DEFAULT_TIMEOUT;
    retries: u64 = DEFAULT_RETRIES;
    offset: Duration = DEFAULT_OFFSET;
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a header given as `Header-Name: Header-Value`.
///
/// If the header contains multiple colons, the part after the first colon is
/// considered the value.
fn parse_header_pair(header: &str) -> Result<(String, String)> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| anyhow!("Header value must be of the form `key: value`"))?;
    let name = name.trim();
    HeaderName::from_str(name).map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse a query parameter given as `key=value`
fn parse_query_pair(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(anyhow!("Query parameter must be of the form `key=value`")),
    }
}

pub(crate) trait HeaderMapExt {
    /// Convert header pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value for '{name}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// Send a single request to a rate limited REST API.
///
/// The request waits for any rate limit the server reports, is replayed
/// when the server answers 429 and is retried on timeouts and server errors.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct TollboothOptions {
    /// HTTP method of the request (GET, POST, PUT, PATCH or DELETE)
    pub(crate) method: Method,

    /// Endpoint relative to the versioned API root, e.g. `/users/@me`
    pub(crate) endpoint: String,

    #[clap(flatten)]
    pub(crate) request: RequestArgs,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

/// What to send. Only available on the command line.
#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct RequestArgs {
    /// Send the request without the `Authorization` header
    #[arg(long)]
    pub(crate) no_auth: bool,

    /// JSON body of the request
    #[arg(short, long, value_name = "JSON")]
    pub(crate) body: Option<String>,

    /// Query parameter, can be given multiple times
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_query_pair)]
    pub(crate) query: Vec<(String, String)>,

    /// Attach a file, can be given multiple times.
    /// A JSON body is sent along as `payload_json`.
    #[arg(short, long, value_name = "PATH")]
    pub(crate) file: Vec<PathBuf>,

    /// Reason shown in the audit log
    #[arg(long)]
    pub(crate) reason: Option<String>,
}

impl RequestArgs {
    /// Read attached files and parse the body into request options
    pub(crate) fn request_options(&self) -> Result<RequestOptions> {
        let body = self
            .body
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .context("Cannot parse request body as JSON")?;

        let files = self
            .file
            .iter()
            .map(|path| {
                let data = fs::read(path)
                    .with_context(|| format!("Cannot read file `{}`", path.display()))?;
                let name = path
                    .file_name()
                    .map_or_else(|| "file".into(), |name| name.to_string_lossy());
                Ok(File::new(name, data))
            })
            .collect::<Result<Vec<_>>>()?;

        let query = self
            .query
            .iter()
            .map(|(key, value)| (key.clone(), QueryValue::from(value.as_str())))
            .collect();

        Ok(RequestOptions {
            authorize: !self.no_auth,
            audit_log_reason: self.reason.clone(),
            query,
            body,
            files,
            headers: HeaderMap::new(),
        })
    }
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// How to reach the API. Can also be given in a configuration file.
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// API token
    #[arg(long, env = "TOLLBOOTH_TOKEN", hide_env_values = true)]
    #[serde(default)]
    pub(crate) token: Option<SecretString>,

    /// Scheme of the `Authorization` header (bot, bearer or none)
    #[arg(long, default_value = TOKEN_PREFIX_STR)]
    #[serde(default)]
    pub(crate) token_prefix: TokenPrefix,

    /// Base URL of the API, without version
    #[arg(long, default_value = DEFAULT_API_URL)]
    #[serde(default = "api_url")]
    pub(crate) api_url: String,

    /// API version
    #[arg(long, default_value = API_VERSION_STR)]
    #[serde(default = "api_version")]
    pub(crate) api_version: u8,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Maximum duration of a single attempt, e.g. `15s` or `500ms`
    #[arg(long, default_value = TIMEOUT_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "timeout", with = "humantime_serde")]
    pub(crate) timeout: Duration,

    /// How often timeouts and server errors are retried
    #[arg(long, default_value = RETRIES_STR)]
    #[serde(default = "retries")]
    pub(crate) retries: u64,

    /// Safety margin added to every wait the server asks for
    #[arg(long, default_value = OFFSET_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "offset", with = "humantime_serde")]
    pub(crate) offset: Duration,

    /// Custom request header, e.g. `-H 'X-Super-Properties: abc'`.
    /// Can be given multiple times.
    #[arg(short = 'H', long = "header", value_parser = parse_header_pair)]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Overwrites existing headers in `self` with the values from `other`.
    fn merge_headers(&mut self, other: &[(String, String)]) {
        let self_map = self.header.iter().cloned().collect::<HashMap<_, _>>();
        let other_map = other.iter().cloned().collect::<HashMap<_, _>>();

        // Merge the two maps, with `other` taking precedence
        let merged_map: HashMap<_, _> = self_map.into_iter().chain(other_map).collect();

        self.header = merged_map.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        self.merge_headers(&toml.header);

        // A token given on the command line or in the environment wins.
        // This is outside of fold_in! because SecretBox doesn't implement Eq.
        if self.token.is_none() && toml.token.is_some() {
            self.token = toml.token;
        }

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,
                ..token,

                // Keys with defaults to assign
                api_url: DEFAULT_API_URL,
                api_version: DEFAULT_API_VERSION,
                offset: DEFAULT_OFFSET,
                retries: DEFAULT_RETRIES,
                timeout: DEFAULT_TIMEOUT,
                token_prefix: TokenPrefix::Bot,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
            }
        }
    }
}
