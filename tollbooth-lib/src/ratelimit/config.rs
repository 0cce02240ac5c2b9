use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time a single attempt may take before it is aborted
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default number of extra attempts after a timeout or server error
pub const DEFAULT_RETRIES: u64 = 3;

/// Default safety margin added to every wait the server asks for
pub const DEFAULT_OFFSET: Duration = Duration::from_millis(50);

/// Timing and retry behavior of the request dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    /// Maximum duration of a single attempt
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// How often a timed out or failed (5xx) request is retried.
    /// Rate limited (429) requests are replayed without counting against this.
    #[serde(default = "default_retries")]
    pub retries: u64,

    /// Added to every reset and retry-after duration reported by the server,
    /// to absorb clock skew and latency
    #[serde(default = "default_offset", with = "humantime_serde")]
    pub offset: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retries: default_retries(),
            offset: default_offset(),
        }
    }
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_retries() -> u64 {
    DEFAULT_RETRIES
}

const fn default_offset() -> Duration {
    DEFAULT_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handler_config() {
        let config = HandlerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.retries, 3);
        assert_eq!(config.offset, Duration::from_millis(50));
    }

    #[test]
    fn test_config_serialization() {
        let config = HandlerConfig {
            timeout: Duration::from_secs(3),
            retries: 5,
            offset: Duration::from_millis(200),
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: HandlerConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: HandlerConfig = toml::from_str(r#"timeout = "2s 500ms""#).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.offset, DEFAULT_OFFSET);

        assert!(toml::from_str::<HandlerConfig>("concurrency = 4").is_err());
    }
}
