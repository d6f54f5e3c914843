//! Configuration module for the HTML rewrite filter
//!
//! Configuration is loaded from Envoy plugin configuration (JSON),
//! NOT from external files. A bare boolean is still accepted as the
//! legacy shorthand for `html_only`.

use std::time::Duration;

use serde::Deserialize;

/// Middleware configuration, fixed per middleware instance
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Only rewrite `text/html` responses and skip `.js` / `.css` URLs
    #[serde(default, alias = "htmlOnly")]
    pub html_only: bool,

    /// Completion ticks before a draining response is force-finalized
    #[serde(default = "default_max_timeout", alias = "maxTimeout")]
    pub max_timeout: u32,

    /// Milliseconds between completion ticks
    #[serde(default = "default_poll_interval_ms", alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
}

fn default_max_timeout() -> u32 {
    6000 // 6000 ticks * 10ms = 60 seconds
}

fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            html_only: false,
            max_timeout: default_max_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Accepted shapes of the options value
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum RewriteOptions {
    /// Legacy shorthand for `html_only`
    HtmlOnly(bool),
    Config(RewriteConfig),
}

impl From<bool> for RewriteConfig {
    fn from(html_only: bool) -> Self {
        Self {
            html_only,
            ..Default::default()
        }
    }
}

impl From<RewriteOptions> for RewriteConfig {
    fn from(options: RewriteOptions) -> Self {
        match options {
            RewriteOptions::HtmlOnly(html_only) => html_only.into(),
            RewriteOptions::Config(config) => config,
        }
    }
}

impl RewriteConfig {
    /// Parse configuration from JSON bytes (from Envoy plugin configuration)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config_str = std::str::from_utf8(bytes)
            .map_err(|e| ConfigError::InvalidUtf8(e.to_string()))?;

        serde_json::from_str::<RewriteOptions>(config_str)
            .map(RewriteConfig::from)
            .map_err(|e| ConfigError::InvalidJson(e.to_string()))
    }

    /// Completion budget derived from this configuration
    pub fn budget(&self) -> CompletionBudget {
        CompletionBudget {
            poll_interval_ms: self.poll_interval_ms,
            max_polls: self.max_timeout,
        }
    }
}

/// Polling budget for draining responses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletionBudget {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl CompletionBudget {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest time a response may stay draining
    pub fn ceiling(&self) -> Duration {
        self.poll_interval() * self.max_polls
    }
}

impl Default for CompletionBudget {
    fn default() -> Self {
        RewriteConfig::default().budget()
    }
}

/// Configuration parsing errors
#[derive(Debug)]
pub enum ConfigError {
    InvalidUtf8(String),
    InvalidJson(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidUtf8(e) => write!(f, "Invalid UTF-8: {}", e),
            ConfigError::InvalidJson(e) => write!(f, "Invalid JSON: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RewriteConfig::default();
        assert!(!config.html_only);
        assert_eq!(config.max_timeout, 6000);
        assert_eq!(config.budget().ceiling(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_config() {
        let json = r#"{"html_only": true, "max_timeout": 3}"#;
        let config = RewriteConfig::from_bytes(json.as_bytes()).unwrap();
        assert!(config.html_only);
        assert_eq!(config.max_timeout, 3);
        assert_eq!(config.poll_interval_ms, 10);
    }

    #[test]
    fn test_parse_camel_case_aliases() {
        let json = r#"{"htmlOnly": true, "maxTimeout": 50, "pollIntervalMs": 5}"#;
        let config = RewriteConfig::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(
            config.budget(),
            CompletionBudget { poll_interval_ms: 5, max_polls: 50 }
        );
        assert!(config.html_only);
    }

    #[test]
    fn test_legacy_boolean() {
        let config = RewriteConfig::from_bytes(b"true").unwrap();
        assert!(config.html_only);
        assert_eq!(config.max_timeout, 6000);

        assert_eq!(RewriteConfig::from(false), RewriteConfig::default());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = RewriteConfig::from_bytes(b"{}").unwrap();
        assert_eq!(config, RewriteConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            RewriteConfig::from_bytes(b"\"yes\""),
            Err(ConfigError::InvalidJson(_))
        ));
        assert!(matches!(
            RewriteConfig::from_bytes(&[0xff, 0xfe]),
            Err(ConfigError::InvalidUtf8(_))
        ));
    }
}
