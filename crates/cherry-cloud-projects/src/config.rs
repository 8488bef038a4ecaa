//! Provider configuration
//!
//! Passed explicitly to the provider at construction. Nothing here is read
//! from global state after construction.

use cherry_cloud::{CloudError, PollConfig, ReplacePolicy, Result, RetryConfig};
use std::time::Duration;

/// Default Cherry Servers API endpoint
pub const DEFAULT_API_URL: &str = "https://api.cherryservers.com/v1";

/// API token; overrides a token passed explicitly
pub const TOKEN_ENV: &str = "CHERRY_AUTH_TOKEN";
pub const API_URL_ENV: &str = "CHERRY_API_URL";
pub const REPLACE_POLICY_ENV: &str = "CHERRY_REPLACE_POLICY";

/// Configuration for the Project provider
#[derive(Clone)]
pub struct ProviderConfig {
    /// Cherry Servers API token
    pub token: String,

    /// API base URL, without trailing slash
    pub api_url: String,

    pub user_agent: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// How `team` changes are carried out
    pub replace_policy: ReplacePolicy,

    /// Retry policy for transient API failures
    pub retry: RetryConfig,

    /// Polling used while waiting for BGP ASN assignment
    pub poll: PollConfig,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .field("replace_policy", &self.replace_policy)
            .field("retry", &self.retry)
            .field("poll", &self.poll)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: format!("cherry-provider/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
            replace_policy: ReplacePolicy::default(),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }

    /// Create ProviderConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self::new(String::new()).with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHERRY_AUTH_TOKEN`, `CHERRY_API_URL` and `CHERRY_REPLACE_POLICY`
    /// on top of the current values.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            self.token = token;
        }
        if let Ok(url) = std::env::var(API_URL_ENV) {
            self.api_url = url;
        }
        if let Ok(policy) = std::env::var(REPLACE_POLICY_ENV) {
            self.replace_policy = policy.parse()?;
        }
        Ok(self)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_replace_policy(mut self, policy: ReplacePolicy) -> Self {
        self.replace_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "API token is not set (use the token setting or {})",
                TOKEN_ENV
            )));
        }
        reqwest::Url::parse(&self.api_url).map_err(|e| {
            CloudError::InvalidConfig(format!("invalid API URL '{}': {}", self.api_url, e))
        })?;
        if self.poll.min_jitter > self.poll.max_jitter {
            return Err(CloudError::InvalidConfig(
                "poll min jitter can't be bigger than max jitter".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let config = ProviderConfig::new("super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_env_token_overrides_explicit_token() {
        temp_env::with_vars(
            [
                (TOKEN_ENV, Some("from-env")),
                (API_URL_ENV, None),
                (REPLACE_POLICY_ENV, Some("delete-before-create")),
            ],
            || {
                let config = ProviderConfig::new("explicit")
                    .with_env_overrides()
                    .unwrap();
                assert_eq!(config.token, "from-env");
                assert_eq!(config.api_url, DEFAULT_API_URL);
                assert_eq!(config.replace_policy, ReplacePolicy::DeleteBeforeCreate);
            },
        );
    }

    #[test]
    fn test_from_env_requires_token() {
        temp_env::with_vars(
            [
                (TOKEN_ENV, None::<&str>),
                (API_URL_ENV, None),
                (REPLACE_POLICY_ENV, None),
            ],
            || {
                let err = ProviderConfig::from_env().unwrap_err();
                assert!(matches!(err, CloudError::InvalidConfig(_)));
            },
        );
    }

    #[test]
    fn test_invalid_replace_policy_env() {
        temp_env::with_vars(
            [
                (TOKEN_ENV, Some("t")),
                (REPLACE_POLICY_ENV, Some("whenever")),
            ],
            || {
                assert!(ProviderConfig::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = ProviderConfig::new("token").with_api_url("not a url");
        assert!(config.validate().is_err());

        let config = ProviderConfig::new("token").with_api_url("http://127.0.0.1:8080/v1/");
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url(), "http://127.0.0.1:8080/v1");
    }
}
