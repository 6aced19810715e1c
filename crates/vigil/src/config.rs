//! Run configuration.
//!
//! Layering, lowest to highest precedence: [`VigilConfig::default`], a YAML
//! file ([`VigilConfig::from_file`]), `VIGIL_*` environment variables
//! ([`VigilConfig::apply_env`]), then whatever the caller sets last
//! (typically command-line flags).

use crate::poll::{Backoff, PollConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::result::{VigilError, VigilResult};
use crate::selector::OpenValueMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Default budget for `visit` to reach the load event
pub const DEFAULT_PAGE_LOAD_TIMEOUT_MS: u64 = 60_000;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "vigil.yaml";

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Prefix for relative `visit` URLs
    pub base_url: Option<String>,
    /// Budget for queries, actionability and assertions
    pub default_command_timeout_ms: u64,
    /// Pause between poll attempts
    pub poll_interval_ms: u64,
    /// Budget for `visit` to reach the load event
    pub page_load_timeout_ms: u64,
    /// Poll interval growth
    pub backoff: Backoff,
    /// Treatment of unterminated quoted attribute values in selectors
    pub open_attribute_values: OpenValueMode,
    /// Concurrent sessions
    pub workers: usize,
    /// Stop after the first failed case
    pub fail_fast: bool,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_command_timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            page_load_timeout_ms: DEFAULT_PAGE_LOAD_TIMEOUT_MS,
            backoff: Backoff::Fixed,
            open_attribute_values: OpenValueMode::Prefix,
            workers: 1,
            fail_fast: false,
        }
    }
}

impl VigilConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the command timeout
    #[must_use]
    pub const fn with_command_timeout_ms(mut self, ms: u64) -> Self {
        self.default_command_timeout_ms = ms;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the page load timeout
    #[must_use]
    pub const fn with_page_load_timeout_ms(mut self, ms: u64) -> Self {
        self.page_load_timeout_ms = ms;
        self
    }

    /// Set the backoff policy
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the open attribute value mode
    #[must_use]
    pub const fn with_open_attribute_values(mut self, mode: OpenValueMode) -> Self {
        self.open_attribute_values = mode;
        self
    }

    /// Set the number of concurrent sessions
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Stop after the first failure
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Parse from YAML; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed.
    pub fn from_yaml(yaml: &str) -> VigilResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VigilError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an unparsable value.
    pub fn from_env() -> VigilResult<Self> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Override fields from `VIGIL_*` variables found through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an unparsable value.
    pub fn apply_env<F>(mut self, lookup: F) -> VigilResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VIGIL_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(ms) = parse_var(&lookup, "VIGIL_COMMAND_TIMEOUT_MS")? {
            self.default_command_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "VIGIL_POLL_INTERVAL_MS")? {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "VIGIL_PAGE_LOAD_TIMEOUT_MS")? {
            self.page_load_timeout_ms = ms;
        }
        if let Some(workers) = parse_var(&lookup, "VIGIL_WORKERS")? {
            self.workers = workers;
        }
        if let Some(fail_fast) = parse_var(&lookup, "VIGIL_FAIL_FAST")? {
            self.fail_fast = fail_fast;
        }
        Ok(self)
    }

    /// Check invariants.
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid field.
    pub fn validate(&self) -> VigilResult<()> {
        if self.default_command_timeout_ms == 0 {
            return Err(VigilError::config("default_command_timeout_ms must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(VigilError::config("poll_interval_ms must be > 0"));
        }
        if self.page_load_timeout_ms == 0 {
            return Err(VigilError::config("page_load_timeout_ms must be > 0"));
        }
        if self.workers == 0 {
            return Err(VigilError::config("workers must be at least 1"));
        }
        if let Backoff::Exponential { factor, .. } = self.backoff {
            if !factor.is_finite() || factor < 1.0 {
                return Err(VigilError::config(
                    "backoff factor must be a finite number >= 1.0",
                ));
            }
        }
        if let Some(base) = &self.base_url {
            if !has_scheme(base) {
                return Err(VigilError::config(format!(
                    "base_url `{base}` must be absolute (e.g. http://localhost:8080)"
                )));
            }
        }
        Ok(())
    }

    /// Poll settings for commands, optionally with a per-step timeout
    #[must_use]
    pub fn command_poll(&self, timeout_ms: Option<u64>) -> PollConfig {
        PollConfig::new(timeout_ms.unwrap_or(self.default_command_timeout_ms))
            .with_interval_ms(self.poll_interval_ms)
            .with_backoff(self.backoff)
    }

    /// Poll settings for page loads, optionally with a per-step timeout
    #[must_use]
    pub fn page_load_poll(&self, timeout_ms: Option<u64>) -> PollConfig {
        PollConfig::new(timeout_ms.unwrap_or(self.page_load_timeout_ms))
            .with_interval_ms(self.poll_interval_ms)
            .with_backoff(self.backoff)
    }

    /// Resolve a `visit` target against [`VigilConfig::base_url`].
    ///
    /// # Errors
    ///
    /// Returns error for a relative URL when no base URL is configured.
    pub fn resolve_url(&self, url: &str) -> VigilResult<String> {
        if has_scheme(url) {
            return Ok(url.to_string());
        }
        let base = self.base_url.as_deref().ok_or_else(|| {
            VigilError::config(format!("cannot visit relative URL `{url}` without a base_url"))
        })?;
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        ))
    }
}

fn has_scheme(url: &str) -> bool {
    if url.starts_with("about:") || url.starts_with("data:") {
        return true;
    }
    url.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn parse_var<T, F>(lookup: &F, key: &str) -> VigilResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| VigilError::config(format!("invalid {key}: `{raw}`")))
        })
        .transpose()
}
