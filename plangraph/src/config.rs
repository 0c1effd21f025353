//! Engine configuration.
//!
//! Loaded from JSON with every field optional, then overridden from
//! `PLANGRAPH_*` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{GraphError, GraphResult};
use crate::utils::RetryPolicy;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Hard ceiling on the batch size of streamed summary reads.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Configuration shared by the handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TTL of cached detail graphs, in seconds.
    #[serde(default = "default_graph_cache_ttl")]
    pub graph_cache_ttl_secs: u64,
    /// TTL of event log rows, in seconds.
    #[serde(default = "default_event_log_ttl")]
    pub event_log_ttl_secs: u64,
    /// Largest batch size a streamed summary read may ask for.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Retry policy for bulk summary deletion.
    #[serde(default)]
    pub summary_delete_retry: RetryPolicy,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_graph_cache_ttl() -> u64 {
    10 * DAY_SECS
}

fn default_event_log_ttl() -> u64 {
    14 * DAY_SECS
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph_cache_ttl_secs: default_graph_cache_ttl(),
            event_log_ttl_secs: default_event_log_ttl(),
            max_batch_size: default_max_batch_size(),
            summary_delete_retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Serialization`] for malformed JSON and
    /// [`GraphError::Config`] for out-of-range values.
    pub fn from_json(json: &str) -> GraphResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    /// Defaults overridden from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] when a variable does not parse.
    pub fn from_env() -> GraphResult<Self> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `PLANGRAPH_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] when a variable does not parse or the
    /// result is out of range.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> GraphResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PLANGRAPH_GRAPH_CACHE_TTL_SECS") {
            self.graph_cache_ttl_secs = parse_var("PLANGRAPH_GRAPH_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("PLANGRAPH_EVENT_LOG_TTL_SECS") {
            self.event_log_ttl_secs = parse_var("PLANGRAPH_EVENT_LOG_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("PLANGRAPH_MAX_BATCH_SIZE") {
            self.max_batch_size = parse_var("PLANGRAPH_MAX_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("PLANGRAPH_DELETE_MAX_ATTEMPTS") {
            self.summary_delete_retry.max_attempts = parse_var("PLANGRAPH_DELETE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("PLANGRAPH_LOG") {
            self.logging.filter = v;
        }
        if let Some(v) = lookup("PLANGRAPH_LOG_JSON") {
            self.logging.json = parse_var("PLANGRAPH_LOG_JSON", &v)?;
        }
        self.validate()
    }

    /// Sets the graph cache TTL.
    #[must_use]
    pub fn with_graph_cache_ttl(mut self, ttl: Duration) -> Self {
        self.graph_cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Sets the event log TTL.
    #[must_use]
    pub fn with_event_log_ttl(mut self, ttl: Duration) -> Self {
        self.event_log_ttl_secs = ttl.as_secs();
        self
    }

    /// Sets the batch size ceiling.
    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Sets the summary deletion retry policy.
    #[must_use]
    pub fn with_summary_delete_retry(mut self, policy: RetryPolicy) -> Self {
        self.summary_delete_retry = policy;
        self
    }

    /// Graph cache TTL as a duration.
    #[must_use]
    pub fn graph_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.graph_cache_ttl_secs)
    }

    /// Event log TTL as a duration.
    #[must_use]
    pub fn event_log_ttl(&self) -> Duration {
        Duration::from_secs(self.event_log_ttl_secs)
    }

    fn validate(self) -> GraphResult<Self> {
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE {
            return Err(GraphError::Config(format!(
                "max_batch_size must be in 1..={MAX_BATCH_SIZE}, got {}",
                self.max_batch_size
            )));
        }
        if self.graph_cache_ttl_secs == 0 || self.event_log_ttl_secs == 0 {
            return Err(GraphError::Config("TTLs must be positive".to_string()));
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> GraphResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GraphError::Config(format!("{name}: cannot parse '{value}'")))
}

/// Logging settings consumed by [`init_logging`](crate::logging::init_logging).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "plangraph=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}
