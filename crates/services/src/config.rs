use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Tunables of the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Items drawn for a global assessment when the caller gives no count.
    pub default_global_count: u32,
    pub max_global_count: u32,
    pub history_max_limit: u32,
    /// Upper bound on one AI enrichment call.
    pub enrichment_timeout: Duration,
    /// Score in `0..=100` a topic quiz must reach to pass.
    pub topic_pass_threshold: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_global_count: 20,
            max_global_count: 100,
            history_max_limit: 50,
            enrichment_timeout: Duration::from_secs(20),
            topic_pass_threshold: 80,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `ASSESS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but unparsable, or the
    /// resulting limits contradict each other.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            default_global_count: read(&lookup, "ASSESS_DEFAULT_COUNT")?
                .unwrap_or(defaults.default_global_count),
            max_global_count: read(&lookup, "ASSESS_MAX_COUNT")?
                .unwrap_or(defaults.max_global_count),
            history_max_limit: read(&lookup, "ASSESS_HISTORY_MAX_LIMIT")?
                .unwrap_or(defaults.history_max_limit),
            enrichment_timeout: read(&lookup, "ASSESS_ENRICHMENT_TIMEOUT_SECS")?
                .map_or(defaults.enrichment_timeout, Duration::from_secs),
            topic_pass_threshold: read(&lookup, "ASSESS_TOPIC_PASS_THRESHOLD")?
                .unwrap_or(defaults.topic_pass_threshold),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_global_count == 0 || self.history_max_limit == 0 {
            return Err(ConfigError::Inconsistent(
                "count and history limits must be positive".into(),
            ));
        }
        if self.default_global_count == 0 || self.default_global_count > self.max_global_count {
            return Err(ConfigError::Inconsistent(format!(
                "default count {} must be between 1 and {}",
                self.default_global_count, self.max_global_count
            )));
        }
        if self.topic_pass_threshold > 100 {
            return Err(ConfigError::Inconsistent(format!(
                "topic pass threshold {} exceeds 100",
                self.topic_pass_threshold
            )));
        }
        Ok(())
    }
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
