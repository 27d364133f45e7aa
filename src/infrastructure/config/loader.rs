//! Hierarchical configuration loading (§6): built-in defaults, overridden by
//! `.orchestrator/config.yaml`, then `.orchestrator/local.yaml`, then
//! `ORCHESTRATOR_`-prefixed environment variables.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Merges defaults, `.orchestrator/config.yaml`, `.orchestrator/local.yaml`,
    /// and `ORCHESTRATOR_`-prefixed env vars (`__` as the nesting separator),
    /// then validates the result.
    pub fn load() -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".orchestrator/config.yaml"))
            .merge(Yaml::file(".orchestrator/local.yaml"))
            .merge(Env::prefixed("ORCHESTRATOR_").split("__"))
            .extract()?;

        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".to_string()));
    }
    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        return Err(ConfigError::Invalid("retry.base_delay_ms must not exceed retry.max_delay_ms".to_string()));
    }
    if !(0.0..=1.0).contains(&config.retry.jitter_fraction) {
        return Err(ConfigError::Invalid("retry.jitter_fraction must be within [0.0, 1.0]".to_string()));
    }
    if config.breaker.threshold == 0 {
        return Err(ConfigError::Invalid("breaker.threshold must be at least 1".to_string()));
    }
    if config.checkpoint_path.trim().is_empty() {
        return Err(ConfigError::Invalid("checkpoint_path must not be empty".to_string()));
    }
    if config.ledger_sink.trim().is_empty() {
        return Err(ConfigError::Invalid("ledger_sink must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn rejects_zero_max_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_inverted_delay_bounds() {
        let mut config = Config::default();
        config.retry.base_delay_ms = 100;
        config.retry.max_delay_ms = 50;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_out_of_range_jitter() {
        let mut config = Config::default();
        config.retry.jitter_fraction = 1.5;
        assert!(validate(&config).is_err());
    }
}
