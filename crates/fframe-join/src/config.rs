//! Executor configuration.

use serde::{Deserialize, Serialize};

use fframe_error::{FrameError, Result};

use crate::condition::CachePolicy;
use crate::descriptor::DEFAULT_SUFFIXES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Eviction policy for compiled join conditions.
    pub condition_cache: CachePolicy,
    /// Initial bucket capacity of the build table; 0 sizes it to the build side.
    pub hash_table_capacity: usize,
    /// Suffixes for colliding names when a descriptor does not set its own.
    pub default_suffixes: (String, String),
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            condition_cache: CachePolicy::NeverEvict,
            hash_table_capacity: 0,
            default_suffixes: (DEFAULT_SUFFIXES.0.to_owned(), DEFAULT_SUFFIXES.1.to_owned()),
        }
    }
}

impl ExecutorConfig {
    /// Parse a TOML document; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed TOML, unknown keys, or
    /// identical suffixes.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| FrameError::configuration("executor config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns a configuration error when both suffixes are equal.
    pub fn validate(&self) -> Result<()> {
        if self.default_suffixes.0 == self.default_suffixes.1 {
            return Err(FrameError::configuration(
                format!("default_suffixes = {:?}", self.default_suffixes),
                "left and right suffixes must differ",
            ));
        }
        Ok(())
    }
}
