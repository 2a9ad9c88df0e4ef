//! Per-executor state shared by every join it runs.

use fframe_error::Result;
use fframe_types::Schema;

use crate::condition::ConditionCache;
use crate::config::ExecutorConfig;
use crate::descriptor::JoinDescriptor;
use crate::metrics::JoinMetrics;
use crate::plan::BoundJoin;

/// Configuration, the compiled-condition cache and join counters.
///
/// One context per worker; it is `Send + Sync` and may be shared by
/// concurrent joins on that worker.
#[derive(Debug)]
pub struct ExecutorContext {
    config: ExecutorConfig,
    conditions: ConditionCache,
    metrics: JoinMetrics,
}

impl ExecutorContext {
    /// # Errors
    ///
    /// Returns a configuration error for an invalid configuration.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let conditions = ConditionCache::new(config.condition_cache)?;
        Ok(Self {
            config,
            conditions,
            metrics: JoinMetrics::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    #[must_use]
    pub fn conditions(&self) -> &ConditionCache {
        &self.conditions
    }

    #[must_use]
    pub fn metrics(&self) -> &JoinMetrics {
        &self.metrics
    }

    /// Validate a descriptor against two input schemas.
    ///
    /// # Errors
    ///
    /// See [`BoundJoin::bind`].
    pub fn bind(
        &self,
        descriptor: &JoinDescriptor,
        left: &Schema,
        right: &Schema,
    ) -> Result<BoundJoin> {
        BoundJoin::bind(
            descriptor,
            left,
            right,
            &self.conditions,
            &self.config.default_suffixes,
        )
    }
}

impl Default for ExecutorContext {
    fn default() -> Self {
        Self {
            config: ExecutorConfig::default(),
            conditions: ConditionCache::unbounded(),
            metrics: JoinMetrics::default(),
        }
    }
}
