use std::time::Duration;

use crate::error::EngineError;

/// Largest batch any observed source accepts in one submission.
pub const MAX_BATCH_SIZE_LIMIT: usize = 100;

/// Policy applied when a fetched document carries the throttle marker.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    /// Wait out the block and re-fetch the same job instead of failing it.
    pub auto_resume: bool,

    /// How long one throttle wait lasts.
    pub wait: Duration,

    /// Upper bound on throttle retries per job. The original design
    /// retried without bound; this caps worst-case runtime.
    pub max_retries: u32,
}

impl Default for ThrottlePolicy {
    /// Fail fast on throttle; 10 minute wait and 3 retries when resumed.
    fn default() -> Self {
        Self {
            auto_resume: false,
            wait: Duration::from_secs(10 * 60),
            max_retries: 3,
        }
    }
}

impl ThrottlePolicy {
    pub fn with_auto_resume(mut self, auto_resume: bool) -> Self {
        self.auto_resume = auto_resume;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }
}

/// Configuration for one engine instance.
///
/// Validated at engine construction; a bad value is a [`EngineError::Config`]
/// raised before any job runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Width of the worker pool.
    pub max_workers: usize,

    /// Identifiers per dispatched job. `1` degenerates to one job per
    /// identifier for sources without batch submission.
    pub max_batch_size: usize,

    pub throttle: ThrottlePolicy,

    /// When true, an unrecoverable rate-limit failure cancels the
    /// remaining jobs and fails the whole run. Off by default so failure
    /// isolation stays uniform.
    pub abort_on_rate_limit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_batch_size: 1,
            throttle: ThrottlePolicy::default(),
            abort_on_rate_limit: false,
        }
    }
}

impl EngineConfig {
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottlePolicy) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_abort_on_rate_limit(mut self, abort: bool) -> Self {
        self.abort_on_rate_limit = abort;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_workers == 0 {
            return Err(EngineError::Config(
                "max_workers must be greater than zero".into(),
            ));
        }
        if self.max_batch_size < 1 || self.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return Err(EngineError::Config(format!(
                "max_batch_size must be in 1..={MAX_BATCH_SIZE_LIMIT}, got {}",
                self.max_batch_size
            )));
        }
        if self.throttle.wait.is_zero() {
            return Err(EngineError::Config(
                "throttle wait must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let err = EngineConfig::default()
            .with_max_workers(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_rejects_batch_size_out_of_range() {
        for size in [0, 101, 500] {
            let result = EngineConfig::default().with_max_batch_size(size).validate();
            assert!(result.is_err(), "batch size {size} should be rejected");
        }
        for size in [1, 50, 100] {
            let result = EngineConfig::default().with_max_batch_size(size).validate();
            assert!(result.is_ok(), "batch size {size} should be accepted");
        }
    }

    #[test]
    fn test_rejects_zero_wait() {
        let err = EngineConfig::default()
            .with_throttle(ThrottlePolicy::default().with_wait(Duration::ZERO))
            .validate()
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
