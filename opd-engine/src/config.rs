//! Engine configuration.

use std::time::Duration;

/// Tunables for the allocation coordinator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on waiting for a resource's lock. `None` waits forever.
    /// The critical section itself is never interrupted.
    pub operation_timeout: Option<Duration>,
}

impl EngineConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Some(Self::DEFAULT_TIMEOUT),
        }
    }
}
