//! Configuration for lifecycle handlers

use std::time::Duration;

/// Default value for the `ManagedBy` tag on AMIs this tool registers
pub const DEFAULT_MANAGED_BY_TAG: &str = "devbox-lifecycle";

/// Default number of describe attempts while waiting for an AMI to deregister
pub const DEFAULT_CLEANUP_MAX_ATTEMPTS: u32 = 12;

/// Default wait between deregistration polls
pub const DEFAULT_CLEANUP_WAIT: Duration = Duration::from_secs(5);

/// Volume type used when a snapshot's metadata does not report one
pub const DEFAULT_VOLUME_TYPE: &str = "gp3";

/// Tunables for the snapshot/AMI lifecycle.
///
/// `managed_by_tag` decides which prior AMIs this tool is allowed to clean
/// up; an AMI tagged with a different value is never deregistered.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Value of the `ManagedBy` tag identifying self-managed AMIs
    pub managed_by_tag: String,

    /// Maximum describe attempts while waiting for a deregistered AMI to vanish
    pub cleanup_max_attempts: u32,

    /// Wait between deregistration polls
    pub cleanup_wait: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            managed_by_tag: DEFAULT_MANAGED_BY_TAG.to_string(),
            cleanup_max_attempts: DEFAULT_CLEANUP_MAX_ATTEMPTS,
            cleanup_wait: DEFAULT_CLEANUP_WAIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.managed_by_tag, DEFAULT_MANAGED_BY_TAG);
        assert_eq!(config.cleanup_max_attempts, 12);
        assert_eq!(config.cleanup_wait, Duration::from_secs(5));
    }
}
