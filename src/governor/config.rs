//! Governor thresholds.

use std::time::Duration;

// Default values for governor configuration
const DEFAULT_WARNING_CONNECTIONS: i64 = 50;
const DEFAULT_EMERGENCY_CONNECTIONS: i64 = 80;
const DEFAULT_IDLE_TTL_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Resolved connection-governor configuration.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Connection count that logs a warning during the periodic sweep.
    pub warning_connections: i64,
    /// Connection count that triggers the emergency sweep.
    pub emergency_connections: i64,
    /// Idle duration after which the periodic sweep terminates a session.
    pub idle_ttl: Duration,
    /// Minimum spacing between periodic sweeps.
    pub sweep_interval: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            warning_connections: DEFAULT_WARNING_CONNECTIONS,
            emergency_connections: DEFAULT_EMERGENCY_CONNECTIONS,
            idle_ttl: Duration::from_secs(DEFAULT_IDLE_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::GovernorSettings> for GovernorConfig {
    fn from(settings: &crate::config::GovernorSettings) -> Self {
        Self {
            warning_connections: settings.warning_connections,
            emergency_connections: settings.emergency_connections,
            idle_ttl: settings.idle_ttl,
            sweep_interval: settings.sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = GovernorConfig::default();
        assert_eq!(config.warning_connections, 50);
        assert_eq!(config.emergency_connections, 80);
        assert_eq!(config.idle_ttl, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }
}
