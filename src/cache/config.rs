//! Cache configuration.
//!
//! Controls the response cache via `scudo.toml` (`[cache]` section). Tier
//! pattern lists and TTLs feed the [`super::rules::RuleTable`]; the limits
//! bound the in-process store.

use std::num::NonZeroUsize;
use std::time::Duration;

// Default values for cache configuration
const DEFAULT_RESPONSE_LIMIT: usize = 512;
const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const DEFAULT_TTL_SECS: u64 = 120;
const DEFAULT_SHORT_TTL_SECS: u64 = 60;
const DEFAULT_MEDIUM_TTL_SECS: u64 = 300;
const DEFAULT_LONG_TTL_SECS: u64 = 3600;

/// One TTL tier: a duration shared by an ordered list of path patterns.
#[derive(Debug, Clone)]
pub struct TierConfig {
    pub ttl: Duration,
    pub patterns: Vec<String>,
}

/// Resolved response-cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable the response cache stage. When off, every request passes
    /// straight through to the handler.
    pub enabled: bool,
    /// Maximum cached responses held by the in-process store.
    pub response_limit: usize,
    /// Responses with bodies larger than this are served but never stored.
    pub body_limit_bytes: usize,
    /// TTL applied when no tier pattern matches.
    pub default_ttl: Duration,
    /// Paths that are never cached, scanned before any tier.
    pub bypass: Vec<String>,
    pub short: TierConfig,
    pub medium: TierConfig,
    pub long: TierConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            response_limit: DEFAULT_RESPONSE_LIMIT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            bypass: vec![
                "/admin/".to_string(),
                "/login/".to_string(),
                "/logout/".to_string(),
            ],
            short: TierConfig {
                ttl: Duration::from_secs(DEFAULT_SHORT_TTL_SECS),
                patterns: vec!["/dashboard/".to_string(), "/notifications/".to_string()],
            },
            medium: TierConfig {
                ttl: Duration::from_secs(DEFAULT_MEDIUM_TTL_SECS),
                patterns: vec!["-list/".to_string(), "/reports/".to_string()],
            },
            long: TierConfig {
                ttl: Duration::from_secs(DEFAULT_LONG_TTL_SECS),
                patterns: vec!["/help/".to_string(), "/pages/".to_string()],
            },
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            response_limit: settings.response_limit,
            body_limit_bytes: settings.body_limit_bytes,
            default_ttl: settings.default_ttl,
            bypass: settings.bypass.clone(),
            short: TierConfig {
                ttl: settings.short_ttl,
                patterns: settings.short_paths.clone(),
            },
            medium: TierConfig {
                ttl: settings.medium_ttl,
                patterns: settings.medium_paths.clone(),
            },
            long: TierConfig {
                ttl: settings.long_ttl,
                patterns: settings.long_paths.clone(),
            },
        }
    }
}

impl CacheConfig {
    /// Returns the response limit as NonZeroUsize, clamping to 1 if zero.
    pub fn response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.response_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.response_limit, 512);
        assert_eq!(config.body_limit_bytes, 1024 * 1024);
        assert_eq!(config.default_ttl, Duration::from_secs(120));
        assert_eq!(config.short.ttl, Duration::from_secs(60));
        assert_eq!(config.medium.ttl, Duration::from_secs(300));
        assert_eq!(config.long.ttl, Duration::from_secs(3600));
        assert!(config.bypass.iter().any(|p| p == "/admin/"));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            response_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.response_limit_non_zero().get(), 1);
    }
}
