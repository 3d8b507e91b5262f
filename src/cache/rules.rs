//! Cache rule table.
//!
//! Maps request paths to a caching policy. Rules are evaluated in a fixed
//! priority order: the bypass list first, then the short, medium, and long
//! TTL tiers, and finally the default TTL. The first matching pattern wins,
//! so tier ordering is load-bearing and must not be reordered.

use std::time::Duration;

use super::config::CacheConfig;

/// Caching decision for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never cache responses for this path.
    Bypass,
    /// Cache successful responses for the given duration.
    Ttl(Duration),
}

impl CachePolicy {
    /// Returns the TTL when the policy caches, treating a zero TTL as bypass.
    pub fn effective_ttl(self) -> Option<Duration> {
        match self {
            CachePolicy::Bypass => None,
            CachePolicy::Ttl(ttl) if ttl.is_zero() => None,
            CachePolicy::Ttl(ttl) => Some(ttl),
        }
    }
}

/// One ordered tier of path patterns sharing a TTL.
#[derive(Debug, Clone)]
struct Tier {
    patterns: Vec<String>,
    ttl: Duration,
}

/// Ordered (pattern -> policy) table, immutable after construction.
///
/// Patterns that start with `/` match as path prefixes; any other pattern
/// matches as a substring. This keeps route-family rules (`/admin/`) and
/// suffix-style rules (`-list/`) in one table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    bypass: Vec<String>,
    tiers: Vec<Tier>,
    default_ttl: Duration,
}

impl RuleTable {
    /// Build the table from resolved cache configuration, preserving the
    /// bypass -> short -> medium -> long scan order.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            bypass: config.bypass.clone(),
            tiers: vec![
                Tier {
                    patterns: config.short.patterns.clone(),
                    ttl: config.short.ttl,
                },
                Tier {
                    patterns: config.medium.patterns.clone(),
                    ttl: config.medium.ttl,
                },
                Tier {
                    patterns: config.long.patterns.clone(),
                    ttl: config.long.ttl,
                },
            ],
            default_ttl: config.default_ttl,
        }
    }

    /// Resolve the caching policy for a request path.
    pub fn resolve(&self, path: &str) -> CachePolicy {
        if self.bypass.iter().any(|pattern| matches(pattern, path)) {
            return CachePolicy::Bypass;
        }

        for tier in &self.tiers {
            if tier.patterns.iter().any(|pattern| matches(pattern, path)) {
                return CachePolicy::Ttl(tier.ttl);
            }
        }

        CachePolicy::Ttl(self.default_ttl)
    }
}

fn matches(pattern: &str, path: &str) -> bool {
    if pattern.starts_with('/') {
        path.starts_with(pattern)
    } else {
        path.contains(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RuleTable {
        RuleTable::from_config(&CacheConfig::default())
    }

    #[test]
    fn admin_paths_bypass_regardless_of_tiers() {
        assert_eq!(table().resolve("/admin/x"), CachePolicy::Bypass);
        assert_eq!(
            table().resolve("/admin/orders/order-list/"),
            CachePolicy::Bypass
        );
    }

    #[test]
    fn list_paths_resolve_to_medium_tier() {
        assert_eq!(
            table().resolve("/orders/order-list/"),
            CachePolicy::Ttl(Duration::from_secs(300))
        );
        assert_eq!(
            table().resolve("/installations/installation-list/"),
            CachePolicy::Ttl(Duration::from_secs(300))
        );
    }

    #[test]
    fn unmatched_paths_fall_back_to_default_ttl() {
        assert_eq!(
            table().resolve("/somewhere/else"),
            CachePolicy::Ttl(Duration::from_secs(120))
        );
    }

    #[test]
    fn first_matching_tier_wins() {
        // A path matching both the short tier and the medium tier must take
        // the short tier, which is scanned first.
        let config = CacheConfig {
            short: super::super::config::TierConfig {
                ttl: Duration::from_secs(60),
                patterns: vec!["-list/".to_string()],
            },
            ..CacheConfig::default()
        };
        let table = RuleTable::from_config(&config);
        assert_eq!(
            table.resolve("/orders/order-list/"),
            CachePolicy::Ttl(Duration::from_secs(60))
        );
    }

    #[test]
    fn zero_ttl_resolves_to_no_caching() {
        assert_eq!(CachePolicy::Ttl(Duration::ZERO).effective_ttl(), None);
        assert_eq!(CachePolicy::Bypass.effective_ttl(), None);
        assert_eq!(
            CachePolicy::Ttl(Duration::from_secs(120)).effective_ttl(),
            Some(Duration::from_secs(120))
        );
    }
}
