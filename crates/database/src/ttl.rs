//! Lease TTL resolution

use std::time::Duration;

/// Source of the system-wide lease bounds.
pub trait SystemView: Send + Sync {
    /// TTL used when the role sets none.
    fn default_lease_ttl(&self) -> Duration;

    /// Ceiling applied to every lease.
    fn max_lease_ttl(&self) -> Duration;
}

/// Effective TTL and ceiling for one lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTtl {
    /// TTL the lease is issued with
    pub ttl: Duration,
    /// Ceiling the lease may be renewed up to
    pub max_ttl: Duration,
}

/// Clamp role-level TTLs against the system bounds.
///
/// A zero role value means "unset". The role's max only narrows the system
/// max, it never widens it, and the default is then clamped to that max.
pub fn resolve(role_default: Duration, role_max: Duration, system: &dyn SystemView) -> ResolvedTtl {
    let mut ttl = if role_default.is_zero() {
        system.default_lease_ttl()
    } else {
        role_default
    };

    let system_max = system.max_lease_ttl();
    let max_ttl = if !role_max.is_zero() && role_max < system_max {
        role_max
    } else {
        system_max
    };

    if ttl > max_ttl {
        ttl = max_ttl;
    }

    ResolvedTtl { ttl, max_ttl }
}
