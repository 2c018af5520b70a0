//! Health reporting for the persistent storage adapter (SPEC_FULL.md §4.9),
//! modeled on the teacher's `db::health::{HealthCheck, HealthStatus, Check}`.
//!
//! Not wired to any network surface — the core has none (spec.md §1
//! Non-goals) — but a plain struct the facade can expose to an embedding
//! application.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Check {
    WalSize {
        bytes: u64,
        threshold: u64,
        healthy: bool,
    },
    CorruptionErrors {
        count: u64,
        healthy: bool,
    },
    LastCheckpoint {
        seconds_ago: u64,
        threshold: u64,
        healthy: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub checks: Vec<Check>,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, check: Check) {
        let healthy = match &check {
            Check::WalSize { healthy, .. } => *healthy,
            Check::CorruptionErrors { healthy, .. } => *healthy,
            Check::LastCheckpoint { healthy, .. } => *healthy,
        };

        if !healthy {
            self.status = match self.status {
                HealthStatus::Healthy | HealthStatus::Degraded => HealthStatus::Degraded,
                HealthStatus::Unhealthy => HealthStatus::Unhealthy,
            };
            if matches!(check, Check::CorruptionErrors { count, .. } if count > 0) {
                self.status = HealthStatus::Unhealthy;
            }
        }

        self.checks.push(check);
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a [`HealthCheck`] for a durable adapter: WAL size against
/// `max_wal_size_bytes`, and time since the last checkpoint against a
/// fixed staleness threshold. The memory adapter has no equivalent signal,
/// so this only applies behind the `persistent` feature.
#[cfg(feature = "persistent")]
pub fn check_persistent_adapter(
    adapter: &crate::storage::persistent::PersistentAdapter,
    max_wal_size_bytes: u64,
    checkpoint_staleness_threshold_secs: u64,
) -> crate::error::Result<HealthCheck> {
    let mut check = HealthCheck::new();

    let wal_size = adapter.wal_size_bytes()?;
    check.add_check(Check::WalSize {
        bytes: wal_size,
        threshold: max_wal_size_bytes,
        healthy: wal_size < max_wal_size_bytes,
    });

    let seconds_ago = adapter.seconds_since_checkpoint();
    check.add_check(Check::LastCheckpoint {
        seconds_ago,
        threshold: checkpoint_staleness_threshold_secs,
        healthy: seconds_ago <= checkpoint_staleness_threshold_secs,
    });

    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_checks_healthy_yields_healthy_status() {
        let mut check = HealthCheck::new();
        check.add_check(Check::WalSize {
            bytes: 0,
            threshold: 100,
            healthy: true,
        });
        assert!(check.is_healthy());
    }

    #[test]
    fn corruption_errors_force_unhealthy() {
        let mut check = HealthCheck::new();
        check.add_check(Check::CorruptionErrors {
            count: 1,
            healthy: false,
        });
        assert_eq!(check.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn a_single_degraded_check_does_not_escalate_to_unhealthy() {
        let mut check = HealthCheck::new();
        check.add_check(Check::WalSize {
            bytes: 200,
            threshold: 100,
            healthy: false,
        });
        assert_eq!(check.status, HealthStatus::Degraded);
    }
}
