//! Freshness policy for cached artifacts.

use std::time::Duration;
use time::OffsetDateTime;

/// Why an artifact is (or is not) servable as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FreshnessReason {
    /// No artifact exists for the key.
    Missing,
    /// The artifact is at least one TTL old.
    Expired,
    /// The artifact is younger than the TTL.
    Fresh,
}

impl FreshnessReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Expired => "expired",
            Self::Fresh => "fresh",
        }
    }
}

/// Outcome of evaluating an artifact against the TTL. Derived per request, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessDecision {
    pub stale: bool,
    pub reason: FreshnessReason,
}

impl FreshnessDecision {
    fn new(reason: FreshnessReason) -> Self {
        Self {
            stale: reason != FreshnessReason::Fresh,
            reason,
        }
    }
}

/// Decide whether an artifact last modified at `last_modified` may be served at `now`.
///
/// `None` means no artifact exists. An mtime in the future counts as age zero,
/// so a zero TTL always forces regeneration.
pub fn is_fresh(
    last_modified: Option<OffsetDateTime>,
    ttl: Duration,
    now: OffsetDateTime,
) -> FreshnessDecision {
    let Some(last_modified) = last_modified else {
        return FreshnessDecision::new(FreshnessReason::Missing);
    };

    let age = Duration::try_from(now - last_modified).unwrap_or(Duration::ZERO);
    if age >= ttl {
        FreshnessDecision::new(FreshnessReason::Expired)
    } else {
        FreshnessDecision::new(FreshnessReason::Fresh)
    }
}
