//! Per-user, per-UTC-day usage quotas across three independent meters.
//!
//! Counters are keyed by (user_id, day). A new day simply has no row yet, so
//! "reset at midnight UTC" falls out of the key shape with no reset job.

pub mod tracker;

pub use tracker::QuotaTracker;

use crate::Error;
use chrono::{DateTime, Days, NaiveTime, Utc};
use std::collections::HashSet;
use std::fmt;

/// One of the three independently tracked usage meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageDimension {
    /// Seconds of audio sent to the speech-to-text provider.
    TranscribeSeconds,
    /// Transcript-cleaning calls to the LLM provider.
    EvaluateCount,
    /// Text fetches against the licensed Bible providers.
    BibleFetchCount,
}

impl UsageDimension {
    /// Column backing this meter in `usage_counters`.
    pub(crate) fn column(self) -> &'static str {
        match self {
            UsageDimension::TranscribeSeconds => "transcribe_seconds",
            UsageDimension::EvaluateCount => "evaluate_count",
            UsageDimension::BibleFetchCount => "bible_fetch_count",
        }
    }

    /// Client-facing meter name.
    pub fn meter(self) -> &'static str {
        match self {
            UsageDimension::TranscribeSeconds => "transcribeSeconds",
            UsageDimension::EvaluateCount => "evaluateCount",
            UsageDimension::BibleFetchCount => "bibleFetchCount",
        }
    }

    /// Whether the meter counts whole calls rather than seconds.
    pub(crate) fn is_discrete(self) -> bool {
        !matches!(self, UsageDimension::TranscribeSeconds)
    }
}

impl fmt::Display for UsageDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.meter())
    }
}

/// A user's subscription level, resolved per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Free,
    Supporter,
}

impl Tier {
    /// Daily limit for one meter.
    pub fn limit(self, dimension: UsageDimension) -> f64 {
        match (self, dimension) {
            (Tier::Free, UsageDimension::TranscribeSeconds) => 300.0,
            (Tier::Free, UsageDimension::EvaluateCount) => 20.0,
            (Tier::Free, UsageDimension::BibleFetchCount) => 100.0,
            (Tier::Supporter, UsageDimension::TranscribeSeconds) => 3600.0,
            (Tier::Supporter, UsageDimension::EvaluateCount) => 500.0,
            (Tier::Supporter, UsageDimension::BibleFetchCount) => 10000.0,
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone)]
pub struct UsageDecision {
    pub allowed: bool,
    pub used: f64,
    pub limit: f64,
    pub resets_at: DateTime<Utc>,
}

/// Subscription lookup collaborator.
///
/// The real implementation lives with the billing system; this core only
/// consumes it.
#[async_trait::async_trait]
pub trait TierResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> Result<Tier, Error>;
}

/// Config-backed resolver: a fixed set of supporter user ids, everyone else
/// is free tier.
#[derive(Debug, Clone, Default)]
pub struct StaticTierResolver {
    supporters: HashSet<String>,
}

impl StaticTierResolver {
    pub fn new(supporters: impl IntoIterator<Item = String>) -> Self {
        Self { supporters: supporters.into_iter().collect() }
    }
}

#[async_trait::async_trait]
impl TierResolver for StaticTierResolver {
    async fn resolve(&self, user_id: &str) -> Result<Tier, Error> {
        if self.supporters.contains(user_id) { Ok(Tier::Supporter) } else { Ok(Tier::Free) }
    }
}

/// The next UTC midnight, reported to clients as the quota reset time.
pub fn next_utc_midnight() -> DateTime<Utc> {
    let tomorrow = Utc::now().date_naive() + Days::new(1);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}
