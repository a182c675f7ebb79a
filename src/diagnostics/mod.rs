#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use crate::types::StrategyId;

/// Why the quality filter turned a candidate away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowConfluence,
    LowConfidence,
    LowRiskReward,
    Duplicate,
    ConflictingStrategies,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::LowConfluence => "low_confluence",
            RejectReason::LowConfidence => "low_confidence",
            RejectReason::LowRiskReward => "low_risk_reward",
            RejectReason::Duplicate => "duplicate",
            RejectReason::ConflictingStrategies => "conflicting_strategies",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data problems that caused a tick to be skipped or degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityIssue {
    StaleData,
    InvalidData,
    InsufficientHistory,
    ProviderRatelimited,
    ProviderTimeout,
    FetchFailed,
}

impl DataQualityIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQualityIssue::StaleData => "stale_data",
            DataQualityIssue::InvalidData => "invalid_data",
            DataQualityIssue::InsufficientHistory => "insufficient_history",
            DataQualityIssue::ProviderRatelimited => "provider_ratelimited",
            DataQualityIssue::ProviderTimeout => "provider_timeout",
            DataQualityIssue::FetchFailed => "fetch_failed",
        }
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct DiagStats {
    attempts: BTreeMap<StrategyId, u64>,
    successes: BTreeMap<StrategyId, u64>,
    rejections: BTreeMap<RejectReason, u64>,
    data_quality: BTreeMap<DataQualityIssue, u64>,
    last_signal_at: Option<DateTime<Utc>>,
}

/// Periodic summary handed to the dispatch sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub runtime_s: i64,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub attempts_by_strategy: BTreeMap<String, u64>,
    pub successes_by_strategy: BTreeMap<String, u64>,
    pub rejections_by_reason: BTreeMap<String, u64>,
    pub data_quality_by_issue: BTreeMap<String, u64>,
    pub recommendations: Vec<String>,
}

/// Thread-safe counters shared by every component in one scanner. All
/// operations are single map increments behind a short-lived lock;
/// summaries work on a snapshot.
pub struct DiagnosticRecorder {
    stats: Mutex<DiagStats>,
    started_at: DateTime<Utc>,
}

impl DiagnosticRecorder {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            stats: Mutex::new(DiagStats::default()),
            started_at,
        }
    }

    pub fn record_attempt(&self, strategy: StrategyId) {
        let mut stats = self.stats.lock().expect("diagnostics lock poisoned");
        *stats.attempts.entry(strategy).or_insert(0) += 1;
    }

    pub fn record_success(&self, strategy: StrategyId, at: DateTime<Utc>) {
        let mut stats = self.stats.lock().expect("diagnostics lock poisoned");
        *stats.successes.entry(strategy).or_insert(0) += 1;
        stats.last_signal_at = Some(at);
    }

    pub fn record_rejection(&self, reason: RejectReason) {
        let mut stats = self.stats.lock().expect("diagnostics lock poisoned");
        *stats.rejections.entry(reason).or_insert(0) += 1;
    }

    pub fn record_data_quality(&self, issue: DataQualityIssue) {
        let mut stats = self.stats.lock().expect("diagnostics lock poisoned");
        *stats.data_quality.entry(issue).or_insert(0) += 1;
    }

    pub fn successes_for(&self, strategy: StrategyId) -> u64 {
        let stats = self.stats.lock().expect("diagnostics lock poisoned");
        stats.successes.get(&strategy).copied().unwrap_or(0)
    }

    pub fn data_quality_count(&self, issue: DataQualityIssue) -> u64 {
        let stats = self.stats.lock().expect("diagnostics lock poisoned");
        stats.data_quality.get(&issue).copied().unwrap_or(0)
    }

    pub fn report(&self, now: DateTime<Utc>) -> DiagnosticReport {
        let stats = self.stats.lock().expect("diagnostics lock poisoned").clone();
        let runtime_s = (now - self.started_at).num_seconds();

        let mut recommendations = Vec::new();
        for (strategy, attempts) in &stats.attempts {
            if *attempts < 10 {
                continue;
            }
            let successes = stats.successes.get(strategy).copied().unwrap_or(0);
            if (successes as f64) / (*attempts as f64) < 0.05 {
                recommendations.push(format!(
                    "consider relaxing thresholds for {strategy} ({successes}/{attempts} signals)"
                ));
            }
        }
        let total_rejections: u64 = stats.rejections.values().sum();
        if total_rejections > 0 {
            for (reason, count) in &stats.rejections {
                if count * 2 >= total_rejections {
                    recommendations.push(format!(
                        "filter {reason} is dominant ({count}/{total_rejections} rejections); inspect threshold"
                    ));
                }
            }
        }
        if stats.last_signal_at.is_none() && runtime_s >= 3600 {
            recommendations.push("no signals produced yet; consider bypass mode for diagnosis".to_string());
        }

        DiagnosticReport {
            runtime_s,
            last_signal_at: stats.last_signal_at,
            attempts_by_strategy: stats
                .attempts
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            successes_by_strategy: stats
                .successes
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            rejections_by_reason: stats
                .rejections
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            data_quality_by_issue: stats
                .data_quality
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            recommendations,
        }
    }
}
