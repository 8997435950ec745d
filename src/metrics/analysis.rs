//! Usage pattern analysis
//!
//! Classifies skills from a metrics snapshot into frequent, failing and slow
//! sets and tallies the capabilities that failed requests asked for.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::execution::{MetricsSnapshot, MetricsStore};
use crate::error::Result;

/// Classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// A skill is frequent with strictly more invocations than this
    #[serde(default = "default_frequent_min_invocations")]
    pub frequent_min_invocations: u64,
    /// A skill with errors is failing below this success rate
    #[serde(default = "default_failing_success_rate")]
    pub failing_success_rate: f64,
    /// A skill is slow above this many seconds on average
    #[serde(default = "default_slow_avg_time_secs")]
    pub slow_avg_time_secs: f64,
    /// Minimum tally for a capability to count as missing
    #[serde(default = "default_missing_capability_min")]
    pub missing_capability_min: u64,
    /// Number of recent improvement events considered for trends
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
}

fn default_frequent_min_invocations() -> u64 {
    5
}

fn default_failing_success_rate() -> f64 {
    0.8
}

fn default_slow_avg_time_secs() -> f64 {
    5.0
}

fn default_missing_capability_min() -> u64 {
    2
}

fn default_trend_window() -> usize {
    5
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frequent_min_invocations: default_frequent_min_invocations(),
            failing_success_rate: default_failing_success_rate(),
            slow_avg_time_secs: default_slow_avg_time_secs(),
            missing_capability_min: default_missing_capability_min(),
            trend_window: default_trend_window(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequentSkill {
    pub name: String,
    pub invocations: u64,
    /// Seconds per success; NaN when the skill never succeeded
    pub avg_time: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailingSkill {
    pub name: String,
    pub success_rate: f64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowSkill {
    pub name: String,
    pub avg_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingCapability {
    pub capability: String,
    pub frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trends {
    /// Number of recent improvement events considered
    pub improvement_rate: usize,
    /// Mean bundled count across those events
    pub avg_improvements: f64,
}

/// Output of one analysis pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Patterns {
    pub frequent_skills: Vec<FrequentSkill>,
    pub failed_skills: Vec<FailingSkill>,
    pub slow_skills: Vec<SlowSkill>,
    pub missing_capabilities: Vec<MissingCapability>,
    pub trends: Option<Trends>,
}

impl Patterns {
    /// Keep only entries about one skill. Capabilities and trends are global.
    pub fn retain_skill(&mut self, skill_id: &str) {
        self.frequent_skills.retain(|s| s.name == skill_id);
        self.failed_skills.retain(|s| s.name == skill_id);
        self.slow_skills.retain(|s| s.name == skill_id);
    }

    pub fn is_empty(&self) -> bool {
        self.frequent_skills.is_empty()
            && self.failed_skills.is_empty()
            && self.slow_skills.is_empty()
            && self.missing_capabilities.is_empty()
            && self.trends.is_none()
    }
}

/// Pure classification of a snapshot
pub fn analyze_snapshot(snapshot: &MetricsSnapshot, config: &AnalysisConfig) -> Patterns {
    let mut patterns = Patterns::default();

    for (name, stats) in &snapshot.skills {
        if stats.invocations > config.frequent_min_invocations {
            patterns.frequent_skills.push(FrequentSkill {
                name: name.clone(),
                invocations: stats.invocations,
                avg_time: stats.total_execution_time / stats.success_count as f64,
                success_rate: stats.success_rate(),
            });
        }

        if stats.error_count > 0 && stats.success_rate() < config.failing_success_rate {
            patterns.failed_skills.push(FailingSkill {
                name: name.clone(),
                success_rate: stats.success_rate(),
                errors: stats.error_count,
            });
        }

        let avg_time = stats.avg_time();
        if avg_time > config.slow_avg_time_secs {
            patterns.slow_skills.push(SlowSkill {
                name: name.clone(),
                avg_time,
            });
        }
    }

    // Tally in first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for request in &snapshot.failed_requests {
        let capability = match request.requested_capability.as_deref() {
            Some(c) if !c.is_empty() => c.to_lowercase(),
            _ => continue,
        };
        let count = counts.entry(capability.clone()).or_insert(0);
        if *count == 0 {
            order.push(capability);
        }
        *count += 1;
    }
    for capability in order {
        let frequency = counts[&capability];
        if frequency >= config.missing_capability_min {
            patterns.missing_capabilities.push(MissingCapability { capability, frequency });
        }
    }

    let history = &snapshot.improvement_history;
    if history.len() >= 2 {
        let recent = &history[history.len().saturating_sub(config.trend_window)..];
        if !recent.is_empty() {
            let total: f64 = recent.iter().map(|e| e.count).sum();
            patterns.trends = Some(Trends {
                improvement_rate: recent.len(),
                avg_improvements: total / recent.len() as f64,
            });
        }
    }

    patterns
}

/// Reads the metrics store and classifies it
#[derive(Clone)]
pub struct PatternAnalyzer {
    metrics_store: MetricsStore,
    config: AnalysisConfig,
}

impl PatternAnalyzer {
    pub fn new(metrics_store: MetricsStore) -> Self {
        Self::with_config(metrics_store, AnalysisConfig::default())
    }

    pub fn with_config(metrics_store: MetricsStore, config: AnalysisConfig) -> Self {
        Self { metrics_store, config }
    }

    /// Snapshot-in-time analysis; writes made while it runs are not seen
    pub async fn analyze_usage_patterns(&self) -> Result<Patterns> {
        let snapshot = self.metrics_store.load().await?;
        let patterns = analyze_snapshot(&snapshot, &self.config);
        debug!(
            "Analyzed {} skills: {} frequent, {} failing, {} slow, {} missing capabilities",
            snapshot.skills.len(),
            patterns.frequent_skills.len(),
            patterns.failed_skills.len(),
            patterns.slow_skills.len(),
            patterns.missing_capabilities.len()
        );
        Ok(patterns)
    }
}
