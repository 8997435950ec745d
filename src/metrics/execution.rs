//! Skill invocation metrics
//!
//! Records per-invocation outcomes into the usage metrics document and keeps
//! the global failed-request log that capability demand is derived from.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::storage::{load_or_default, save_document, DocumentStorage, METRICS_DOCUMENT};
use crate::error::Result;

/// Schema version written into new documents
pub const SCHEMA_VERSION: &str = "2.0.0";

/// Phrase recorded when an error names no capability
pub const UNKNOWN_CAPABILITY: &str = "unknown";

static CAPABILITY_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)capability|missing|need|require").expect("valid keyword regex"));

/// One skill invocation outcome as reported by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub skill_id: String,
    pub success: bool,
    /// Wall time in seconds
    pub execution_time: f64,
    pub tokens_used: f64,
    pub error: Option<String>,
}

impl Invocation {
    pub fn success(skill_id: &str, execution_time: f64, tokens_used: f64) -> Self {
        Self {
            skill_id: skill_id.to_string(),
            success: true,
            execution_time,
            tokens_used,
            error: None,
        }
    }

    pub fn failure(skill_id: &str, error: Option<&str>) -> Self {
        Self {
            skill_id: skill_id.to_string(),
            success: false,
            execution_time: 0.0,
            tokens_used: 0.0,
            error: error.map(|e| e.to_string()),
        }
    }
}

/// An error kept on the failing skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillError {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub execution_time: f64,
}

/// Cumulative counters for one skill.
///
/// `invocations == success_count + error_count` always holds; time and
/// tokens only accumulate on successful invocations. Totals are floats
/// because callers may report fractional token counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillStats {
    #[serde(default)]
    pub invocations: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
    /// Seconds
    #[serde(default)]
    pub total_execution_time: f64,
    #[serde(default)]
    pub total_tokens: f64,
    #[serde(default)]
    pub errors: Vec<SkillError>,
}

impl SkillStats {
    /// Fraction of invocations that succeeded. NaN before the first invocation.
    pub fn success_rate(&self) -> f64 {
        self.success_count as f64 / self.invocations as f64
    }

    /// Mean seconds per successful invocation, treating zero successes as one
    pub fn avg_time(&self) -> f64 {
        self.total_execution_time / self.success_count.max(1) as f64
    }

    /// Mean tokens per successful invocation, treating zero successes as one
    pub fn avg_tokens(&self) -> f64 {
        self.total_tokens / self.success_count.max(1) as f64
    }
}

/// A failed invocation in the global log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRequest {
    pub timestamp: DateTime<Utc>,
    pub skill: String,
    pub error: String,
    #[serde(default)]
    pub requested_capability: Option<String>,
}

/// A bundle of improvements applied at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementEvent {
    pub timestamp: DateTime<Utc>,
    pub count: f64,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// The usage metrics document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub total_invocations: u64,
    #[serde(default)]
    pub skills: BTreeMap<String, SkillStats>,
    /// Agent usage written by other tools; carried through untouched
    #[serde(default)]
    pub agents: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub failed_requests: Vec<FailedRequest>,
    #[serde(default)]
    pub improvements_executed: u64,
    #[serde(default)]
    pub improvement_history: Vec<ImprovementEvent>,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            version: default_version(),
            last_updated: Utc::now(),
            total_invocations: 0,
            skills: BTreeMap::new(),
            agents: serde_json::Map::new(),
            failed_requests: Vec::new(),
            improvements_executed: 0,
            improvement_history: Vec::new(),
        }
    }
}

impl MetricsSnapshot {
    /// Fold one invocation into the counters
    pub fn apply(&mut self, invocation: &Invocation) {
        self.total_invocations = self.total_invocations.saturating_add(1);

        let stats = self.skills.entry(invocation.skill_id.clone()).or_default();
        stats.invocations = stats.invocations.saturating_add(1);

        if invocation.success {
            stats.success_count = stats.success_count.saturating_add(1);
            stats.total_execution_time += invocation.execution_time;
            stats.total_tokens += invocation.tokens_used;
            return;
        }

        stats.error_count = stats.error_count.saturating_add(1);
        if let Some(ref error) = invocation.error {
            let now = Utc::now();
            stats.errors.push(SkillError {
                timestamp: now,
                error: error.clone(),
                execution_time: invocation.execution_time,
            });
            self.failed_requests.push(FailedRequest {
                timestamp: now,
                skill: invocation.skill_id.clone(),
                error: error.clone(),
                requested_capability: Some(extract_capability(error)),
            });
        }
    }

    /// Log one applied improvement
    pub fn push_improvement(&mut self, action: String) {
        self.improvements_executed = self.improvements_executed.saturating_add(1);
        self.improvement_history.push(ImprovementEvent {
            timestamp: Utc::now(),
            count: 1.0,
            actions: vec![action],
        });
    }
}

/// Pull a short "requested capability" phrase out of an error message.
///
/// Finds the first keyword hit, then keeps that token plus two on either
/// side. Lossy on purpose; callers must tolerate noise.
pub fn extract_capability(error: &str) -> String {
    let keyword = match CAPABILITY_KEYWORD.find(error) {
        Some(m) => m.as_str().to_lowercase(),
        None => return UNKNOWN_CAPABILITY.to_string(),
    };

    let words: Vec<&str> = error.split(' ').collect();
    let index = match words.iter().position(|w| w.to_lowercase().contains(&keyword)) {
        Some(i) => i,
        None => return UNKNOWN_CAPABILITY.to_string(),
    };

    let start = index.saturating_sub(2);
    let end = (index + 3).min(words.len());
    words[start..end].join(" ")
}

/// Result of recording an invocation
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    pub stats: SkillStats,
    pub total_invocations: u64,
}

/// Persistent usage metrics, read and rewritten whole on every mutation
#[derive(Clone)]
pub struct MetricsStore {
    storage: Arc<dyn DocumentStorage>,
}

impl MetricsStore {
    pub fn new(storage: Arc<dyn DocumentStorage>) -> Self {
        Self { storage }
    }

    /// Current snapshot, or the default document when none is persisted
    pub async fn load(&self) -> Result<MetricsSnapshot> {
        load_or_default(self.storage.as_ref(), METRICS_DOCUMENT, MetricsSnapshot::default).await
    }

    /// Write the snapshot, stamping `last_updated`
    pub async fn save(&self, snapshot: &mut MetricsSnapshot) -> Result<()> {
        snapshot.last_updated = Utc::now();
        save_document(self.storage.as_ref(), METRICS_DOCUMENT, snapshot).await
    }

    /// Record one invocation outcome
    pub async fn record_invocation(&self, invocation: &Invocation) -> Result<RecordedInvocation> {
        let mut snapshot = self.load().await?;
        snapshot.apply(invocation);
        self.save(&mut snapshot).await?;

        debug!(
            "Recorded invocation for {}, total: {}",
            invocation.skill_id, snapshot.total_invocations
        );

        let stats = snapshot
            .skills
            .get(&invocation.skill_id)
            .cloned()
            .unwrap_or_default();
        Ok(RecordedInvocation {
            stats,
            total_invocations: snapshot.total_invocations,
        })
    }

    /// Stats for one skill, if it has ever been invoked
    pub async fn get_skill_stats(&self, skill_id: &str) -> Result<Option<SkillStats>> {
        Ok(self.load().await?.skills.get(skill_id).cloned())
    }

    /// Bump the improvement counter and log an event
    pub async fn record_improvement(&self, action: String) -> Result<()> {
        let mut snapshot = self.load().await?;
        snapshot.push_improvement(action);
        self.save(&mut snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::storage::MemoryStorage;

    fn store() -> MetricsStore {
        MetricsStore::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_record_success() {
        let store = store();

        let recorded = store
            .record_invocation(&Invocation::success("pdf-reader", 2.5, 120.0))
            .await
            .unwrap();

        assert_eq!(recorded.total_invocations, 1);
        assert_eq!(recorded.stats.invocations, 1);
        assert_eq!(recorded.stats.success_count, 1);
        assert_eq!(recorded.stats.total_execution_time, 2.5);
        assert_eq!(recorded.stats.total_tokens, 120.0);
    }

    #[tokio::test]
    async fn test_failure_does_not_accumulate_time() {
        let store = store();
        let mut failure = Invocation::failure("pdf-reader", Some("timeout"));
        failure.execution_time = 30.0;
        failure.tokens_used = 50.0;

        store.record_invocation(&failure).await.unwrap();

        let stats = store.get_skill_stats("pdf-reader").await.unwrap().unwrap();
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.total_execution_time, 0.0);
        assert_eq!(stats.total_tokens, 0.0);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].execution_time, 30.0);
    }

    #[tokio::test]
    async fn test_failure_without_text_is_not_logged() {
        let store = store();
        store.record_invocation(&Invocation::failure("x", None)).await.unwrap();

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.skills["x"].error_count, 1);
        assert!(snapshot.skills["x"].errors.is_empty());
        assert!(snapshot.failed_requests.is_empty());
    }

    #[tokio::test]
    async fn test_counter_invariant_and_monotonic_total() {
        let store = store();
        let outcomes = [true, false, true, true, false, false, true];

        for (i, ok) in outcomes.iter().enumerate() {
            let invocation = if *ok {
                Invocation::success("skill-a", 1.0, 10.0)
            } else {
                Invocation::failure("skill-a", Some("boom"))
            };
            let recorded = store.record_invocation(&invocation).await.unwrap();

            assert_eq!(recorded.total_invocations, i as u64 + 1);
            assert_eq!(
                recorded.stats.invocations,
                recorded.stats.success_count + recorded.stats.error_count
            );
        }
    }

    #[tokio::test]
    async fn test_failed_request_carries_capability() {
        let store = store();
        store
            .record_invocation(&Invocation::failure("x", Some("missing capability: translation")))
            .await
            .unwrap();

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.failed_requests.len(), 1);
        assert_eq!(snapshot.failed_requests[0].skill, "x");
        assert_eq!(
            snapshot.failed_requests[0].requested_capability.as_deref(),
            Some("missing capability: translation")
        );
    }

    #[tokio::test]
    async fn test_unparseable_document_falls_back_to_default() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(METRICS_DOCUMENT, "{ not json").await;
        let store = MetricsStore::new(storage);

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.total_invocations, 0);
        assert_eq!(snapshot.version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_agents_section_round_trips() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .insert(
                METRICS_DOCUMENT,
                r#"{"version":"2.0.0","total_invocations":0,"skills":{},"agents":{"planner":{"runs":3}}}"#,
            )
            .await;
        let store = MetricsStore::new(storage.clone());

        store.record_invocation(&Invocation::success("s", 1.0, 1.0)).await.unwrap();

        let raw = storage.get(METRICS_DOCUMENT).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["agents"]["planner"]["runs"], 3);
        assert!(value["failed_requests"].is_array());
        assert!(value["improvement_history"].is_array());
    }

    #[test]
    fn test_counters_saturate() {
        let mut snapshot = MetricsSnapshot {
            total_invocations: u64::MAX,
            improvements_executed: u64::MAX,
            ..Default::default()
        };
        snapshot.skills.insert(
            "s".to_string(),
            SkillStats {
                invocations: u64::MAX,
                success_count: u64::MAX,
                ..Default::default()
            },
        );

        snapshot.apply(&Invocation::success("s", 1.0, f64::MAX));
        snapshot.push_improvement("Optimized s for speed".to_string());

        assert_eq!(snapshot.total_invocations, u64::MAX);
        assert_eq!(snapshot.skills["s"].invocations, u64::MAX);
        assert_eq!(snapshot.skills["s"].success_count, u64::MAX);
        assert_eq!(snapshot.improvements_executed, u64::MAX);
    }

    #[tokio::test]
    async fn test_record_improvement() {
        let store = store();
        store.record_improvement("Optimized s for speed".to_string()).await.unwrap();

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.improvements_executed, 1);
        assert_eq!(snapshot.improvement_history[0].count, 1.0);
        assert_eq!(snapshot.improvement_history[0].actions, vec!["Optimized s for speed"]);
    }

    #[test]
    fn test_extract_capability_window() {
        assert_eq!(
            extract_capability("missing capability: translation"),
            "missing capability: translation"
        );
        assert_eq!(
            extract_capability("the user asked and we need image processing support today"),
            "and we need image processing"
        );
    }

    #[test]
    fn test_extract_capability_is_case_insensitive() {
        assert_eq!(extract_capability("REQUIRES ocr"), "REQUIRES ocr");
        assert_eq!(extract_capability("Skill lacks a Capability"), "lacks a Capability");
    }

    #[test]
    fn test_extract_capability_unknown() {
        assert_eq!(extract_capability("connection reset by peer"), UNKNOWN_CAPABILITY);
        assert_eq!(extract_capability(""), UNKNOWN_CAPABILITY);
    }
}
