//! Optimization ledger
//!
//! Keeps the latest suggestion set and every applied improvement in the
//! optimization data document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::execution::SCHEMA_VERSION;
use super::storage::{load_or_default, save_document, DocumentStorage, OPTIMIZATION_DOCUMENT};
use super::suggestions::Suggestion;
use crate::error::{EvolutionError, Result};

/// Metric an optimization targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMetric {
    Speed,
    Reliability,
    Tokens,
}

impl OptimizationMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMetric::Speed => "speed",
            OptimizationMetric::Reliability => "reliability",
            OptimizationMetric::Tokens => "tokens",
        }
    }
}

impl fmt::Display for OptimizationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationMetric {
    type Err = EvolutionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "speed" => Ok(OptimizationMetric::Speed),
            "reliability" => Ok(OptimizationMetric::Reliability),
            "tokens" => Ok(OptimizationMetric::Tokens),
            other => Err(EvolutionError::validation(format!(
                "Unknown metric '{}'. Expected one of: speed, reliability, tokens",
                other
            ))),
        }
    }
}

/// A single measured value, keyed by what it measures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricReading {
    AvgTime { avg_time: f64 },
    SuccessRate { success_rate: f64 },
    AvgTokens { avg_tokens: f64 },
}

impl MetricReading {
    pub fn value(&self) -> f64 {
        match *self {
            MetricReading::AvgTime { avg_time } => avg_time,
            MetricReading::SuccessRate { success_rate } => success_rate,
            MetricReading::AvgTokens { avg_tokens } => avg_tokens,
        }
    }
}

/// Direction and size of a change, as a display string like `"25%"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Reduction(String),
    Improvement(String),
}

impl Change {
    pub fn descriptor(&self) -> &str {
        match self {
            Change::Reduction(d) | Change::Improvement(d) => d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementDelta {
    pub before: MetricReading,
    pub after: MetricReading,
    #[serde(flatten)]
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedImprovement {
    pub timestamp: DateTime<Utc>,
    pub skill: String,
    pub metric: OptimizationMetric,
    pub improvement: ImprovementDelta,
}

/// The optimization data document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationLedger {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub last_analysis: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub applied_improvements: Vec<AppliedImprovement>,
    #[serde(default)]
    pub performance_trends: serde_json::Map<String, serde_json::Value>,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl Default for OptimizationLedger {
    fn default() -> Self {
        Self {
            version: default_version(),
            last_analysis: None,
            suggestions: Vec::new(),
            applied_improvements: Vec::new(),
            performance_trends: serde_json::Map::new(),
        }
    }
}

/// Persistent ledger, read and rewritten whole on every mutation
#[derive(Clone)]
pub struct OptimizationStore {
    storage: Arc<dyn DocumentStorage>,
}

impl OptimizationStore {
    pub fn new(storage: Arc<dyn DocumentStorage>) -> Self {
        Self { storage }
    }

    pub async fn load(&self) -> Result<OptimizationLedger> {
        load_or_default(self.storage.as_ref(), OPTIMIZATION_DOCUMENT, OptimizationLedger::default).await
    }

    /// Write the ledger, stamping `last_analysis`
    pub async fn save(&self, ledger: &mut OptimizationLedger) -> Result<()> {
        ledger.last_analysis = Some(Utc::now());
        save_document(self.storage.as_ref(), OPTIMIZATION_DOCUMENT, ledger).await
    }

    /// Replace the latest suggestion set
    pub async fn save_suggestions(&self, suggestions: &[Suggestion]) -> Result<()> {
        let mut ledger = self.load().await?;
        ledger.suggestions = suggestions.to_vec();
        self.save(&mut ledger).await?;
        info!("Saved {} suggestions", suggestions.len());
        Ok(())
    }

    pub async fn record_applied(&self, applied: AppliedImprovement) -> Result<()> {
        let mut ledger = self.load().await?;
        ledger.applied_improvements.push(applied);
        self.save(&mut ledger).await
    }
}
