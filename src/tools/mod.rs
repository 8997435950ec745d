//! Tool definitions for the evolution server
//!
//! Each tool takes a JSON argument object and returns a [`ToolResult`] whose
//! message is the human-readable report and whose data carries the same
//! content in structured form.

pub mod evolution;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;
use crate::error::EvolutionError;
use crate::metrics::{
    AnalysisConfig, DocumentStorage, JsonFileStorage, MetricsStore, OptimizationApplier,
    OptimizationSource, OptimizationStore, PatternAnalyzer, TrialComparator, TrialSource,
};
use crate::metrics::trials::DEFAULT_ITERATIONS;

/// Tool definition as advertised to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool call from a client
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Tool execution result
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Everything the tools need, sharing one storage backend
#[derive(Clone)]
pub struct ToolContext {
    pub metrics: MetricsStore,
    pub ledger: OptimizationStore,
    pub analyzer: PatternAnalyzer,
    pub applier: Arc<OptimizationApplier>,
    pub comparator: Arc<TrialComparator>,
    pub default_iterations: u32,
}

impl ToolContext {
    /// Default thresholds and simulated sources over the given storage
    pub fn new(storage: Arc<dyn DocumentStorage>) -> Self {
        let metrics = MetricsStore::new(storage.clone());
        let ledger = OptimizationStore::new(storage);
        Self {
            analyzer: PatternAnalyzer::new(metrics.clone()),
            applier: Arc::new(OptimizationApplier::new(metrics.clone(), ledger.clone())),
            comparator: Arc::new(TrialComparator::new()),
            metrics,
            ledger,
            default_iterations: DEFAULT_ITERATIONS,
        }
    }

    /// JSON files in the configured cache directory
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = Arc::new(JsonFileStorage::new(config.cache_dir()?));
        let mut ctx = Self::new(storage).with_analysis_config(config.analysis.clone());
        ctx.default_iterations = config.trials.default_iterations;
        Ok(ctx)
    }

    pub fn with_analysis_config(mut self, config: AnalysisConfig) -> Self {
        self.analyzer = PatternAnalyzer::with_config(self.metrics.clone(), config);
        self
    }

    pub fn with_trial_source(mut self, source: Arc<dyn TrialSource>) -> Self {
        self.comparator = Arc::new(TrialComparator::with_source(source));
        self
    }

    pub fn with_optimization_source(mut self, source: Arc<dyn OptimizationSource>) -> Self {
        self.applier = Arc::new(OptimizationApplier::with_source(
            self.metrics.clone(),
            self.ledger.clone(),
            source,
        ));
        self
    }
}

/// Tools served by this crate
pub fn builtin_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "track_metrics".to_string(),
            description: "Track usage metrics for skills and agents".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "skillName": { "type": "string", "description": "Skill name" },
                    "success": { "type": "boolean", "description": "Was the invocation successful?" },
                    "executionTime": { "type": "number", "description": "Execution time in seconds" },
                    "tokensUsed": { "type": "number", "description": "Tokens consumed" },
                    "error": { "type": "string", "description": "Error message (if failed)" }
                },
                "required": ["skillName", "success"]
            }),
        },
        Tool {
            name: "analyze_performance".to_string(),
            description: "Analyze performance patterns and identify issues".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "skillName": { "type": "string", "description": "Specific skill to analyze" },
                    "timeframe": {
                        "type": "string",
                        "enum": ["day", "week", "month", "all"],
                        "description": "Analysis timeframe (accepted, not yet used to filter)"
                    }
                }
            }),
        },
        Tool {
            name: "generate_improvements".to_string(),
            description: "Generate specific improvement suggestions".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "priority": {
                        "type": "string",
                        "enum": ["high", "medium", "low"],
                        "description": "Filter by priority"
                    },
                    "type": {
                        "type": "string",
                        "enum": ["optimization", "fix", "creation", "composition"],
                        "description": "Filter by type"
                    }
                }
            }),
        },
        Tool {
            name: "apply_evolution".to_string(),
            description: "Apply improvements and track evolution".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "skillName": { "type": "string", "description": "Skill to improve" },
                    "metric": {
                        "type": "string",
                        "enum": ["speed", "reliability", "tokens"],
                        "description": "Metric to optimize"
                    },
                    "auto": { "type": "boolean", "description": "Apply automatically without confirmation" }
                },
                "required": ["skillName", "metric"]
            }),
        },
        Tool {
            name: "a_b_test".to_string(),
            description: "Compare two versions of a prompt or skill".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "skillName": { "type": "string", "description": "Skill name" },
                    "versionA": { "type": "string", "description": "Version A identifier" },
                    "versionB": { "type": "string", "description": "Version B identifier" },
                    "iterations": { "type": "number", "description": "Number of test iterations" }
                },
                "required": ["skillName", "versionA", "versionB"]
            }),
        },
    ]
}

/// Run a tool. Unknown tool names are an error; failures inside a known
/// tool come back as an unsuccessful [`ToolResult`].
pub async fn execute_tool(call: &ToolCall, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
    let args = &call.arguments;
    let outcome = match call.name.as_str() {
        "track_metrics" => evolution::execute_track_metrics(args, ctx).await,
        "analyze_performance" => evolution::execute_analyze_performance(args, ctx).await,
        "generate_improvements" => evolution::execute_generate_improvements(args, ctx).await,
        "apply_evolution" => evolution::execute_apply_evolution(args, ctx).await,
        "a_b_test" => evolution::execute_ab_test(args, ctx),
        other => anyhow::bail!("Unknown tool: {}", other),
    };

    Ok(outcome.unwrap_or_else(|e| {
        tracing::warn!("Tool {} failed: {}", call.name, e);
        ToolResult::failure(format!("❌ {} failed: {}", call.name, e))
    }))
}

// Argument helpers. A JSON null counts as absent.

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, EvolutionError> {
    optional_str(args, key)?
        .ok_or_else(|| EvolutionError::validation(format!("Missing '{}' argument", key)))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, EvolutionError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(EvolutionError::validation(format!("'{}' must be a string", key))),
    }
}

pub(crate) fn optional_bool(args: &Value, key: &str) -> Result<Option<bool>, EvolutionError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(EvolutionError::validation(format!("'{}' must be a boolean", key))),
    }
}

/// Non-negative number
pub(crate) fn optional_number(args: &Value, key: &str) -> Result<Option<f64>, EvolutionError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n >= 0.0 => Ok(Some(n)),
            _ => Err(EvolutionError::validation(format!(
                "'{}' must be a non-negative number",
                key
            ))),
        },
    }
}
