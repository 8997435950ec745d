//! Evolution tool handlers
//!
//! Arguments are validated before anything is read or written, so a rejected
//! call never mutates the documents.

use serde_json::Value;

use super::{optional_bool, optional_number, optional_str, required_str, ToolContext, ToolResult};
use crate::error::{EvolutionError, Result};
use crate::metrics::ledger::MetricReading;
use crate::metrics::suggestions::filter_suggestions;
use crate::metrics::{generate_suggestions, Invocation, OptimizationMetric, Priority, Suggestion, SuggestionType};

const TIMEFRAMES: [&str; 4] = ["day", "week", "month", "all"];

pub async fn execute_track_metrics(args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
    let skill_name = required_str(args, "skillName")?;
    let success = optional_bool(args, "success")?
        .ok_or_else(|| EvolutionError::validation("Missing 'success' argument"))?;
    let execution_time = optional_number(args, "executionTime")?;
    let tokens_used = optional_number(args, "tokensUsed")?;
    let error = optional_str(args, "error")?;

    let invocation = Invocation {
        skill_id: skill_name.to_string(),
        success,
        execution_time: execution_time.unwrap_or(0.0),
        tokens_used: tokens_used.unwrap_or(0.0),
        error: error.map(str::to_string),
    };
    let recorded = ctx.metrics.record_invocation(&invocation).await?;
    let stats = &recorded.stats;

    let mut text = String::from("📊 Metrics Tracked\n\n");
    text.push_str(&format!("Skill: {}\n", skill_name));
    text.push_str(&format!("Status: {}\n", if success { "✅ Success" } else { "❌ Failed" }));
    text.push_str(&format!("Invocations: {}\n", stats.invocations));
    text.push_str(&format!("Success Rate: {:.1}%\n", stats.success_rate() * 100.0));
    if let Some(t) = execution_time.filter(|t| *t > 0.0) {
        text.push_str(&format!("Execution Time: {}s\n", t));
    }
    if let Some(t) = tokens_used.filter(|t| *t > 0.0) {
        text.push_str(&format!("Tokens Used: {}\n", t));
    }
    if let Some(e) = error.filter(|e| !e.is_empty()) {
        text.push_str(&format!("Error: {}\n", e));
    }
    text.push_str(&format!("\nTotal System Invocations: {}", recorded.total_invocations));

    Ok(ToolResult {
        success: true,
        message: text,
        data: Some(serde_json::json!({
            "skill": skill_name,
            "stats": stats,
            "total_invocations": recorded.total_invocations,
        })),
    })
}

pub async fn execute_analyze_performance(args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
    let skill_name = optional_str(args, "skillName")?;
    if let Some(timeframe) = optional_str(args, "timeframe")? {
        if !TIMEFRAMES.contains(&timeframe) {
            return Err(EvolutionError::validation(format!(
                "Unknown timeframe '{}' (expected one of: {})",
                timeframe,
                TIMEFRAMES.join(", ")
            )));
        }
    }

    let mut patterns = ctx.analyzer.analyze_usage_patterns().await?;
    if let Some(skill) = skill_name {
        patterns.retain_skill(skill);
    }

    let header = "🔍 Performance Analysis\n\n";
    let mut text = String::from(header);

    if !patterns.frequent_skills.is_empty() {
        text.push_str("Frequently Used Skills:\n");
        for skill in &patterns.frequent_skills {
            text.push_str(&format!(
                "  • {}: {} invocations, {:.0}% success\n",
                skill.name,
                skill.invocations,
                skill.success_rate * 100.0
            ));
        }
        text.push('\n');
    }

    if !patterns.failed_skills.is_empty() {
        text.push_str("Skills Needing Attention:\n");
        for skill in &patterns.failed_skills {
            text.push_str(&format!(
                "  ⚠️ {}: {:.0}% success, {} errors\n",
                skill.name,
                skill.success_rate * 100.0,
                skill.errors
            ));
        }
        text.push('\n');
    }

    if !patterns.slow_skills.is_empty() {
        text.push_str("Slow Skills:\n");
        for skill in &patterns.slow_skills {
            text.push_str(&format!("  🐌 {}: {:.2}s avg\n", skill.name, skill.avg_time));
        }
        text.push('\n');
    }

    if !patterns.missing_capabilities.is_empty() {
        text.push_str("Missing Capabilities:\n");
        for cap in &patterns.missing_capabilities {
            text.push_str(&format!("  🔍 \"{}\" (requested {} times)\n", cap.capability, cap.frequency));
        }
        text.push('\n');
    }

    if let Some(trends) = &patterns.trends {
        text.push_str("Trends:\n");
        text.push_str(&format!("  • Avg improvements: {:.1} per period\n", trends.avg_improvements));
        text.push_str(&format!("  • Improvement rate: {} recent periods\n", trends.improvement_rate));
    }

    if text == header {
        text.push_str("No significant patterns found. Keep using the system to generate data.");
    }

    Ok(ToolResult {
        success: true,
        message: text,
        data: Some(serde_json::to_value(&patterns).unwrap_or(Value::Null)),
    })
}

pub async fn execute_generate_improvements(args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
    let priority = optional_str(args, "priority")?
        .map(str::parse::<Priority>)
        .transpose()?;
    let suggestion_type = optional_str(args, "type")?
        .map(str::parse::<SuggestionType>)
        .transpose()?;

    let patterns = ctx.analyzer.analyze_usage_patterns().await?;
    let suggestions = filter_suggestions(generate_suggestions(&patterns), priority, suggestion_type);
    ctx.ledger.save_suggestions(&suggestions).await?;

    let data = Some(serde_json::to_value(&suggestions).unwrap_or(Value::Null));

    if suggestions.is_empty() {
        return Ok(ToolResult {
            success: true,
            message: "💡 Improvement Suggestions\n\n\
                      No suggestions available at this time. Use the system more to generate data."
                .to_string(),
            data,
        });
    }

    let mut text = String::from("💡 Improvement Suggestions\n\n");
    text.push_str(&format!("Total: {} suggestions\n\n", suggestions.len()));

    for (suggestion_type, items) in group_by_type(&suggestions) {
        text.push_str(&format!("{}:\n", suggestion_type.as_str().to_uppercase()));
        for item in items {
            let icon = match item.priority {
                Priority::High => "🔴",
                Priority::Medium => "🟡",
                Priority::Low => "🟢",
            };
            text.push_str(&format!("  {} {}\n", icon, item.action));
            text.push_str(&format!("     Priority: {}\n", item.priority));
            text.push_str(&format!("     Reason: {}\n", item.reason));
            text.push_str(&format!("     Impact: {}\n\n", item.estimated_impact));
        }
    }

    Ok(ToolResult {
        success: true,
        message: text,
        data,
    })
}

/// Groups keep the order in which each type first appears
fn group_by_type(suggestions: &[Suggestion]) -> Vec<(SuggestionType, Vec<&Suggestion>)> {
    let mut groups: Vec<(SuggestionType, Vec<&Suggestion>)> = Vec::new();
    for suggestion in suggestions {
        match groups.iter_mut().find(|(t, _)| *t == suggestion.suggestion_type) {
            Some((_, items)) => items.push(suggestion),
            None => groups.push((suggestion.suggestion_type, vec![suggestion])),
        }
    }
    groups
}

pub async fn execute_apply_evolution(args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
    let skill_name = required_str(args, "skillName")?;
    let metric: OptimizationMetric = required_str(args, "metric")?.parse()?;
    let auto = optional_bool(args, "auto")?.unwrap_or(false);

    if !auto {
        let text = format!(
            "⚠️ Confirmation Required\n\n\
             To apply evolution automatically, use --auto flag.\n\n\
             Command:\n  apply_evolution skillName={} metric={} auto=true\n\n\
             This will:\n\
             \x20 • Analyze current performance\n\
             \x20 • Apply optimizations\n\
             \x20 • Track improvements\n\
             \x20 • Update metrics",
            skill_name, metric
        );
        return Ok(ToolResult {
            success: true,
            message: text,
            data: None,
        });
    }

    let delta = ctx.applier.apply_optimization(skill_name, metric).await?;

    let text = format!(
        "✨ Evolution Applied\n\n\
         Skill: {}\nMetric: {}\n\n\
         Before:\n{}\n\nAfter:\n{}\n\n\
         Improvement: {}\n\n\
         ✅ Evolution tracked in metrics",
        skill_name,
        metric,
        pretty_reading(&delta.before),
        pretty_reading(&delta.after),
        delta.change.descriptor()
    );

    Ok(ToolResult {
        success: true,
        message: text,
        data: Some(serde_json::to_value(&delta).unwrap_or(Value::Null)),
    })
}

fn pretty_reading(reading: &MetricReading) -> String {
    serde_json::to_string_pretty(reading).unwrap_or_else(|_| reading.value().to_string())
}

pub fn execute_ab_test(args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
    let skill_name = required_str(args, "skillName")?;
    let version_a = required_str(args, "versionA")?;
    let version_b = required_str(args, "versionB")?;
    let iterations = match optional_number(args, "iterations")? {
        Some(n) if n >= 1.0 => n.min(u32::MAX as f64) as u32,
        _ => ctx.default_iterations,
    };

    let comparison = ctx
        .comparator
        .compare_variants(skill_name, version_a, version_b, iterations);

    let mut text = String::from("🧪 A/B Test Results\n\n");
    text.push_str(&format!("Skill: {}\n", skill_name));
    text.push_str(&format!("Iterations: {}\n\n", comparison.iterations));
    for (label, variant) in [("A", &comparison.a), ("B", &comparison.b)] {
        let p = &variant.performance;
        text.push_str(&format!("Version {} ({}):\n", label, variant.identifier));
        text.push_str(&format!("  Success Rate: {:.1}%\n", p.success_rate * 100.0));
        text.push_str(&format!("  Avg Time: {:.2}s\n", p.avg_time));
        text.push_str(&format!("  Tokens: {:.0}\n\n", p.tokens));
    }
    text.push_str(&format!("🏆 Winner: Version {}\n\n", comparison.winner));
    text.push_str(&format!("Recommendation: Use Version {} for production", comparison.winner));

    Ok(ToolResult {
        success: true,
        message: text,
        data: Some(serde_json::to_value(&comparison).unwrap_or(Value::Null)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::storage::{MemoryStorage, OPTIMIZATION_DOCUMENT};
    use crate::metrics::trials::{TrialSource, Variant, VariantPerformance};
    use crate::metrics::ledger::{Change, ImprovementDelta};
    use crate::metrics::{OptimizationSource, SkillStats};
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> (Arc<MemoryStorage>, ToolContext) {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = ToolContext::new(storage.clone());
        (storage, ctx)
    }

    #[tokio::test]
    async fn test_track_metrics_report() {
        let (_, ctx) = context();

        execute_track_metrics(&json!({"skillName": "s", "success": true, "executionTime": 2.5}), &ctx)
            .await
            .unwrap();
        let result = execute_track_metrics(
            &json!({"skillName": "s", "success": false, "error": "boom"}),
            &ctx,
        )
        .await
        .unwrap();

        assert!(result.success);
        assert!(result.message.contains("Status: ❌ Failed"));
        assert!(result.message.contains("Invocations: 2"));
        assert!(result.message.contains("Success Rate: 50.0%"));
        assert!(result.message.contains("Error: boom"));
        assert!(!result.message.contains("Execution Time"));
        assert!(result.message.ends_with("Total System Invocations: 2"));
    }

    #[tokio::test]
    async fn test_track_metrics_requires_success() {
        let (storage, ctx) = context();

        let err = execute_track_metrics(&json!({"skillName": "s"}), &ctx).await.unwrap_err();

        assert!(matches!(err, EvolutionError::Validation(_)));
        assert!(storage.get(crate::metrics::storage::METRICS_DOCUMENT).await.is_none());
    }

    #[tokio::test]
    async fn test_analyze_empty_and_bad_timeframe() {
        let (_, ctx) = context();

        let result = execute_analyze_performance(&json!({"timeframe": "week"}), &ctx).await.unwrap();
        assert!(result.message.contains("No significant patterns found"));

        let err = execute_analyze_performance(&json!({"timeframe": "year"}), &ctx).await.unwrap_err();
        assert!(matches!(err, EvolutionError::Validation(_)));
    }

    #[tokio::test]
    async fn test_analyze_skill_filter() {
        let (_, ctx) = context();
        for skill in ["alpha", "beta"] {
            for _ in 0..6 {
                ctx.metrics.record_invocation(&Invocation::success(skill, 1.0, 10.0)).await.unwrap();
            }
        }

        let result = execute_analyze_performance(&json!({"skillName": "beta"}), &ctx).await.unwrap();

        assert!(result.message.contains("  • beta: 6 invocations, 100% success"));
        assert!(!result.message.contains("alpha"));
    }

    #[tokio::test]
    async fn test_translation_gap_becomes_creation_suggestion() {
        let (storage, ctx) = context();
        for _ in 0..6 {
            execute_track_metrics(
                &json!({"skillName": "translator", "success": false, "error": "missing capability: translation"}),
                &ctx,
            )
            .await
            .unwrap();
        }

        let result = execute_generate_improvements(&json!({"type": "creation"}), &ctx).await.unwrap();

        let suggestions: Vec<Suggestion> = serde_json::from_value(result.data.unwrap()).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].skill, "missing-capability:-translation-handler");
        assert_eq!(suggestions[0].priority, Priority::High);
        assert!(result.message.contains("CREATION:"));
        assert!(result.message.contains("🔴 Create skill for \"missing capability: translation\""));

        let ledger = storage.get(OPTIMIZATION_DOCUMENT).await.unwrap();
        assert!(ledger.contains("missing-capability:-translation-handler"));
    }

    #[tokio::test]
    async fn test_empty_suggestions_still_persisted() {
        let (storage, ctx) = context();

        let result = execute_generate_improvements(&json!({"priority": "low"}), &ctx).await.unwrap();

        assert!(result.message.contains("No suggestions available"));
        assert!(storage.get(OPTIMIZATION_DOCUMENT).await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_priority_rejected_before_write() {
        let (storage, ctx) = context();

        let err = execute_generate_improvements(&json!({"priority": "urgent"}), &ctx).await.unwrap_err();

        assert!(matches!(err, EvolutionError::Validation(_)));
        assert!(storage.get(OPTIMIZATION_DOCUMENT).await.is_none());
    }

    #[test]
    fn test_group_by_type_keeps_first_seen_order() {
        let make = |suggestion_type| Suggestion {
            suggestion_type,
            action: String::new(),
            priority: Priority::Low,
            skill: String::new(),
            reason: String::new(),
            estimated_impact: String::new(),
        };
        let suggestions = vec![
            make(SuggestionType::Fix),
            make(SuggestionType::Optimization),
            make(SuggestionType::Fix),
        ];

        let groups = group_by_type(&suggestions);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, SuggestionType::Fix);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, SuggestionType::Optimization);
    }

    #[tokio::test]
    async fn test_apply_without_auto_asks_for_confirmation() {
        let (_, ctx) = context();
        ctx.metrics.record_invocation(&Invocation::success("s", 4.0, 10.0)).await.unwrap();

        let result = execute_apply_evolution(&json!({"skillName": "s", "metric": "speed"}), &ctx)
            .await
            .unwrap();

        assert!(result.message.starts_with("⚠️ Confirmation Required"));
        assert!(result.message.contains("apply_evolution skillName=s metric=speed auto=true"));
        assert_eq!(ctx.metrics.load().await.unwrap().improvements_executed, 0);
    }

    #[tokio::test]
    async fn test_apply_with_auto() {
        let (_, ctx) = context();
        ctx.metrics.record_invocation(&Invocation::success("s", 4.0, 10.0)).await.unwrap();

        let result = execute_apply_evolution(
            &json!({"skillName": "s", "metric": "speed", "auto": true}),
            &ctx,
        )
        .await
        .unwrap();

        assert!(result.message.contains("\"avg_time\": 4.0"));
        assert!(result.message.contains("\"avg_time\": 3.0"));
        assert!(result.message.contains("Improvement: 25%"));
        assert_eq!(ctx.metrics.load().await.unwrap().improvements_executed, 1);
    }

    #[tokio::test]
    async fn test_apply_unknown_metric_and_skill() {
        let (_, ctx) = context();

        let err = execute_apply_evolution(&json!({"skillName": "s", "metric": "memory"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EvolutionError::Validation(_)));

        let err = execute_apply_evolution(
            &json!({"skillName": "ghost", "metric": "tokens", "auto": true}),
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EvolutionError::NotFound(_)));
    }

    struct Fixed;

    impl TrialSource for Fixed {
        fn run(&self, _skill_id: &str, variant: &str, _iterations: u32) -> VariantPerformance {
            let success_rate = if variant == "v1" { 0.9 } else { 0.8 };
            VariantPerformance {
                success_rate,
                avg_time: 1.5,
                tokens: 250.4,
            }
        }
    }

    #[test]
    fn test_ab_test_report() {
        let (_, ctx) = context();
        let ctx = ctx.with_trial_source(Arc::new(Fixed));

        let result = execute_ab_test(
            &json!({"skillName": "s", "versionA": "v1", "versionB": "v2"}),
            &ctx,
        )
        .unwrap();

        assert!(result.message.contains("Iterations: 10"));
        assert!(result.message.contains("Version A (v1):\n  Success Rate: 90.0%\n  Avg Time: 1.50s\n  Tokens: 250"));
        assert!(result.message.contains("🏆 Winner: Version A"));
        let winner = result.data.unwrap()["winner"].clone();
        assert_eq!(winner, serde_json::to_value(Variant::A).unwrap());
    }

    #[test]
    fn test_ab_test_zero_iterations_uses_default() {
        let (_, ctx) = context();

        let result = execute_ab_test(
            &json!({"skillName": "s", "versionA": "a", "versionB": "b", "iterations": 0}),
            &ctx,
        )
        .unwrap();

        assert!(result.message.contains("Iterations: 10"));
    }

    #[tokio::test]
    async fn test_huge_token_counts_do_not_overflow() {
        let (_, ctx) = context();
        let args = json!({"skillName": "s", "success": true, "tokensUsed": 1e19});

        execute_track_metrics(&args, &ctx).await.unwrap();
        let result = execute_track_metrics(&args, &ctx).await.unwrap();

        assert!(result.success);
        assert!(result.message.contains("Invocations: 2"));
        let stats = ctx.metrics.get_skill_stats("s").await.unwrap().unwrap();
        assert_eq!(stats.total_tokens, 2e19);
    }

    struct HalveTokens;

    impl OptimizationSource for HalveTokens {
        fn optimize(&self, stats: &SkillStats, _metric: OptimizationMetric) -> ImprovementDelta {
            let avg_tokens = stats.avg_tokens();
            ImprovementDelta {
                before: MetricReading::AvgTokens { avg_tokens },
                after: MetricReading::AvgTokens { avg_tokens: avg_tokens / 2.0 },
                change: Change::Reduction("50%".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_custom_optimization_source() {
        let (_, ctx) = context();
        let ctx = ctx.with_optimization_source(Arc::new(HalveTokens));
        ctx.metrics.record_invocation(&Invocation::success("s", 1.0, 300.0)).await.unwrap();

        let result = execute_apply_evolution(
            &json!({"skillName": "s", "metric": "tokens", "auto": true}),
            &ctx,
        )
        .await
        .unwrap();

        assert!(result.message.contains("\"avg_tokens\": 150.0"));
        assert!(result.message.contains("Improvement: 50%"));
        let ledger = ctx.ledger.load().await.unwrap();
        assert_eq!(ledger.applied_improvements[0].improvement.change.descriptor(), "50%");
    }
}
