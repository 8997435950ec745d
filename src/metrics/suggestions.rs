//! Improvement suggestions derived from usage patterns

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::analysis::Patterns;
use crate::error::EvolutionError;

/// Target id for the composite-skill suggestion
pub const COMPOSITE_SKILL_ID: &str = "frequent-workflow-composite";

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Optimization,
    Fix,
    Creation,
    Composition,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::Optimization => "optimization",
            SuggestionType::Fix => "fix",
            SuggestionType::Creation => "creation",
            SuggestionType::Composition => "composition",
        }
    }
}

impl fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionType {
    type Err = EvolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optimization" => Ok(SuggestionType::Optimization),
            "fix" => Ok(SuggestionType::Fix),
            "creation" => Ok(SuggestionType::Creation),
            "composition" => Ok(SuggestionType::Composition),
            other => Err(EvolutionError::validation(format!(
                "Unknown suggestion type '{}'. Expected one of: optimization, fix, creation, composition",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = EvolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(EvolutionError::validation(format!(
                "Unknown priority '{}'. Expected one of: high, medium, low",
                other
            ))),
        }
    }
}

/// A non-binding recommendation to change a skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub action: String,
    pub priority: Priority,
    /// Target skill; synthesized for creation and composition
    pub skill: String,
    pub reason: String,
    /// Descriptive only, never computed
    pub estimated_impact: String,
}

/// Map analysis output to suggestions.
///
/// Order is slow → failing → missing → composition, never re-sorted by
/// priority.
pub fn generate_suggestions(patterns: &Patterns) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for skill in &patterns.slow_skills {
        suggestions.push(Suggestion {
            suggestion_type: SuggestionType::Optimization,
            action: format!("Optimize {} for speed", skill.name),
            priority: Priority::Medium,
            skill: skill.name.clone(),
            reason: format!("Average execution time: {:.2}s", skill.avg_time),
            estimated_impact: "25% faster".to_string(),
        });
    }

    for skill in &patterns.failed_skills {
        suggestions.push(Suggestion {
            suggestion_type: SuggestionType::Fix,
            action: format!(
                "Fix {} (success rate: {:.0}%)",
                skill.name,
                skill.success_rate * 100.0
            ),
            priority: Priority::High,
            skill: skill.name.clone(),
            reason: format!("{} errors detected", skill.errors),
            estimated_impact: "Improved reliability".to_string(),
        });
    }

    for missing in &patterns.missing_capabilities {
        suggestions.push(Suggestion {
            suggestion_type: SuggestionType::Creation,
            action: format!("Create skill for \"{}\"", missing.capability),
            priority: Priority::High,
            skill: handler_skill_id(&missing.capability),
            reason: format!("Requested {} times", missing.frequency),
            estimated_impact: "New capability".to_string(),
        });
    }

    if patterns.frequent_skills.len() >= 3 {
        let names: Vec<&str> = patterns
            .frequent_skills
            .iter()
            .take(3)
            .map(|s| s.name.as_str())
            .collect();
        suggestions.push(Suggestion {
            suggestion_type: SuggestionType::Composition,
            action: "Create composite skill for frequent workflow".to_string(),
            priority: Priority::Low,
            skill: COMPOSITE_SKILL_ID.to_string(),
            reason: format!("Frequent combination: {}", names.join(", ")),
            estimated_impact: "Streamlined workflow".to_string(),
        });
    }

    suggestions
}

/// `"image processing"` becomes `"image-processing-handler"`
pub fn handler_skill_id(capability: &str) -> String {
    format!("{}-handler", WHITESPACE_RUN.replace_all(capability, "-"))
}

/// Keep suggestions matching both optional filters
pub fn filter_suggestions(
    suggestions: Vec<Suggestion>,
    priority: Option<Priority>,
    suggestion_type: Option<SuggestionType>,
) -> Vec<Suggestion> {
    suggestions
        .into_iter()
        .filter(|s| priority.map_or(true, |p| s.priority == p))
        .filter(|s| suggestion_type.map_or(true, |t| s.suggestion_type == t))
        .collect()
}
