//! Skill usage metrics and evolution
//!
//! This module provides:
//! - Invocation tracking per skill (success/failure counts, timing, tokens)
//! - Pattern analysis over the accumulated metrics
//! - Improvement suggestions derived from those patterns
//! - Simulated optimizations and A/B comparisons with their bookkeeping

pub mod storage;
pub mod execution;
pub mod analysis;
pub mod suggestions;
pub mod ledger;
pub mod evolution;
pub mod trials;

pub use storage::{DocumentStorage, JsonFileStorage, MemoryStorage};
pub use execution::{extract_capability, Invocation, MetricsSnapshot, MetricsStore, SkillStats};
pub use analysis::{AnalysisConfig, PatternAnalyzer, Patterns};
pub use suggestions::{generate_suggestions, Priority, Suggestion, SuggestionType};
pub use ledger::{ImprovementDelta, OptimizationLedger, OptimizationMetric, OptimizationStore};
pub use evolution::{OptimizationApplier, OptimizationSource, SimulatedOptimization};
pub use trials::{SimulatedTrials, TrialComparator, TrialComparison, TrialSource, Variant};
