//! A/B comparison of skill variants
//!
//! [`SimulatedTrials`] fabricates one performance sample per variant. The
//! iteration count is reported but does not change the draw.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Iterations used when the caller does not specify any
pub const DEFAULT_ITERATIONS: u32 = 10;

/// Measured (or simulated) performance of one variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantPerformance {
    pub success_rate: f64,
    /// Seconds
    pub avg_time: f64,
    pub tokens: f64,
}

impl VariantPerformance {
    /// Success percentage minus seconds; higher wins
    pub fn score(&self) -> f64 {
        self.success_rate * 100.0 - self.avg_time
    }
}

/// Where trial outcomes come from
pub trait TrialSource: Send + Sync {
    fn run(&self, skill_id: &str, variant: &str, iterations: u32) -> VariantPerformance;
}

/// Uniform draws: success rate in [0.70, 0.95), time in [1, 4) seconds,
/// tokens in [100, 500)
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedTrials;

impl TrialSource for SimulatedTrials {
    fn run(&self, _skill_id: &str, _variant: &str, _iterations: u32) -> VariantPerformance {
        let mut rng = rand::rng();
        VariantPerformance {
            success_rate: rng.random_range(0.70..0.95),
            avg_time: rng.random_range(1.0..4.0),
            tokens: rng.random_range(100.0..500.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::A => write!(f, "A"),
            Variant::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub identifier: String,
    #[serde(flatten)]
    pub performance: VariantPerformance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialComparison {
    pub skill: String,
    pub iterations: u32,
    pub a: VariantResult,
    pub b: VariantResult,
    pub winner: Variant,
}

/// A wins only with a strictly higher score; ties go to B.
pub fn pick_winner(a: &VariantPerformance, b: &VariantPerformance) -> Variant {
    if a.score() > b.score() {
        Variant::A
    } else {
        Variant::B
    }
}

pub struct TrialComparator {
    source: Arc<dyn TrialSource>,
}

impl TrialComparator {
    pub fn new() -> Self {
        Self::with_source(Arc::new(SimulatedTrials))
    }

    pub fn with_source(source: Arc<dyn TrialSource>) -> Self {
        Self { source }
    }

    pub fn compare_variants(
        &self,
        skill_id: &str,
        variant_a: &str,
        variant_b: &str,
        iterations: u32,
    ) -> TrialComparison {
        let a = self.source.run(skill_id, variant_a, iterations);
        let b = self.source.run(skill_id, variant_b, iterations);
        let winner = pick_winner(&a, &b);

        info!(
            "A/B test for {}: A={:.2} B={:.2}, winner {}",
            skill_id,
            a.score(),
            b.score(),
            winner
        );

        TrialComparison {
            skill: skill_id.to_string(),
            iterations,
            a: VariantResult {
                identifier: variant_a.to_string(),
                performance: a,
            },
            b: VariantResult {
                identifier: variant_b.to_string(),
                performance: b,
            },
            winner,
        }
    }
}

impl Default for TrialComparator {
    fn default() -> Self {
        Self::new()
    }
}
