//! Parameters of the model, banding, and the multi-read scorer.
use crate::context::{ContextCoefficients, ContextParameters, Snr};
use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};

/// Emission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Pr{a read base differs from the template base}.
    pub mismatch: f64,
    /// If true, add `-log(match scaling factor) * |read|` to each score.
    pub match_scaling: bool,
}

impl ModelParams {
    pub fn new(mismatch: f64) -> Result<Self> {
        if !(0f64 < mismatch && mismatch < 1f64) {
            let message = format!("mismatch rate {} is not in (0,1)", mismatch);
            return Err(ScoringError::Configuration(message));
        }
        Ok(Self {
            mismatch,
            match_scaling: false,
        })
    }
    pub fn pr_not_miscall(&self) -> f64 {
        1f64 - self.mismatch
    }
    /// Pr{a specific wrong base}.
    pub fn pr_third_of_miscall(&self) -> f64 {
        self.mismatch / 3f64
    }
}

impl std::default::Default for ModelParams {
    fn default() -> Self {
        Self {
            mismatch: 0.002671256,
            match_scaling: false,
        }
    }
}

/// Banding. In each column, cells smaller than `max / exp(score_diff)` are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandingOptions {
    pub score_diff: f64,
}

impl BandingOptions {
    pub fn new(score_diff: f64) -> Result<Self> {
        if score_diff < 0f64 || score_diff.is_nan() {
            let message = format!("band score diff should be non-negative, got {}", score_diff);
            return Err(ScoringError::Configuration(message));
        }
        Ok(Self { score_diff })
    }
}

impl std::default::Default for BandingOptions {
    fn default() -> Self {
        Self { score_diff: 12.5 }
    }
}

/// Configuration of [crate::MultiReadMutationScorer].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub model: ModelParams,
    pub banding: BandingOptions,
    pub coefficients: ContextCoefficients,
    pub snr: Snr,
    /// `fast_score` stops summing up reads once the sum falls below this value.
    pub fast_score_threshold: f64,
    /// Reads scoring below this value when added are kept inactive.
    pub add_threshold: f64,
    /// Mutations with a score larger than this value are favorable.
    pub favorable_threshold: f64,
}

impl std::default::Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model: ModelParams::default(),
            banding: BandingOptions::default(),
            coefficients: ContextCoefficients::default(),
            snr: Snr::default(),
            fast_score_threshold: -12.5,
            add_threshold: f64::NEG_INFINITY,
            favorable_threshold: 0.04,
        }
    }
}

impl ScorerConfig {
    pub fn new(snr: Snr) -> Self {
        Self {
            snr,
            ..Self::default()
        }
    }
    pub fn validate(&self) -> Result<()> {
        ModelParams::new(self.model.mismatch)?;
        BandingOptions::new(self.banding.score_diff)?;
        Ok(())
    }
    pub fn context_parameters(&self) -> Result<ContextParameters> {
        ContextParameters::new(&self.coefficients, self.snr)
    }
}
